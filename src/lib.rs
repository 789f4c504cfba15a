pub mod build_log;
pub mod canon;
pub mod densemap;
mod depfile;
pub mod disk;
mod dirty;
pub mod eval;
pub mod graph;
pub mod hash;
pub mod load;
pub mod metrics;
pub mod parse;
pub mod progress;
pub mod run;
pub mod scanner;
mod signal;
pub mod smallmap;
mod spell;
pub mod task;
mod terminal;
mod tools;
pub mod work;

#[cfg(not(windows))]
use jemallocator::Jemalloc;

#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
