//! Hashing of fully-evaluated command lines.
//!
//! The build log records a hash of the command that produced each output,
//! so a changed rule or variable re-runs the edge even when file timestamps
//! say nothing changed.  DefaultHasher uses fixed keys, so hashes are
//! stable across runs of the same binary.

use std::hash::Hasher;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandHash(pub u64);

impl CommandHash {
    /// Parse the fixed-width hex form used in the build log.
    pub fn from_hex(text: &str) -> Option<CommandHash> {
        if text.len() != 16 {
            return None;
        }
        u64::from_str_radix(text, 16).ok().map(CommandHash)
    }
}

impl std::fmt::Display for CommandHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub fn hash_command(cmdline: &str) -> CommandHash {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hasher.write(cmdline.as_bytes());
    CommandHash(hasher.finish())
}
