//! Command-line entry point: option parsing, tool dispatch, and the build
//! driver with its manifest-regeneration fixpoint.

use argh::FromArgs;
use crate::build_log::BuildLog;
use crate::canon::canon_path;
use crate::disk::{self, Disk, SystemDisk};
use crate::graph::FileId;
use crate::load;
use crate::metrics::{self, Metrics};
use crate::progress::{DumbConsoleProgress, FancyConsoleProgress, Progress};
use crate::signal;
use crate::terminal;
use crate::tools;
use crate::work::{self, Work};
use anyhow::{anyhow, bail};

#[derive(argh::FromArgs)]
/// kiln, a manifest-driven build executor
struct Opts {
    /// change to DIR before doing anything else
    #[argh(option, short = 'C')]
    chdir: Option<String>,

    /// input build manifest [default=build.ninja]
    #[argh(option, short = 'f', default = "(\"build.ninja\".into())")]
    manifest: String,

    /// enable a debug mode (use -d list to list modes)
    #[argh(option, short = 'd')]
    debug: Option<String>,

    /// run a subtool (use -t list to list); terminates option parsing
    #[argh(option, short = 't')]
    tool: Option<String>,

    /// run N tasks in parallel [default: cpu count + 2]
    #[argh(option, short = 'j')]
    parallelism: Option<usize>,

    /// keep going until N tasks fail (0 means unlimited) [default=1]
    #[argh(option, short = 'k', default = "1")]
    keep_going: usize,

    /// dry run: print commands without running them
    #[argh(switch, short = 'n')]
    dry_run: bool,

    /// print full command lines while building
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// targets to build
    #[argh(positional)]
    targets: Vec<String>,
}

/// `-t TOOL` terminates top-level option parsing: everything after the tool
/// name belongs to the tool.
fn split_tool_args(argv: &[String]) -> (Vec<String>, Vec<String>) {
    for (i, arg) in argv.iter().enumerate() {
        if arg == "-t" {
            let end = (i + 2).min(argv.len());
            return (
                argv[..end].to_vec(),
                argv.get(end..).unwrap_or(&[]).to_vec(),
            );
        }
    }
    (argv.to_vec(), Vec::new())
}

fn default_parallelism() -> anyhow::Result<usize> {
    let processors = std::thread::available_parallelism()?;
    Ok(std::cmp::max(usize::from(processors) + 2, 2))
}

fn manifest_target(state: &load::State, manifest: &str) -> Option<FileId> {
    state
        .graph
        .lookup(manifest)
        .filter(|&id| state.graph.files.get(id).in_edge.is_some())
}

fn open_log(state: &load::State, disk: &dyn Disk) -> anyhow::Result<BuildLog> {
    const LOG_NAME: &str = ".ninja_log";
    let path = match &state.builddir {
        Some(dir) => {
            disk::make_dirs(disk, dir)
                .map_err(|err| anyhow!("creating build directory {}: {}", dir, err))?;
            format!("{}/{}", dir, LOG_NAME)
        }
        None => LOG_NAME.to_owned(),
    };
    BuildLog::open(&path)
}

/// Load the manifest and run a build.  When the manifest itself is an
/// output of the build, bring it up to date first and reload -- at most
/// once, so an always-dirty generator rule can't oscillate forever.
fn build(
    disk: &dyn Disk,
    opts: &Opts,
    options: &work::Options,
    progress: &mut dyn Progress,
    metrics: Option<&Metrics>,
) -> anyhow::Result<Option<usize>> {
    let manifest_path = canon_path(&opts.manifest)?;
    let mut state = metrics::scope(metrics, "load", || load::read(disk, &manifest_path))?;
    let mut log = open_log(&state, disk)?;

    if let Some(target) = manifest_target(&state, &manifest_path) {
        let mut work = Work::new(&mut state.graph, &mut log, disk, options, progress, metrics);
        work.want_file(target)?;
        match work.run()? {
            None => return Ok(None),
            Some(0) => {
                // Manifest already up to date; keep this State.
            }
            Some(_) => {
                // Regenerated: throw the State away and reparse.
                state = metrics::scope(metrics, "load", || load::read(disk, &manifest_path))?;
                log = open_log(&state, disk)?;
            }
        }
    }

    let targets = if !opts.targets.is_empty() {
        tools::collect_targets(&state.graph, &opts.targets)?
    } else {
        state.graph.default_targets()
    };

    let mut work = Work::new(&mut state.graph, &mut log, disk, options, progress, metrics);
    for target in targets {
        work.want_file(target)?;
    }
    metrics::scope(metrics, "build", || work.run())
}

pub fn run() -> anyhow::Result<i32> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let (main_args, tool_args) = split_tool_args(&argv);
    let arg_refs: Vec<&str> = main_args.iter().map(|s| s.as_str()).collect();
    let opts = match Opts::from_args(&["kiln"], &arg_refs) {
        Ok(opts) => opts,
        Err(exit) => {
            return Ok(match exit.status {
                Ok(()) => {
                    println!("{}", exit.output);
                    0
                }
                Err(()) => {
                    eprintln!("{}", exit.output);
                    2
                }
            });
        }
    };

    signal::register_sigint();

    let mut metrics = None;
    if let Some(debug) = &opts.debug {
        match debug.as_str() {
            "list" => {
                println!("debug modes:");
                println!("  stats  print operation counts/timing info");
                return Ok(1);
            }
            "stats" => metrics = Some(Metrics::new()),
            _ => bail!("unknown debug mode '{}', use -d list to list", debug),
        }
    }

    if let Some(dir) = &opts.chdir {
        // The formatting of this string, complete with funny quotes, lets
        // Emacs and friends track the changed working directory.
        println!("kiln: Entering directory `{}'", dir);
        std::env::set_current_dir(dir).map_err(|err| anyhow!("chdir {}: {}", dir, err))?;
    }

    let disk = SystemDisk;

    if let Some(tool) = &opts.tool {
        if tool == "list" {
            return Ok(tools::list());
        }
        let state = load::read(&disk, &opts.manifest)?;
        return tools::run_tool(tool, &state.graph, &disk, &tool_args);
    }

    let options = work::Options {
        parallelism: match opts.parallelism {
            Some(n) => n.max(1),
            None => default_parallelism()?,
        },
        keep_going: opts.keep_going,
        dry_run: opts.dry_run,
        verbose: opts.verbose,
    };

    let mut progress: Box<dyn Progress> = if terminal::use_fancy() {
        Box::new(FancyConsoleProgress::new())
    } else {
        Box::new(DumbConsoleProgress::new())
    };

    let result = build(&disk, &opts, &options, progress.as_mut(), metrics.as_ref())?;
    // Tear down the progress display before printing the summary.
    drop(progress);

    match result {
        None => {
            if signal::was_interrupted() {
                println!("kiln: build stopped: interrupted by user.");
            } else {
                println!("kiln: build stopped: subcommand failed.");
            }
            return Ok(1);
        }
        Some(0) => {
            // Special case: don't print numbers when no work was done.
            println!("kiln: no work to do");
        }
        Some(n) => {
            println!(
                "kiln: ran {} task{}, now up to date",
                n,
                if n == 1 { "" } else { "s" }
            );
        }
    }

    if let Some(metrics) = &metrics {
        metrics.report();
    }
    Ok(0)
}
