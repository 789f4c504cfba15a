//! Runs build commands, potentially in parallel.
//! Unaware of the build graph; just command execution.  Each running
//! command gets a worker thread that blocks on the subprocess and reports
//! back over a channel; all graph bookkeeping stays on the coordinator.

use crate::graph::EdgeId;
use std::process::Command;
use std::sync::mpsc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub struct FinishedTask {
    pub edge: EdgeId,
    /// Wall-clock second the command was launched; recorded in the log.
    pub start_stamp: i64,
    pub span: (Instant, Instant),
    pub result: TaskResult,
}

#[derive(Debug, PartialEq)]
pub enum Termination {
    Success,
    Interrupted,
    Failure,
}

/// The result of executing one command.
pub struct TaskResult {
    pub termination: Termination,
    /// Combined stdout and stderr.
    pub output: Vec<u8>,
}

/// Execute a command via the system shell, capturing its output.
/// Returns Err() only when we failed outside of the process itself.
fn run_command(cmdline: &str) -> anyhow::Result<TaskResult> {
    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(cmdline);
        cmd
    };
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/c").arg(cmdline);
        cmd
    };

    let out = cmd.output()?;
    let mut output = out.stdout;
    output.extend_from_slice(&out.stderr);

    let mut termination = Termination::Success;
    if !out.status.success() {
        termination = Termination::Failure;
        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = out.status.signal() {
                match sig {
                    libc::SIGINT => {
                        write!(output, "interrupted").unwrap();
                        termination = Termination::Interrupted;
                    }
                    _ => write!(output, "signal {}", sig).unwrap(),
                }
            }
        }
    }

    Ok(TaskResult {
        termination,
        output,
    })
}

pub struct Runner {
    finished_send: mpsc::Sender<FinishedTask>,
    finished_recv: mpsc::Receiver<FinishedTask>,
    running: usize,
    parallelism: usize,
}

impl Runner {
    pub fn new(parallelism: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Runner {
            finished_send: tx,
            finished_recv: rx,
            running: 0,
            parallelism,
        }
    }

    pub fn can_start_more(&self) -> bool {
        self.running < self.parallelism
    }

    pub fn is_running(&self) -> bool {
        self.running > 0
    }

    pub fn start(&mut self, edge: EdgeId, cmdline: String) {
        let tx = self.finished_send.clone();
        std::thread::spawn(move || {
            let start = Instant::now();
            let start_stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            let result = run_command(&cmdline).unwrap_or_else(|err| TaskResult {
                termination: Termination::Failure,
                output: err.to_string().into_bytes(),
            });
            let finish = Instant::now();
            // The send only fails if the receiver disappeared, e.g. due to
            // shutting down.
            let _ = tx.send(FinishedTask {
                edge,
                start_stamp,
                span: (start, finish),
                result,
            });
        });
        self.running += 1;
    }

    /// Wait for a task to complete.  May block for a long time.
    pub fn wait(&mut self) -> FinishedTask {
        let task = self.finished_recv.recv().unwrap();
        self.running -= 1;
        task
    }
}
