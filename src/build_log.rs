//! The persistent build log: for each output path, the hash of the command
//! that produced it and when it ran.  Consulted by dirtiness analysis to
//! catch edges whose command changed even though file timestamps did not.
//!
//! On-disk format: a magic/version line, then one tab-separated record per
//! line: start_mtime, end_mtime, output path, command hash.  Records are
//! append-only and the latest record for a path wins; the log is flushed
//! after every completed edge so a crash loses at most the running edges.

use crate::hash::CommandHash;
use anyhow::anyhow;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};

const LOG_MAGIC: &str = "# kiln build log v1";

/// Logs with fewer on-disk records than this are never compacted.
const COMPACT_MIN_RECORDS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub start_mtime: i64,
    pub end_mtime: i64,
    pub command_hash: CommandHash,
}

pub struct BuildLog {
    entries: HashMap<String, LogEntry>,
    file: Option<File>,
}

impl Default for BuildLog {
    fn default() -> Self {
        BuildLog::new()
    }
}

impl BuildLog {
    /// An empty log with no backing file; records are kept in memory only.
    pub fn new() -> BuildLog {
        BuildLog {
            entries: HashMap::new(),
            file: None,
        }
    }

    /// Open (creating if necessary) the on-disk log, loading its records.
    /// A malformed line truncates the log at that point: it is most likely
    /// the tail of a record interrupted by a crash.
    pub fn open(path: &str) -> anyhow::Result<BuildLog> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|err| anyhow!("open {}: {}", path, err))?;

        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", LOG_MAGIC)?;
            return Ok(BuildLog {
                entries: HashMap::new(),
                file: Some(file),
            });
        }

        let mut entries = HashMap::new();
        let mut records = 0usize;
        let mut truncate_at: Option<u64> = None;
        {
            let mut reader = BufReader::new(&mut file);
            let mut buf = Vec::new();
            reader.read_until(b'\n', &mut buf)?;
            if !matches!(std::str::from_utf8(&buf), Ok(line) if line.trim_end() == LOG_MAGIC) {
                eprintln!("kiln: warning: unrecognized build log {}; starting over", path);
                truncate_at = Some(0);
            } else {
                let mut ofs = buf.len() as u64;
                loop {
                    buf.clear();
                    let n = reader.read_until(b'\n', &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    let record = std::str::from_utf8(&buf)
                        .ok()
                        .and_then(|line| parse_record(line.trim_end_matches(['\n', '\r'])));
                    match record {
                        Some((output, entry)) => {
                            entries.insert(output, entry);
                            records += 1;
                            ofs += n as u64;
                        }
                        None => {
                            eprintln!("kiln: warning: truncating malformed build log {}", path);
                            truncate_at = Some(ofs);
                            break;
                        }
                    }
                }
            }
        }

        if let Some(len) = truncate_at {
            file.set_len(len)?;
            if len == 0 {
                entries.clear();
                writeln!(file, "{}", LOG_MAGIC)?;
            }
        }

        let mut log = BuildLog {
            entries,
            file: Some(file),
        };
        if records >= COMPACT_MIN_RECORDS && records > 2 * log.entries.len() {
            log.recompact(path)?;
        }
        Ok(log)
    }

    pub fn lookup(&self, output: &str) -> Option<&LogEntry> {
        self.entries.get(output)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Record an edge completion for one output, flushing it to disk.
    pub fn record(&mut self, output: &str, entry: LogEntry) -> anyhow::Result<()> {
        self.entries.insert(output.to_owned(), entry);
        if let Some(file) = &mut self.file {
            writeln!(
                file,
                "{}\t{}\t{}\t{}",
                entry.start_mtime, entry.end_mtime, output, entry.command_hash
            )?;
            file.flush()?;
        }
        Ok(())
    }

    /// Rewrite the log with one record per live output, dropping the
    /// superseded history.  Writes a temporary file and renames it over the
    /// old log so a crash cannot lose the whole history.
    fn recompact(&mut self, path: &str) -> anyhow::Result<()> {
        let tmp_path = format!("{}.tmp", path);
        {
            let mut w = BufWriter::new(File::create(&tmp_path)?);
            writeln!(w, "{}", LOG_MAGIC)?;
            let mut outputs: Vec<&String> = self.entries.keys().collect();
            outputs.sort();
            for output in outputs {
                let entry = &self.entries[output];
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    entry.start_mtime, entry.end_mtime, output, entry.command_hash
                )?;
            }
            w.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        self.file = Some(OpenOptions::new().append(true).open(path)?);
        Ok(())
    }
}

fn parse_record(line: &str) -> Option<(String, LogEntry)> {
    let mut fields = line.split('\t');
    let start_mtime = fields.next()?.parse::<i64>().ok()?;
    let end_mtime = fields.next()?.parse::<i64>().ok()?;
    let output = fields.next()?;
    let command_hash = CommandHash::from_hex(fields.next()?)?;
    if fields.next().is_some() {
        return None;
    }
    Some((
        output.to_owned(),
        LogEntry {
            start_mtime,
            end_mtime,
            command_hash,
        },
    ))
}
