//! Dirtiness analysis: walks the graph from a target toward its sources and
//! decides, per edge, whether its outputs must be rebuilt.
//!
//! An edge is dirty when an output is missing, when the build log has no
//! record of the output or records a different command hash, when an output
//! is older than the newest dirtying input, or when any dirtying input is
//! itself dirty.  Order-only inputs are visited (they must exist or be
//! buildable) but never dirty their dependents.

use crate::build_log::BuildLog;
use crate::disk::{Disk, MTime};
use crate::graph::{EdgeId, FileId, Graph, VisitMark};
use crate::hash::hash_command;
use anyhow::bail;

/// Stat and analyze everything `target` transitively depends on, leaving
/// `dirty` flags on the visited nodes and edges.
pub fn mark_subgraph(
    graph: &mut Graph,
    disk: &dyn Disk,
    log: &BuildLog,
    target: FileId,
) -> anyhow::Result<()> {
    stat(graph, disk, target)?;
    match graph.files.get(target).in_edge {
        Some(edge) => {
            let mut stack = Vec::new();
            mark_edge(graph, disk, log, edge, &mut stack)
        }
        None => {
            let missing = graph.files.get(target).mtime == Some(MTime::Missing);
            graph.files.get_mut(target).dirty = missing;
            Ok(())
        }
    }
}

fn stat(graph: &mut Graph, disk: &dyn Disk, id: FileId) -> anyhow::Result<MTime> {
    let node = graph.files.get_mut(id);
    if let Some(mtime) = node.mtime {
        return Ok(mtime);
    }
    let mtime = disk
        .stat(&node.path)
        .map_err(|err| anyhow::anyhow!("stat {}: {}", node.path, err))?;
    node.mtime = Some(mtime);
    Ok(mtime)
}

fn mark_edge(
    graph: &mut Graph,
    disk: &dyn Disk,
    log: &BuildLog,
    id: EdgeId,
    stack: &mut Vec<EdgeId>,
) -> anyhow::Result<()> {
    match graph.edges.get(id).mark {
        VisitMark::Done => return Ok(()),
        VisitMark::InProgress => {
            bail!("dependency cycle: {}", cycle_path(graph, stack, id))
        }
        VisitMark::Unvisited => {}
    }
    graph.edges.get_mut(id).mark = VisitMark::InProgress;
    stack.push(id);

    let phony = graph.is_phony(id);
    let ins = graph.edges.get(id).ins.clone();
    for &input in &ins {
        stat(graph, disk, input)?;
        match graph.files.get(input).in_edge {
            Some(producer) => mark_edge(graph, disk, log, producer, stack)?,
            None => {
                let missing = graph.files.get(input).mtime == Some(MTime::Missing);
                graph.files.get_mut(input).dirty = missing;
                if missing && !phony {
                    let out = graph.edges.get(id).outs[0];
                    bail!(
                        "'{}', needed by '{}', missing and no known rule to make it",
                        graph.path(input),
                        graph.path(out)
                    );
                }
            }
        }
    }

    let outs = graph.edges.get(id).outs.clone();
    for &out in &outs {
        stat(graph, disk, out)?;
    }

    // The newest dirtying input; order-only inputs are excluded.
    let mut input_mtime: Option<i64> = None;
    let mut input_dirty = false;
    let mut input_missing = false;
    for &input in graph.edges.get(id).dirtying_ins() {
        let node = graph.files.get(input);
        input_dirty |= node.dirty;
        match node.mtime {
            Some(MTime::Stamp(t)) => {
                input_mtime = Some(input_mtime.map_or(t, |m| m.max(t)));
            }
            Some(MTime::Missing) => input_missing = true,
            None => {}
        }
    }

    let dirty = if phony {
        // Phony edges run nothing, but their dirtiness forces dependents.
        input_dirty || input_missing
    } else {
        let command = graph
            .evaluate_command(id)
            .unwrap_or_default();
        let hash = hash_command(&command);
        let mut dirty = input_dirty;
        if !dirty {
            for &out in &outs {
                let node = graph.files.get(out);
                let out_dirty = match node.mtime {
                    Some(MTime::Missing) | None => true,
                    Some(MTime::Stamp(out_mtime)) => match log.lookup(&node.path) {
                        None => true,
                        Some(entry) if entry.command_hash != hash => true,
                        Some(_) => matches!(input_mtime, Some(m) if out_mtime < m),
                    },
                };
                if out_dirty {
                    dirty = true;
                    break;
                }
            }
        }
        dirty
    };

    if dirty {
        graph.edges.get_mut(id).dirty = true;
        for &out in &outs {
            graph.files.get_mut(out).dirty = true;
        }
    }

    stack.pop();
    graph.edges.get_mut(id).mark = VisitMark::Done;
    Ok(())
}

fn cycle_path(graph: &Graph, stack: &[EdgeId], id: EdgeId) -> String {
    let pos = stack.iter().position(|&e| e == id).unwrap_or(0);
    let mut names: Vec<&str> = stack[pos..]
        .iter()
        .map(|&e| graph.path(graph.edges.get(e).outs[0]))
        .collect();
    names.push(graph.path(graph.edges.get(id).outs[0]));
    names.join(" -> ")
}
