//! Build runner: the Plan decides which edges must run and in what order;
//! Work pumps ready edges through the task runner, recording completions in
//! the build log.
//!
//! All graph and plan mutation happens on the coordinator thread; worker
//! threads only own a subprocess and report back over a channel.

use crate::build_log::{BuildLog, LogEntry};
use crate::dirty;
use crate::disk::{self, Disk, MTime};
use crate::graph::{EdgeId, FileId, Graph};
use crate::hash::hash_command;
use crate::metrics::{self, Metrics};
use crate::progress::Progress;
use crate::signal;
use crate::task::{Runner, TaskResult, Termination};
use anyhow::{anyhow, bail};
use std::collections::{HashMap, HashSet, VecDeque};

/// Build configuration.
pub struct Options {
    pub parallelism: usize,
    /// Stop after this many failed tasks; zero means keep going as long as
    /// progress can be made.
    pub keep_going: usize,
    /// Print commands without running them, pretending they succeeded.
    pub dry_run: bool,
    /// Print full command lines instead of descriptions.
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildState {
    /// Wanted, but blocked on inputs some other edge must produce.
    Want,
    /// All inputs up to date; waiting for a runner slot.
    Ready,
    Running,
    Done,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct StateCounts([usize; 5]);

impl StateCounts {
    fn idx(state: BuildState) -> usize {
        match state {
            BuildState::Want => 0,
            BuildState::Ready => 1,
            BuildState::Running => 2,
            BuildState::Done => 3,
            BuildState::Failed => 4,
        }
    }

    pub fn add(&mut self, state: BuildState, delta: isize) {
        let slot = &mut self.0[Self::idx(state)];
        *slot = (*slot as isize + delta) as usize;
    }

    pub fn get(&self, state: BuildState) -> usize {
        self.0[Self::idx(state)]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

/// Plan tracks progress through one build.  An edge lives in exactly one
/// place: `want` (possibly also queued in `ready` when its counter is
/// zero), `running`, or out of the plan entirely (finished, cleaned, or
/// abandoned after a failure).
struct Plan {
    /// Edges to bring up to date that have not started, mapped to the
    /// number of inputs a wanted edge still has to produce.
    want: HashMap<EdgeId, usize>,
    /// Edges in `want` whose inputs are all satisfied, in the order they
    /// became ready.
    ready: VecDeque<EdgeId>,
    /// Edges handed out by pop_ready and not yet finished.
    running: HashSet<EdgeId>,
    /// Visited edges that need nothing at all, so repeat visits are cheap.
    clean: HashSet<EdgeId>,
    counts: StateCounts,
}

impl Plan {
    fn new() -> Self {
        Plan {
            want: HashMap::new(),
            ready: VecDeque::new(),
            running: HashSet::new(),
            clean: HashSet::new(),
            counts: StateCounts::default(),
        }
    }

    fn is_done(&self) -> bool {
        self.want.is_empty() && self.running.is_empty()
    }

    /// Add the producing edge of `id` to the plan if it is dirty or if
    /// anything it recursively requires must run first (an up-to-date edge
    /// can still owe its order-only inputs a rebuild; it will complete
    /// synthetically once they exist).  Returns whether dependents must
    /// wait for this node.
    fn add_target(&mut self, graph: &Graph, id: FileId) -> bool {
        let Some(edge) = graph.files.get(id).in_edge else {
            // A source file: nothing to wait for.  Missing sources needed
            // by non-phony edges were already rejected by the dirty scan.
            return false;
        };
        if self.want.contains_key(&edge) || self.running.contains(&edge) {
            return true;
        }
        if self.clean.contains(&edge) {
            return false;
        }
        // The dirty scan rejected cycles, so this recursion terminates.
        let mut unsatisfied = 0;
        for i in 0..graph.edges.get(edge).ins.len() {
            let input = graph.edges.get(edge).ins[i];
            if self.add_target(graph, input) {
                unsatisfied += 1;
            }
        }
        if unsatisfied == 0 && !graph.edges.get(edge).dirty {
            self.clean.insert(edge);
            return false;
        }
        self.want.insert(edge, unsatisfied);
        if unsatisfied == 0 {
            self.counts.add(BuildState::Ready, 1);
            self.ready.push_back(edge);
        } else {
            self.counts.add(BuildState::Want, 1);
        }
        true
    }

    /// Hand out the next ready edge, in the order edges became ready.
    fn pop_ready(&mut self) -> Option<EdgeId> {
        while let Some(id) = self.ready.pop_front() {
            // Edges cleaned or abandoned after queueing are skipped.
            if self.want.remove(&id).is_some() {
                self.running.insert(id);
                self.counts.add(BuildState::Ready, -1);
                self.counts.add(BuildState::Running, 1);
                return Some(id);
            }
        }
        None
    }

    /// One of `id`'s inputs is now up to date; queue `id` when all are.
    fn satisfy_input(&mut self, id: EdgeId) {
        if let Some(count) = self.want.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.counts.add(BuildState::Want, -1);
                self.counts.add(BuildState::Ready, 1);
                self.ready.push_back(id);
            }
        }
    }

    fn edge_finished(&mut self, id: EdgeId, success: bool) {
        self.running.remove(&id);
        self.counts.add(BuildState::Running, -1);
        self.counts.add(
            if success {
                BuildState::Done
            } else {
                BuildState::Failed
            },
            1,
        );
    }

    /// Drop `id` from `want`, adjusting the state counts.
    fn remove_wanted(&mut self, id: EdgeId) -> bool {
        match self.want.remove(&id) {
            Some(count) => {
                self.counts.add(
                    if count == 0 {
                        BuildState::Ready
                    } else {
                        BuildState::Want
                    },
                    -1,
                );
                true
            }
            None => false,
        }
    }

    /// After `id` failed, its transitive dependents can never run; silently
    /// drop them from the plan.
    fn abandon_dependents(&mut self, graph: &Graph, id: EdgeId) {
        let mut stack = vec![id];
        while let Some(edge) = stack.pop() {
            for &out in &graph.edges.get(edge).outs {
                for &consumer in &graph.files.get(out).out_edges {
                    if self.remove_wanted(consumer) {
                        stack.push(consumer);
                    }
                }
            }
        }
    }
}

pub struct Work<'a> {
    graph: &'a mut Graph,
    log: &'a mut BuildLog,
    disk: &'a dyn Disk,
    options: &'a Options,
    progress: &'a mut dyn Progress,
    metrics: Option<&'a Metrics>,
    plan: Plan,
}

impl<'a> Work<'a> {
    pub fn new(
        graph: &'a mut Graph,
        log: &'a mut BuildLog,
        disk: &'a dyn Disk,
        options: &'a Options,
        progress: &'a mut dyn Progress,
        metrics: Option<&'a Metrics>,
    ) -> Self {
        Work {
            graph,
            log,
            disk,
            options,
            progress,
            metrics,
            plan: Plan::new(),
        }
    }

    /// Analyze `id`'s subgraph and plan whatever is out of date.  Planning
    /// nothing is not an error; the build is simply already up to date.
    pub fn want_file(&mut self, id: FileId) -> anyhow::Result<()> {
        metrics::scope(self.metrics, "scan", || {
            dirty::mark_subgraph(self.graph, self.disk, self.log, id)
        })?;
        let node = self.graph.files.get(id);
        if node.dirty && node.in_edge.is_none() {
            bail!("'{}' missing and no known rule to make it", node.path);
        }
        self.plan.add_target(self.graph, id);
        Ok(())
    }

    /// What to display for an edge: its description, or the command line
    /// when verbose or undescribed.
    fn build_message(&self, id: EdgeId) -> String {
        let description = self.graph.evaluate_description(id);
        let message = if self.options.verbose {
            self.graph.evaluate_command(id).or(description)
        } else {
            description.or_else(|| self.graph.evaluate_command(id))
        };
        message.unwrap_or_default()
    }

    /// Decrement the input counters of everything consuming `id`'s outputs.
    fn satisfy_dependents(&mut self, id: EdgeId) {
        let outs = self.graph.edges.get(id).outs.clone();
        for &out in &outs {
            let consumers = self.graph.files.get(out).out_edges.clone();
            for consumer in consumers {
                self.plan.satisfy_input(consumer);
            }
        }
    }

    /// Complete an edge without running anything: phony edges and dry runs.
    fn finish_synthetic(&mut self, id: EdgeId) {
        let outs = self.graph.edges.get(id).outs.clone();
        for &out in &outs {
            self.graph.files.get_mut(out).dirty = false;
        }
        self.plan.edge_finished(id, true);
        self.satisfy_dependents(id);
    }

    /// An edge's task succeeded: restat its outputs, append to the log, and
    /// unblock dependents.
    fn record_finished(&mut self, id: EdgeId, start_stamp: i64) -> anyhow::Result<()> {
        let restat = self.graph.rules.get(self.graph.edges.get(id).rule).restat;
        let outs = self.graph.edges.get(id).outs.clone();
        let mut unchanged = Vec::new();
        for &out in &outs {
            let prev = self.graph.files.get(out).mtime;
            let path = self.graph.files.get(out).path.clone();
            let now = self
                .disk
                .stat(&path)
                .map_err(|err| anyhow!("stat {}: {}", path, err))?;
            if restat && now != MTime::Missing && prev == Some(now) {
                unchanged.push(out);
            }
            let node = self.graph.files.get_mut(out);
            node.mtime = Some(now);
            node.dirty = false;
        }

        let hash = hash_command(&self.graph.evaluate_command(id).unwrap_or_default());
        for &out in &outs {
            let node = self.graph.files.get(out);
            let end_mtime = node.mtime.and_then(|m| m.stamp()).unwrap_or(0);
            let path = node.path.clone();
            self.log.record(
                &path,
                LogEntry {
                    start_mtime: start_stamp,
                    end_mtime,
                    command_hash: hash,
                },
            )?;
        }

        self.plan.edge_finished(id, true);
        self.satisfy_dependents(id);

        // Outputs a restat edge did not actually touch may let pending
        // dependents become clean without running.
        for &out in &unchanged {
            self.clean_dependents(out);
        }
        Ok(())
    }

    /// `out` was re-statted after its edge ran and had not changed.
    /// Pending dependents whose other inputs are also clean no longer need
    /// to run; remove them and cascade.
    fn clean_dependents(&mut self, out: FileId) {
        let mut stack = vec![out];
        while let Some(node_id) = stack.pop() {
            self.graph.files.get_mut(node_id).dirty = false;
            let consumers = self.graph.files.get(node_id).out_edges.clone();
            for consumer in consumers {
                if !self.plan.want.contains_key(&consumer) {
                    continue;
                }
                if !self.edge_up_to_date(consumer) {
                    continue;
                }
                self.plan.remove_wanted(consumer);
                self.graph.edges.get_mut(consumer).dirty = false;
                let outs = self.graph.edges.get(consumer).outs.clone();
                for &o in &outs {
                    for c in self.graph.files.get(o).out_edges.clone() {
                        self.plan.satisfy_input(c);
                    }
                    stack.push(o);
                }
            }
        }
    }

    /// Re-check a pending edge's staleness against the current mtimes.
    fn edge_up_to_date(&self, id: EdgeId) -> bool {
        let edge = self.graph.edges.get(id);
        let mut input_mtime: Option<i64> = None;
        for &input in edge.dirtying_ins() {
            let node = self.graph.files.get(input);
            if node.dirty {
                return false;
            }
            match node.mtime {
                Some(MTime::Stamp(t)) => {
                    input_mtime = Some(input_mtime.map_or(t, |m| m.max(t)));
                }
                _ => return false,
            }
        }
        if self.graph.is_phony(id) {
            return true;
        }
        let hash = hash_command(&self.graph.evaluate_command(id).unwrap_or_default());
        for &out in &edge.outs {
            let node = self.graph.files.get(out);
            let out_mtime = match node.mtime {
                Some(MTime::Stamp(t)) => t,
                _ => return false,
            };
            match self.log.lookup(&node.path) {
                None => return false,
                Some(entry) if entry.command_hash != hash => return false,
                Some(_) => {
                    if matches!(input_mtime, Some(m) if out_mtime < m) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Execute the plan.  Returns the number of tasks run, or None if the
    /// build failed.
    pub fn run(&mut self) -> anyhow::Result<Option<usize>> {
        let mut runner = Runner::new(self.options.parallelism);
        let mut tasks_done = 0usize;
        let mut tasks_failed = 0usize;
        let mut draining = false;

        while !self.plan.is_done() || runner.is_running() {
            let mut made_progress = false;

            while !draining && !signal::was_interrupted() && runner.can_start_more() {
                let id = match self.plan.pop_ready() {
                    Some(id) => id,
                    None => break,
                };
                made_progress = true;
                if self.graph.is_phony(id) || !self.graph.edges.get(id).dirty {
                    // Phony edges and up-to-date edges that were only
                    // waiting on order-only inputs complete synthetically,
                    // with no task.
                    self.finish_synthetic(id);
                    continue;
                }
                let message = self.build_message(id);
                self.progress.task_started(id, &message);
                if self.options.dry_run {
                    tasks_done += 1;
                    let result = TaskResult {
                        termination: Termination::Success,
                        output: Vec::new(),
                    };
                    self.progress.task_finished(id, &message, &result);
                    self.finish_synthetic(id);
                    continue;
                }
                let cmdline = self.graph.evaluate_command(id).unwrap_or_default();
                let outs = self.graph.edges.get(id).outs.clone();
                for &out in &outs {
                    if let Some(dir) = disk::parent_dir(self.graph.path(out)) {
                        disk::make_dirs(self.disk, dir)
                            .map_err(|err| anyhow!("mkdir {}: {}", dir, err))?;
                    }
                }
                runner.start(id, cmdline);
                self.progress.update(&self.plan.counts);
            }

            if runner.is_running() {
                let fin = runner.wait();
                made_progress = true;
                if let Some(metrics) = self.metrics {
                    metrics.add("task", fin.span.1.duration_since(fin.span.0));
                }
                let message = self.build_message(fin.edge);
                self.progress.task_finished(fin.edge, &message, &fin.result);
                match fin.result.termination {
                    Termination::Success => {
                        tasks_done += 1;
                        self.record_finished(fin.edge, fin.start_stamp)?;
                    }
                    Termination::Interrupted => {
                        tasks_failed += 1;
                        self.plan.edge_finished(fin.edge, false);
                        self.plan.abandon_dependents(self.graph, fin.edge);
                        draining = true;
                    }
                    Termination::Failure => {
                        tasks_failed += 1;
                        self.plan.edge_finished(fin.edge, false);
                        self.plan.abandon_dependents(self.graph, fin.edge);
                        if self.options.keep_going != 0 && tasks_failed >= self.options.keep_going
                        {
                            draining = true;
                        }
                    }
                }
                self.progress.update(&self.plan.counts);
            } else if !self.plan.is_done() {
                if draining || signal::was_interrupted() {
                    break;
                }
                if !made_progress {
                    bail!("plan stalled: no task ready and none running");
                }
            }
        }

        if tasks_failed > 0 || signal::was_interrupted() {
            return Ok(None);
        }
        Ok(Some(tasks_done))
    }
}
