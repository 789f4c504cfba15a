//! The build graph: nodes (files), edges (rule invocations producing files
//! from other files), and rules (named command templates).
//!
//! Nodes and edges reference each other cyclically, so both live in arenas
//! addressed by stable integer ids; the path-to-node index is a separate
//! hash map.

use crate::densemap::{self, DenseMap};
use crate::disk::MTime;
use crate::eval::{Scope, Template};
use crate::smallmap::SmallMap;
use crate::spell;
use anyhow::bail;
use std::borrow::Cow;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);
impl densemap::Index for FileId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for FileId {
    fn from(u: usize) -> FileId {
        FileId(u as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);
impl densemap::Index for EdgeId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for EdgeId {
    fn from(u: usize) -> EdgeId {
        EdgeId(u as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(u32);
impl densemap::Index for RuleId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for RuleId {
    fn from(u: usize) -> RuleId {
        RuleId(u as u32)
    }
}

/// Lexical scopes are created per manifest file chain; `subninja` gets a
/// child scope, `include` shares its parent's.
pub type ScopeId = usize;

/// A file path known to the graph: either a source or the output of an edge.
#[derive(Debug)]
pub struct Node {
    pub path: String,
    /// The edge that produces this file, if any.
    pub in_edge: Option<EdgeId>,
    /// Edges that consume this file as an input.
    pub out_edges: Vec<EdgeId>,
    /// Last stat result; None when not yet statted this run.
    pub mtime: Option<MTime>,
    /// Computed by dirtiness analysis: must this file be (re)built?
    pub dirty: bool,
}

/// A named command template.  Variable references are left unexpanded until
/// an edge evaluates them against its own scope.
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    /// None for phony, which runs nothing.
    pub command: Option<Template<String>>,
    pub description: Option<Template<String>>,
    pub depfile: Option<Template<String>>,
    pub generator: bool,
    pub restat: bool,
}

/// Per-edge state of the dirtiness traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitMark {
    Unvisited,
    InProgress,
    Done,
}

/// One invocation of a rule.  Inputs are partitioned into three contiguous
/// groups: explicit, implicit, then order-only.
#[derive(Debug)]
pub struct Edge {
    pub rule: RuleId,
    pub ins: Vec<FileId>,
    pub explicit_ins: usize,
    pub implicit_ins: usize,
    pub outs: Vec<FileId>,
    pub explicit_outs: usize,
    /// Edge-local variable bindings, already expanded.
    pub bindings: SmallMap<String, String>,
    pub scope: ScopeId,
    pub mark: VisitMark,
    pub dirty: bool,
}

impl Edge {
    /// Inputs whose changes make the outputs stale: explicit and implicit,
    /// but not order-only.
    pub fn dirtying_ins(&self) -> &[FileId] {
        &self.ins[..self.explicit_ins + self.implicit_ins]
    }

    pub fn order_only_ins(&self) -> &[FileId] {
        &self.ins[self.explicit_ins + self.implicit_ins..]
    }

    pub fn explicit_ins(&self) -> &[FileId] {
        &self.ins[..self.explicit_ins]
    }

    pub fn explicit_outs(&self) -> &[FileId] {
        &self.outs[..self.explicit_outs]
    }
}

/// The whole loaded build description.
#[derive(Debug)]
pub struct Graph {
    pub files: DenseMap<FileId, Node>,
    by_path: HashMap<String, FileId>,
    pub edges: DenseMap<EdgeId, Edge>,
    pub rules: DenseMap<RuleId, Rule>,
    rules_by_name: HashMap<String, RuleId>,
    /// Explicitly-declared default targets.
    pub defaults: Vec<FileId>,
    scopes: Vec<HashMap<String, String>>,
    pub phony: RuleId,
}

impl Graph {
    pub fn new() -> Graph {
        let mut graph = Graph {
            files: DenseMap::new(),
            by_path: HashMap::new(),
            edges: DenseMap::new(),
            rules: DenseMap::new(),
            rules_by_name: HashMap::new(),
            defaults: Vec::new(),
            scopes: vec![HashMap::new()],
            phony: RuleId::from(0),
        };
        graph.phony = graph
            .add_rule(Rule {
                name: "phony".to_owned(),
                command: None,
                description: None,
                depfile: None,
                generator: false,
                restat: false,
            })
            .unwrap();
        graph
    }

    /// Look up a file by canonical path, adding it if not yet known.
    pub fn file_id(&mut self, path: String) -> FileId {
        match self.by_path.get(&path) {
            Some(&id) => id,
            None => {
                let id = self.files.push(Node {
                    path: path.clone(),
                    in_edge: None,
                    out_edges: Vec::new(),
                    mtime: None,
                    dirty: false,
                });
                self.by_path.insert(path, id);
                id
            }
        }
    }

    pub fn lookup(&self, path: &str) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    pub fn path(&self, id: FileId) -> &str {
        &self.files.get(id).path
    }

    pub fn add_rule(&mut self, rule: Rule) -> anyhow::Result<RuleId> {
        if self.rules_by_name.contains_key(&rule.name) {
            bail!("duplicate rule '{}'", rule.name);
        }
        let name = rule.name.clone();
        let id = self.rules.push(rule);
        self.rules_by_name.insert(name, id);
        Ok(id)
    }

    pub fn rule_by_name(&self, name: &str) -> Option<RuleId> {
        self.rules_by_name.get(name).copied()
    }

    /// Add an edge, linking it into its inputs' and outputs' nodes.  Two
    /// edges claiming the same output is an error.
    pub fn add_edge(&mut self, edge: Edge) -> anyhow::Result<EdgeId> {
        let id = self.edges.next_id();
        for &out in &edge.outs {
            let node = self.files.get_mut(out);
            if node.in_edge.is_some() {
                bail!("multiple rules generate {}", node.path);
            }
            node.in_edge = Some(id);
        }
        for &input in &edge.ins {
            self.files.get_mut(input).out_edges.push(id);
        }
        Ok(self.edges.push(edge))
    }

    pub fn is_phony(&self, id: EdgeId) -> bool {
        self.edges.get(id).rule == self.phony
    }

    /// Targets to build when none are named: the declared defaults, or
    /// every built file nothing consumes (leaf outputs).
    pub fn default_targets(&self) -> Vec<FileId> {
        if !self.defaults.is_empty() {
            return self.defaults.clone();
        }
        self.root_nodes()
    }

    /// Built files with no consumers.
    pub fn root_nodes(&self) -> Vec<FileId> {
        self.files
            .iter()
            .filter(|(_, node)| node.in_edge.is_some() && node.out_edges.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// The known path nearest to `path`, for "did you mean" suggestions.
    pub fn spellcheck(&self, path: &str) -> Option<FileId> {
        spell::nearest(path, self.files.iter().map(|(_, node)| node.path.as_str()))
            .and_then(|suggestion| self.lookup(suggestion))
    }

    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        let scope = self.scopes[parent].clone();
        self.scopes.push(scope);
        self.scopes.len() - 1
    }

    pub fn scope(&self, id: ScopeId) -> &HashMap<String, String> {
        &self.scopes[id]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut HashMap<String, String> {
        &mut self.scopes[id]
    }

    /// The fully-evaluated command for an edge; None for phony edges.
    /// This is a pure function of the edge, and its output is what the
    /// build log hashes.
    pub fn evaluate_command(&self, id: EdgeId) -> Option<String> {
        let edge = self.edges.get(id);
        let rule = self.rules.get(edge.rule);
        let scope = EdgeScope { graph: self, edge };
        rule.command.as_ref().map(|t| t.evaluate(&[&scope]))
    }

    pub fn evaluate_description(&self, id: EdgeId) -> Option<String> {
        let edge = self.edges.get(id);
        let rule = self.rules.get(edge.rule);
        let scope = EdgeScope { graph: self, edge };
        rule.description
            .as_ref()
            .map(|t| t.evaluate(&[&scope]))
            .filter(|desc| !desc.is_empty())
    }

    pub fn evaluate_depfile(&self, id: EdgeId) -> Option<String> {
        let edge = self.edges.get(id);
        let rule = self.rules.get(edge.rule);
        let scope = EdgeScope { graph: self, edge };
        rule.depfile
            .as_ref()
            .map(|t| t.evaluate(&[&scope]))
            .filter(|path| !path.is_empty())
    }

    fn paths(&self, ids: &[FileId]) -> String {
        let mut out = String::new();
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&self.files.get(id).path);
        }
        out
    }
}

/// The lexical lookup chain for evaluating an edge's templates:
/// the `$in`/`$out` built-ins, then edge-local bindings, then the scope of
/// the manifest file the edge was declared in.
struct EdgeScope<'a> {
    graph: &'a Graph,
    edge: &'a Edge,
}

impl Scope for EdgeScope<'_> {
    fn lookup(&self, var: &str) -> Option<Cow<str>> {
        match var {
            "in" => Some(Cow::Owned(self.graph.paths(self.edge.explicit_ins()))),
            "out" => Some(Cow::Owned(self.graph.paths(self.edge.explicit_outs()))),
            _ => self
                .edge
                .bindings
                .get(var)
                .map(|val| Cow::Borrowed(val.as_str()))
                .or_else(|| {
                    self.graph
                        .scope(self.edge.scope)
                        .get(var)
                        .map(|val| Cow::Borrowed(val.as_str()))
                }),
        }
    }
}
