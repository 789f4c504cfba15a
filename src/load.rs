//! Loads build manifests into a Graph: resolves parsed statements, follows
//! include/subninja, and folds depfile-discovered headers into edges.

use crate::canon::canon_path;
use crate::depfile;
use crate::disk::Disk;
use crate::eval::{Scope, Template};
use crate::graph::{Edge, EdgeId, FileId, Graph, Rule, ScopeId, VisitMark};
use crate::parse::{self, Statement};
use crate::scanner::Scanner;
use crate::smallmap::SmallMap;
use anyhow::{anyhow, bail};
use std::path::Path;

/// A loaded build description.
#[derive(Debug)]
pub struct State {
    pub graph: Graph,
    /// The manifest's top-level `builddir` binding, where the build log
    /// lives.
    pub builddir: Option<String>,
}

/// Load the manifest at `path` (and everything it includes).
pub fn read(disk: &dyn Disk, path: &str) -> anyhow::Result<State> {
    let mut loader = Loader {
        graph: Graph::new(),
        disk,
    };
    let path = canon_path(path)?;
    loader.load(&path, 0)?;
    let builddir = loader.graph.scope(0).get("builddir").cloned();
    Ok(State {
        graph: loader.graph,
        builddir,
    })
}

struct Loader<'a> {
    graph: Graph,
    disk: &'a dyn Disk,
}

impl Loader<'_> {
    fn load(&mut self, path: &str, scope: ScopeId) -> anyhow::Result<()> {
        let mut bytes = self
            .disk
            .read_file(path)
            .map_err(|err| anyhow!("read {}: {}", path, err))?;
        bytes.push(0);
        let mut parser = parse::Parser::new(&bytes);
        loop {
            let stmt = match parser.read() {
                Err(err) => bail!(parser.format_parse_error(Path::new(path), err)),
                Ok(None) => break,
                Ok(Some(stmt)) => stmt,
            };
            match stmt {
                Statement::Binding(name, template) => {
                    let value = self.evaluate(&template, scope);
                    self.graph.scope_mut(scope).insert(name.to_owned(), value);
                }
                Statement::Rule(rule) => self.add_rule(rule)?,
                Statement::Build(build) => self.add_build(build, scope, path)?,
                Statement::Default(paths) => {
                    for template in paths {
                        let name = canon_path(&self.evaluate(&template, scope))?;
                        match self.graph.lookup(&name) {
                            Some(id) => self.graph.defaults.push(id),
                            None => bail!("unknown default target '{}'", name),
                        }
                    }
                }
                Statement::Include(template) => {
                    let include = canon_path(&self.evaluate(&template, scope))?;
                    self.load(&include, scope)?;
                }
                Statement::Subninja(template) => {
                    let sub = canon_path(&self.evaluate(&template, scope))?;
                    let child = self.graph.new_scope(scope);
                    self.load(&sub, child)?;
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, template: &Template<&str>, scope: ScopeId) -> String {
        let scope: &dyn Scope = self.graph.scope(scope);
        template.evaluate(&[scope])
    }

    fn add_rule(&mut self, rule: parse::Rule) -> anyhow::Result<()> {
        let mut command = None;
        let mut description = None;
        let mut depfile = None;
        let mut generator = false;
        let mut restat = false;
        for (name, template) in rule.vars.into_iter() {
            match name {
                "command" => command = Some(template.into_owned()),
                "description" => description = Some(template.into_owned()),
                "depfile" => depfile = Some(template.into_owned()),
                "generator" => generator = true,
                "restat" => restat = true,
                // The parser validated the name already.
                _ => unreachable!("unexpected rule variable {:?}", name),
            }
        }
        if command.is_none() {
            bail!("rule '{}' has no command", rule.name);
        }
        self.graph.add_rule(Rule {
            name: rule.name.to_owned(),
            command,
            description,
            depfile,
            generator,
            restat,
        })?;
        Ok(())
    }

    fn add_build(&mut self, build: parse::Build, scope: ScopeId, path: &str) -> anyhow::Result<()> {
        let rule = match self.graph.rule_by_name(build.rule) {
            Some(rule) => rule,
            None => bail!("{}:{}: unknown rule '{}'", path, build.line, build.rule),
        };

        // Edge bindings come first: paths may refer to them.
        let mut bindings: SmallMap<String, String> = SmallMap::default();
        for (name, template) in build.vars.into_iter() {
            let value = {
                let local: &dyn Scope = &bindings;
                let file: &dyn Scope = self.graph.scope(scope);
                template.evaluate(&[local, file])
            };
            bindings.insert(name.to_owned(), value);
        }

        let evaluate_paths = |templates: &[Template<&str>]| -> anyhow::Result<Vec<String>> {
            let local: &dyn Scope = &bindings;
            let file: &dyn Scope = self.graph.scope(scope);
            templates
                .iter()
                .map(|t| canon_path(&t.evaluate(&[local, file])))
                .collect()
        };
        let out_paths = evaluate_paths(&build.outs)
            .map_err(|err| anyhow!("{}:{}: {}", path, build.line, err))?;
        let in_paths = evaluate_paths(&build.ins)
            .map_err(|err| anyhow!("{}:{}: {}", path, build.line, err))?;
        if out_paths.is_empty() {
            bail!("{}:{}: expected output path", path, build.line);
        }

        let outs: Vec<FileId> = out_paths
            .into_iter()
            .map(|p| self.graph.file_id(p))
            .collect();
        let ins: Vec<FileId> = in_paths
            .into_iter()
            .map(|p| self.graph.file_id(p))
            .collect();

        let id = self
            .graph
            .add_edge(Edge {
                rule,
                ins,
                explicit_ins: build.explicit_ins,
                implicit_ins: build.implicit_ins,
                outs,
                explicit_outs: build.explicit_outs,
                bindings,
                scope,
                mark: VisitMark::Unvisited,
                dirty: false,
            })
            .map_err(|err| anyhow!("{}:{}: {}", path, build.line, err))?;

        self.apply_depfile(id)
    }

    /// If the edge's rule names a depfile, fold the headers recorded there
    /// into the edge's implicit inputs.  A missing depfile just means the
    /// edge has not run yet.
    fn apply_depfile(&mut self, id: EdgeId) -> anyhow::Result<()> {
        let depfile_path = match self.graph.evaluate_depfile(id) {
            Some(path) => canon_path(&path)?,
            None => return Ok(()),
        };
        let mut bytes = match self.disk.read_file(&depfile_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => bail!("read {}: {}", depfile_path, err),
        };
        bytes.push(0);
        let mut scanner = Scanner::new(&bytes);
        let deps = depfile::parse(&mut scanner)
            .map_err(|err| anyhow!(scanner.format_parse_error(Path::new(&depfile_path), err)))?;

        // Use the entry for the edge's first output; tolerate depfiles whose
        // target spelling doesn't match by falling back to the first entry.
        let first_out = self
            .graph
            .path(self.graph.edges.get(id).outs[0])
            .to_owned();
        let dep_paths: Vec<String> = match deps.get(first_out.as_str()) {
            Some(deps) => deps.iter().map(|s| s.to_string()).collect(),
            None => deps
                .iter()
                .next()
                .map(|(_, deps)| deps.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default(),
        };

        for dep in dep_paths {
            let dep = canon_path(&dep)?;
            let file = self.graph.file_id(dep);
            let edge = self.graph.edges.get_mut(id);
            if edge.ins.contains(&file) {
                continue;
            }
            let pos = edge.explicit_ins + edge.implicit_ins;
            edge.ins.insert(pos, file);
            edge.implicit_ins += 1;
            self.graph.files.get_mut(file).out_edges.push(id);
        }
        Ok(())
    }
}
