//! Subtools invoked with `-t`: inspection and maintenance commands that
//! operate on the loaded graph without building anything.

use crate::canon::canon_path;
use crate::densemap::Index;
use crate::disk::Disk;
use crate::graph::{EdgeId, FileId, Graph};
use crate::spell;
use anyhow::bail;
use std::collections::HashSet;

const TOOLS: &[(&str, &str)] = &[
    ("clean", "remove built files"),
    ("commands", "list commands required to rebuild the given targets"),
    ("graph", "output graphviz dot file for targets"),
    ("query", "show inputs/outputs for a path"),
    ("rules", "list all rules"),
    ("targets", "list targets by their rule or depth in the DAG"),
];

pub fn list() -> i32 {
    println!("kiln subtools:");
    for (name, desc) in TOOLS {
        println!("{:>10}  {}", name, desc);
    }
    0
}

pub fn run_tool(
    name: &str,
    graph: &Graph,
    disk: &dyn Disk,
    args: &[String],
) -> anyhow::Result<i32> {
    match name {
        "clean" => tool_clean(graph, disk, args),
        "commands" => tool_commands(graph, args),
        "graph" => tool_graph(graph, args),
        "query" => tool_query(graph, args),
        "rules" => Ok(tool_rules(graph)),
        "targets" => tool_targets(graph, args),
        _ => match spell::nearest(name, TOOLS.iter().map(|(n, _)| *n)) {
            Some(suggestion) => {
                bail!("unknown tool '{}', did you mean '{}'?", name, suggestion)
            }
            None => bail!("unknown tool '{}'", name),
        },
    }
}

/// Resolve command-line target names to nodes.  `path^` means "the first
/// output of the first edge consuming `path`".
pub fn collect_targets(graph: &Graph, names: &[String]) -> anyhow::Result<Vec<FileId>> {
    let mut targets = Vec::new();
    for name in names {
        let (name, first_dependent) = match name.strip_suffix('^') {
            Some(stripped) => (stripped, true),
            None => (name.as_str(), false),
        };
        let path = canon_path(name)?;
        let mut node = match graph.lookup(&path) {
            Some(id) => id,
            None => match graph.spellcheck(&path) {
                Some(suggestion) => bail!(
                    "unknown target '{}', did you mean '{}'?",
                    path,
                    graph.path(suggestion)
                ),
                None => bail!("unknown target '{}'", path),
            },
        };
        if first_dependent {
            let out_edges = &graph.files.get(node).out_edges;
            let edge = match out_edges.first() {
                Some(&edge) => edge,
                None => bail!("'{}' has no out edge", path),
            };
            node = graph.edges.get(edge).outs[0];
        }
        targets.push(node);
    }
    Ok(targets)
}

fn targets_or_defaults(graph: &Graph, args: &[String]) -> anyhow::Result<Vec<FileId>> {
    if args.is_empty() {
        Ok(graph.default_targets())
    } else {
        collect_targets(graph, args)
    }
}

/// All edges reachable from the given nodes, walking toward sources.
fn subgraph_edges(graph: &Graph, roots: &[FileId]) -> Vec<EdgeId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<EdgeId> = roots
        .iter()
        .filter_map(|&node| graph.files.get(node).in_edge)
        .collect();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        for &input in &graph.edges.get(id).ins {
            if let Some(producer) = graph.files.get(input).in_edge {
                stack.push(producer);
            }
        }
    }
    order
}

fn tool_clean(graph: &Graph, disk: &dyn Disk, args: &[String]) -> anyhow::Result<i32> {
    let mut clean_generator = false;
    let mut targets = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-g" => clean_generator = true,
            arg if arg.starts_with('-') => {
                bail!("usage: kiln -t clean [-g] [targets...]")
            }
            _ => targets.push(arg.clone()),
        }
    }

    let edges: Vec<EdgeId> = if targets.is_empty() {
        graph.edges.ids().collect()
    } else {
        let roots = collect_targets(graph, &targets)?;
        subgraph_edges(graph, &roots)
    };

    let mut removed = 0;
    for id in edges {
        if graph.is_phony(id) {
            continue;
        }
        // Generator outputs (the build description itself, typically)
        // survive cleaning unless explicitly asked for.
        if graph.rules.get(graph.edges.get(id).rule).generator && !clean_generator {
            continue;
        }
        for &out in &graph.edges.get(id).outs {
            if disk.remove_file(graph.path(out))? {
                removed += 1;
            }
        }
    }
    println!(
        "kiln: removed {} file{}.",
        removed,
        if removed == 1 { "" } else { "s" }
    );
    Ok(0)
}

fn tool_commands(graph: &Graph, args: &[String]) -> anyhow::Result<i32> {
    let targets = targets_or_defaults(graph, args)?;
    let mut seen = HashSet::new();
    for target in targets {
        if let Some(edge) = graph.files.get(target).in_edge {
            print_commands(graph, edge, &mut seen);
        }
    }
    Ok(0)
}

fn print_commands(graph: &Graph, id: EdgeId, seen: &mut HashSet<EdgeId>) {
    if !seen.insert(id) {
        return;
    }
    for &input in &graph.edges.get(id).ins {
        if let Some(producer) = graph.files.get(input).in_edge {
            print_commands(graph, producer, seen);
        }
    }
    if let Some(command) = graph.evaluate_command(id) {
        println!("{}", command);
    }
}

fn tool_graph(graph: &Graph, args: &[String]) -> anyhow::Result<i32> {
    let targets = targets_or_defaults(graph, args)?;
    println!("digraph build {{");
    println!("node [fontsize=10, shape=box, height=0.25]");
    println!("edge [fontsize=10]");
    for id in subgraph_edges(graph, &targets) {
        let edge = graph.edges.get(id);
        let rule = &graph.rules.get(edge.rule).name;
        println!("\"e{}\" [label=\"{}\", shape=ellipse]", id.index(), rule);
        for &input in &edge.ins {
            println!("\"{}\" -> \"e{}\"", graph.path(input), id.index());
        }
        for &out in &edge.outs {
            println!("\"e{}\" -> \"{}\"", id.index(), graph.path(out));
        }
    }
    println!("}}");
    Ok(0)
}

fn tool_query(graph: &Graph, args: &[String]) -> anyhow::Result<i32> {
    if args.is_empty() {
        bail!("expected a target to query");
    }
    for node in collect_targets(graph, args)? {
        println!("{}:", graph.path(node));
        if let Some(id) = graph.files.get(node).in_edge {
            let edge = graph.edges.get(id);
            println!("  input: {}", graph.rules.get(edge.rule).name);
            for (i, &input) in edge.ins.iter().enumerate() {
                let marker = if i >= edge.explicit_ins + edge.implicit_ins {
                    "|| "
                } else if i >= edge.explicit_ins {
                    "| "
                } else {
                    ""
                };
                println!("    {}{}", marker, graph.path(input));
            }
        }
        println!("  outputs:");
        for &consumer in &graph.files.get(node).out_edges {
            for &out in &graph.edges.get(consumer).outs {
                println!("    {}", graph.path(out));
            }
        }
    }
    Ok(0)
}

fn tool_rules(graph: &Graph) -> i32 {
    for (_, rule) in graph.rules.iter() {
        match &rule.description {
            Some(description) => println!("{}: {}", rule.name, description),
            None => println!("{}", rule.name),
        }
    }
    0
}

fn tool_targets(graph: &Graph, args: &[String]) -> anyhow::Result<i32> {
    let mode = args.first().map(|s| s.as_str()).unwrap_or("depth");
    match mode {
        "rule" => {
            match args.get(1) {
                None => {
                    // Without a rule name, list source files.
                    let mut sources: Vec<&str> = graph
                        .files
                        .iter()
                        .filter(|(_, node)| node.in_edge.is_none() && !node.out_edges.is_empty())
                        .map(|(_, node)| node.path.as_str())
                        .collect();
                    sources.sort();
                    for path in sources {
                        println!("{}", path);
                    }
                }
                Some(rule_name) => {
                    let mut outputs: Vec<&str> = Vec::new();
                    for (_, edge) in graph.edges.iter() {
                        if &graph.rules.get(edge.rule).name == rule_name {
                            outputs.extend(edge.outs.iter().map(|&out| graph.path(out)));
                        }
                    }
                    outputs.sort();
                    outputs.dedup();
                    for path in outputs {
                        println!("{}", path);
                    }
                }
            }
            Ok(0)
        }
        "all" => {
            for (_, edge) in graph.edges.iter() {
                for &out in &edge.outs {
                    println!("{}: {}", graph.path(out), graph.rules.get(edge.rule).name);
                }
            }
            Ok(0)
        }
        "depth" => {
            let depth = match args.get(1) {
                Some(depth) => depth
                    .parse::<i32>()
                    .map_err(|_| anyhow::anyhow!("invalid depth '{}'", depth))?,
                None => 1,
            };
            targets_list(graph, &graph.root_nodes(), depth, 0);
            Ok(0)
        }
        _ => match spell::nearest(mode, ["rule", "depth", "all"].into_iter()) {
            Some(suggestion) => bail!(
                "unknown targets mode '{}', did you mean '{}'?",
                mode,
                suggestion
            ),
            None => bail!("unknown targets mode '{}'", mode),
        },
    }
}

fn targets_list(graph: &Graph, nodes: &[FileId], depth: i32, indent: usize) {
    for &node in nodes {
        print!("{}", "  ".repeat(indent));
        match graph.files.get(node).in_edge {
            Some(id) => {
                let edge = graph.edges.get(id);
                println!(
                    "{}: {}",
                    graph.path(node),
                    graph.rules.get(edge.rule).name
                );
                if depth > 1 || depth <= 0 {
                    targets_list(graph, &edge.ins, depth - 1, indent + 1);
                }
            }
            None => println!("{}", graph.path(node)),
        }
    }
}
