//! Tests for the `-t` subtools.

use crate::e2e::*;

fn chain_space() -> anyhow::Result<TestSpace> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build a.o: touch a.c",
            "build app: touch a.o",
            "build all: phony app",
            "",
        ]
        .join("\n"),
    )?;
    space.write("a.c", "")?;
    Ok(space)
}

#[test]
fn list_tools() -> anyhow::Result<()> {
    let space = chain_space()?;
    let out = space.run_expect(&mut kiln_command(vec!["-t", "list"]))?;
    assert_output_contains(&out, "clean");
    assert_output_contains(&out, "targets");
    Ok(())
}

#[test]
fn unknown_tool_suggests() -> anyhow::Result<()> {
    let space = chain_space()?;
    let out = space.run(&mut kiln_command(vec!["-t", "comands"]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "did you mean 'commands'?");
    Ok(())
}

#[test]
fn commands_in_dependency_order() -> anyhow::Result<()> {
    let space = chain_space()?;
    let out = space.run_expect(&mut kiln_command(vec!["-t", "commands", "app"]))?;
    assert_output_contains(&out, "touch a.o\ntouch app\n");
    Ok(())
}

#[test]
fn clean_removes_built_files() -> anyhow::Result<()> {
    let space = chain_space()?;
    space.run_expect(&mut kiln_command(vec!["app"]))?;
    assert!(space.read("app").is_ok());

    let out = space.run_expect(&mut kiln_command(vec!["-t", "clean"]))?;
    assert_output_contains(&out, "removed 2 files.");
    assert!(space.read("a.o").is_err());
    assert!(space.read("app").is_err());
    // Sources survive.
    assert!(space.read("a.c").is_ok());

    // Everything rebuilds afterwards.
    let out = space.run_expect(&mut kiln_command(vec!["app"]))?;
    assert_output_contains(&out, "ran 2 tasks");
    Ok(())
}

#[test]
fn targets_lists_outputs() -> anyhow::Result<()> {
    let space = chain_space()?;
    let out = space.run_expect(&mut kiln_command(vec!["-t", "targets", "all"]))?;
    assert_output_contains(&out, "a.o: touch");
    assert_output_contains(&out, "app: touch");
    assert_output_contains(&out, "all: phony");
    Ok(())
}

#[test]
fn query_shows_inputs_and_outputs() -> anyhow::Result<()> {
    let space = chain_space()?;
    let out = space.run_expect(&mut kiln_command(vec!["-t", "query", "a.o"]))?;
    assert_output_contains(&out, "a.o:");
    assert_output_contains(&out, "input: touch");
    assert_output_contains(&out, "a.c");
    assert_output_contains(&out, "app");
    Ok(())
}

#[test]
fn rules_lists_rule_names() -> anyhow::Result<()> {
    let space = chain_space()?;
    let out = space.run_expect(&mut kiln_command(vec!["-t", "rules"]))?;
    assert_output_contains(&out, "phony");
    assert_output_contains(&out, "touch");
    Ok(())
}

#[test]
fn graph_emits_dot() -> anyhow::Result<()> {
    let space = chain_space()?;
    let out = space.run_expect(&mut kiln_command(vec!["-t", "graph", "app"]))?;
    assert_output_contains(&out, "digraph build {");
    assert_output_contains(&out, "\"a.c\" ->");
    assert_output_contains(&out, "-> \"app\"");
    Ok(())
}
