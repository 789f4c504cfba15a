use crate::e2e::*;

#[test]
fn empty_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", "")?;
    let out = space.run(&mut kiln_command(vec![]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "kiln: no work to do\n");
    Ok(())
}

#[test]
fn basic_build() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build a.o: touch a.c", "build app: touch a.o", ""].join("\n"),
    )?;
    space.write("a.c", "")?;
    let out = space.run_expect(&mut kiln_command(vec!["app"]))?;
    assert!(space.read("a.o").is_ok());
    assert!(space.read("app").is_ok());
    assert_output_contains(&out, "ran 2 tasks");
    // The chain builds dependencies first.
    assert_output_contains(&out, "touch a.o\ntouch app\n");
    Ok(())
}

#[test]
fn second_build_is_noop() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build a.o: touch a.c", "build app: touch a.o", ""].join("\n"),
    )?;
    space.write("a.c", "")?;
    space.run_expect(&mut kiln_command(vec!["app"]))?;

    let out = space.run_expect(&mut kiln_command(vec!["app"]))?;
    assert_output_contains(&out, "no work to do");
    assert_output_not_contains(&out, "touch");
    Ok(())
}

#[test]
fn changed_command_reruns() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let manifest = |flag: &str| {
        format!(
            "
rule touch
  command = touch $out{}
  description = touch $out
build a.o: touch a.c
build app: touch a.o
",
            flag
        )
    };
    space.write("build.ninja", &manifest(""))?;
    space.write("a.c", "")?;
    space.run_expect(&mut kiln_command(vec!["app"]))?;

    // Change only the command template; file timestamps are unchanged.
    space.write("build.ninja", &manifest(" # updated"))?;
    let out = space.run_expect(&mut kiln_command(vec!["app"]))?;
    assert_output_contains(&out, "ran 2 tasks");
    Ok(())
}

#[test]
fn create_subdir() -> anyhow::Result<()> {
    // Run a build rule that needs a subdir to be automatically created.
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build subdir/out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    space.run_expect(&mut kiln_command(vec!["subdir/out"]))?;
    assert!(space.read("subdir/out").is_ok());
    Ok(())
}

#[test]
fn specify_build_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build_specified.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    space.run_expect(&mut kiln_command(vec!["-f", "build_specified.ninja", "out"]))?;
    assert!(space.read("out").is_ok());
    Ok(())
}

#[cfg(unix)]
#[test]
fn keep_going_finishes_independent_edges() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule fail
  command = false
  description = fail $out
rule touch
  command = touch $out
  description = touch $out
build x: fail src
build y: touch src
build z: touch src
",
    )?;
    space.write("src", "")?;

    let out = space.run(&mut kiln_command(vec!["-k", "0", "x", "y", "z"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "build stopped");
    assert!(space.read("y").is_ok());
    assert!(space.read("z").is_ok());
    Ok(())
}

#[cfg(unix)]
#[test]
fn default_budget_stops_after_first_failure() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule fail
  command = false
  description = fail $out
rule touch
  command = touch $out
  description = touch $out
build x: fail src
build y: touch src
build z: touch src
",
    )?;
    space.write("src", "")?;

    // With -j1 the failing edge runs first and nothing is submitted after
    // the failure is observed.
    let out = space.run(&mut kiln_command(vec!["-j", "1", "x", "y", "z"]))?;
    assert!(!out.status.success());
    assert!(space.read("y").is_err());
    assert!(space.read("z").is_err());
    Ok(())
}

#[test]
fn dry_run_touches_nothing() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build a.o: touch a.c", "build app: touch a.o", ""].join("\n"),
    )?;
    space.write("a.c", "")?;
    let out = space.run_expect(&mut kiln_command(vec!["-n", "app"]))?;
    assert_output_contains(&out, "touch a.o");
    assert_output_contains(&out, "touch app");
    assert!(space.read("a.o").is_err());
    assert!(space.read("app").is_err());
    // No entries were appended to the log, only the header.
    let log = space.read(".ninja_log")?;
    assert_eq!(String::from_utf8_lossy(&log).lines().count(), 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn verbose_prints_command_lines() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    let out = space.run_expect(&mut kiln_command(vec!["-v", "out"]))?;
    assert_output_contains(&out, "touch out");
    Ok(())
}

#[test]
fn phony_groups_without_running_anything() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build app: touch app.c",
            "build tests: touch tests.c",
            "build all: phony app tests",
            "",
        ]
        .join("\n"),
    )?;
    space.write("app.c", "")?;
    space.write("tests.c", "")?;

    // Bring tests up to date, then remove app so only its subgraph is
    // stale.
    space.run_expect(&mut kiln_command(vec!["tests"]))?;

    let out = space.run_expect(&mut kiln_command(vec!["all"]))?;
    assert_output_contains(&out, "touch app");
    assert_output_not_contains(&out, "touch tests");
    assert_output_contains(&out, "ran 1 task");
    Ok(())
}

#[test]
fn order_only_inputs_schedule_but_do_not_dirty() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build oo: touch oosrc",
            "build out: touch in || oo",
            "",
        ]
        .join("\n"),
    )?;
    space.write("in", "")?;
    space.write("oosrc", "")?;

    let out = space.run_expect(&mut kiln_command(vec!["out"]))?;
    // The order-only dependency builds first.
    assert_output_contains(&out, "touch oo\ntouch out\n");

    // Making only the order-only input stale rebuilds it, but not out.
    space.remove("oo")?;
    let out = space.run_expect(&mut kiln_command(vec!["out"]))?;
    assert_output_contains(&out, "touch oo");
    assert_output_not_contains(&out, "touch out");
    assert_output_contains(&out, "ran 1 task");
    Ok(())
}

#[test]
fn caret_builds_first_dependent_output() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    space.run_expect(&mut kiln_command(vec!["in^"]))?;
    assert!(space.read("out").is_ok());
    Ok(())
}

#[test]
fn unknown_target_suggests_nearest() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build app: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    let out = space.run(&mut kiln_command(vec!["ap"]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "unknown target 'ap', did you mean 'app'?");
    Ok(())
}

#[test]
fn entering_directory_banner() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.make_dir("sub")?;
    space.write(
        "sub/build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("sub/in", "")?;
    let out = space.run_expect(&mut kiln_command(vec!["-C", "sub", "out"]))?;
    assert_output_contains(&out, "kiln: Entering directory `sub'");
    assert!(space.read("sub/out").is_ok());
    Ok(())
}

#[test]
fn builddir_holds_the_log() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            "builddir = meta",
            TOUCH_RULE,
            "build out: touch in",
            "",
        ]
        .join("\n"),
    )?;
    space.write("in", "")?;
    space.run_expect(&mut kiln_command(vec!["out"]))?;
    assert!(space.metadata("meta")?.is_dir());
    assert!(space.read("meta/.ninja_log").is_ok());
    Ok(())
}

#[test]
fn default_targets_are_built() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build a: touch in",
            "build b: touch in",
            "default a",
            "",
        ]
        .join("\n"),
    )?;
    space.write("in", "")?;
    space.run_expect(&mut kiln_command(vec![]))?;
    assert!(space.read("a").is_ok());
    assert!(space.read("b").is_err());
    Ok(())
}

#[test]
fn debug_list_and_stats() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;

    let out = space.run(&mut kiln_command(vec!["-d", "list"]))?;
    assert_output_contains(&out, "stats");

    let out = space.run_expect(&mut kiln_command(vec!["-d", "stats", "out"]))?;
    assert_output_contains(&out, "metric");
    assert_output_contains(&out, "count");
    Ok(())
}

#[test]
fn unknown_flag_is_a_usage_error() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", "")?;
    let out = space.run(&mut kiln_command(vec!["--frobnicate"]))?;
    assert_eq!(out.status.code(), Some(2));
    Ok(())
}
