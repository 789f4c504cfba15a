//! Tests around missing files and malformed graphs.

use crate::e2e::*;

#[test]
fn missing_source_fails() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    let out = space.run(&mut kiln_command(vec!["out"]))?;
    assert!(!out.status.success());
    assert_stderr_contains(
        &out,
        "'in', needed by 'out', missing and no known rule to make it",
    );
    Ok(())
}

#[test]
fn missing_manifest_fails() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut kiln_command(vec![]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "read build.ninja");
    Ok(())
}

#[test]
fn dependency_cycle_fails() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build a: touch b", "build b: touch a", ""].join("\n"),
    )?;
    let out = space.run(&mut kiln_command(vec!["a"]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "dependency cycle");
    Ok(())
}

#[test]
fn duplicate_output_fails() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build out: touch a",
            "build out: touch b",
            "",
        ]
        .join("\n"),
    )?;
    space.write("a", "")?;
    space.write("b", "")?;
    let out = space.run(&mut kiln_command(vec!["out"]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "multiple rules generate out");
    Ok(())
}

#[test]
fn parse_error_reports_location() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", "rule\n")?;
    let out = space.run(&mut kiln_command(vec![]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "build.ninja:1:");
    Ok(())
}
