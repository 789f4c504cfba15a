//! Tests around regenerating the build manifest from within the build.

use crate::e2e::*;

#[cfg(unix)]
#[test]
fn generate_build_file() -> anyhow::Result<()> {
    // Run a project where a build rule generates the build.ninja.
    let space = TestSpace::new()?;
    space.write(
        "gen.sh",
        "
echo 'regenerating build.ninja'
cat >build.ninja <<EOT
rule regen
  command = sh ./gen.sh
  generator = 1
build build.ninja: regen gen.sh
rule touch
  command = touch \\$out
build out: touch
EOT
",
    )?;

    // Generate the initial build.ninja.
    space.run_expect(std::process::Command::new("sh").args(vec!["./gen.sh"]))?;

    // Run: expect to regenerate because we don't know how the file was made.
    let out = space.run_expect(&mut kiln_command(vec!["out"]))?;
    assert_output_contains(&out, "regenerating build.ninja");
    assert!(space.read("out").is_ok());

    // Run again: everything should be up to date.
    let out = space.run_expect(&mut kiln_command(vec!["out"]))?;
    assert_output_not_contains(&out, "regenerating build.ninja");
    assert_output_contains(&out, "no work");
    Ok(())
}

#[cfg(unix)]
#[test]
fn generate_build_file_failure() -> anyhow::Result<()> {
    // The rule that regenerates build.ninja fails; so must the build.
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build out: touch",
            "
rule regen
  command = sh ./gen.sh
  generator = 1",
            "build build.ninja: regen gen.sh",
            "",
        ]
        .join("\n"),
    )?;
    space.write("gen.sh", "exit 1")?;

    let out = space.run(&mut kiln_command(vec!["out"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "failed:");
    Ok(())
}

#[cfg(unix)]
#[test]
fn pathological_regen_reloads_at_most_once() -> anyhow::Result<()> {
    // The regen edge also claims an output it never creates, so it looks
    // dirty on every pass.  The reload must still happen only once.
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "
rule regen
  command = echo regenerating && touch build.ninja
  description = REGEN
  generator = 1",
            "build build.ninja never.stamp: regen gen.in",
            "build out: touch",
            "",
        ]
        .join("\n"),
    )?;
    space.write("gen.in", "")?;

    let out = space.run_expect(&mut kiln_command(vec!["out"]))?;
    let stdout = std::str::from_utf8(&out.stdout)?;
    assert_eq!(stdout.matches("regenerating").count(), 1);
    assert!(space.read("out").is_ok());
    Ok(())
}
