use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::Builder;

#[test]
fn command_reconcile_counts() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    // Congruent tree: no events
    writeln!(genes, "((a_1,b_1),c_1);")?;
    // Two copies of species a: one duplication
    writeln!(genes, "((a_1,a_2),c_1);")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "((a,b),c);")?;

    let mut cmd = Command::cargo_bin("pnj")?;
    let output = cmd
        .arg("reconcile")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;

    assert!(stdout.contains("#tree\tdups\tlosses\tweighted"));
    assert!(stdout.contains("1\t0\t0\t0"));
    // ((a_1,a_2),c_1): 1 dup; the edge to c_1 is adjacent (no loss), but
    // the root keeps the (a,b) ancestor unvisited on the a-side: 1 loss.
    assert!(stdout.contains("2\t1\t1\t2"));

    Ok(())
}

#[test]
fn command_reconcile_weights() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "((a_1,a_2),c_1);")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "((a,b),c);")?;

    let mut cmd = Command::cargo_bin("pnj")?;
    cmd.arg("reconcile")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .arg("--dup-weight")
        .arg("3.0")
        .arg("--loss-weight")
        .arg("0.5")
        .assert()
        .success()
        .stdout(predicate::str::contains("1\t1\t1\t3.5"));

    Ok(())
}

#[test]
fn command_reconcile_events_annotation() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "((a_1,a_2)x,b_1)y;")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "((a,b),c);")?;

    let mut cmd = Command::cargo_bin("pnj")?;
    let output = cmd
        .arg("reconcile")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .arg("--events")
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;

    // x is a duplication, y a speciation
    assert!(stdout.contains("x[&&NHX:D=Y]"));
    assert!(stdout.contains("y[&&NHX:D=N]"));

    Ok(())
}

#[test]
fn command_reconcile_unmatched_leaf() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "(a_1,marsian_1);")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "((a,b),c);")?;

    let mut cmd = Command::cargo_bin("pnj")?;
    let output = cmd
        .arg("reconcile")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .output()?;

    // The offending leaf is named on stderr
    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("marsian_1"));

    Ok(())
}
