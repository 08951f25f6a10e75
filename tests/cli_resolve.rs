use assert_cmd::Command;
use std::io::Write;
use tempfile::Builder;

#[test]
fn command_resolve_groups_recent_pair() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "((A,B,C),D);")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "((A,B),(C,D));")?;

    let mut cmd = Command::cargo_bin("pnj")?;
    let output = cmd
        .arg("resolve")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;

    // The minimum-cost refinement groups (A,B) first
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("(A,B)"));

    Ok(())
}

#[test]
fn command_resolve_binary_passthrough() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "((A,B),(C,D));")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "((A,B),(C,D));")?;

    let mut cmd = Command::cargo_bin("pnj")?;
    let output = cmd
        .arg("resolve")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .output()?;

    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.trim(), "((A,B),(C,D));");

    Ok(())
}

#[test]
fn command_resolve_with_matrix_and_summary() -> anyhow::Result<()> {
    // All four gene copies belong to one species, so every refinement ties
    // on cost; the matrix decides the grouping.
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "(a_x,a_y,a_w,a_z);")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "a;")?;

    let mut matrix = Builder::new().suffix(".phy").tempfile()?;
    writeln!(matrix, "4")?;
    writeln!(matrix, "a_x 0 2 4 4")?;
    writeln!(matrix, "a_y 2 0 4 4")?;
    writeln!(matrix, "a_w 4 4 0 2")?;
    writeln!(matrix, "a_z 4 4 2 0")?;

    let summary = Builder::new().suffix(".tsv").tempfile()?;

    let mut cmd = Command::cargo_bin("pnj")?;
    let output = cmd
        .arg("resolve")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .arg("-d")
        .arg(matrix.path())
        .arg("--summary")
        .arg(summary.path())
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;

    // The NJ reference pairs (x,y) and (w,z)
    let has_xy = stdout.contains("(a_x,a_y)") || stdout.contains("(a_y,a_x)");
    let has_wz = stdout.contains("(a_w,a_z)") || stdout.contains("(a_z,a_w)");
    assert!(has_xy && has_wz, "unexpected topology: {}", stdout);

    let report = std::fs::read_to_string(summary.path())?;
    assert!(report.contains("#tree\tdups\tlosses"));
    // 3 duplications, tie broken by NJ, no fallback
    assert!(report.contains("1\t3\t0"));
    assert!(report.contains("\ttrue\tfalse\t"));

    Ok(())
}

#[test]
fn command_resolve_fallback_without_matrix() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "(a_x,a_y,a_w,a_z);")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "a;")?;

    let summary = Builder::new().suffix(".tsv").tempfile()?;

    let mut cmd = Command::cargo_bin("pnj")?;
    let output = cmd
        .arg("resolve")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .arg("--summary")
        .arg(summary.path())
        .output()?;

    assert!(output.status.success());

    let report = std::fs::read_to_string(summary.path())?;
    // fallback column is true, tie_broken false
    assert!(report.contains("\tfalse\ttrue\t"));

    Ok(())
}

#[test]
fn command_resolve_unmatched_leaf_skips_tree() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "(A,B,unknown);")?;
    writeln!(genes, "((A,B,C),D);")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "((A,B),(C,D));")?;

    let mut cmd = Command::cargo_bin("pnj")?;
    let output = cmd
        .arg("resolve")
        .arg(genes.path())
        .arg("-S")
        .arg(species.path())
        .output()?;

    assert!(output.status.success());

    // First tree is skipped with a warning, second still resolves
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 1);

    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("tree 1"));
    assert!(stderr.contains("unknown"));

    Ok(())
}

#[test]
fn command_resolve_deterministic() -> anyhow::Result<()> {
    let mut genes = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(genes, "((a_1,a_2,b_1,c_1),(d_1,e_1,f_1));")?;

    let mut species = Builder::new().suffix(".nwk").tempfile()?;
    writeln!(species, "(((a,b),(c,d)),(e,f));")?;

    let run = || -> anyhow::Result<String> {
        let mut cmd = Command::cargo_bin("pnj")?;
        let output = cmd
            .arg("resolve")
            .arg(genes.path())
            .arg("-S")
            .arg(species.path())
            .output()?;
        Ok(String::from_utf8(output.stdout)?)
    };

    assert_eq!(run()?, run()?);

    Ok(())
}
