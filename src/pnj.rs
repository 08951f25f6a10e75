extern crate clap;
use clap::*;

mod cmd_pnj;

fn main() -> anyhow::Result<()> {
    let app = Command::new("pnj")
        .version(crate_version!())
        .about("`pnj` - Polytomy resolution by reconciliation and Neighbor-Joining")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .subcommand(cmd_pnj::resolve::make_subcommand())
        .subcommand(cmd_pnj::reconcile::make_subcommand())
        .subcommand(cmd_pnj::nj::make_subcommand())
        .after_help(
            r###"Subcommands:

* resolve   - Resolve gene-tree polytomies to minimum duplication/loss cost
* reconcile - Reconcile binary gene trees against a species tree
* nj        - Build a Neighbor-Joining tree from a distance matrix

"###,
        );

    // Check which subcomamnd the user ran...
    match app.get_matches().subcommand() {
        Some(("resolve", sub_matches)) => cmd_pnj::resolve::execute(sub_matches),
        Some(("reconcile", sub_matches)) => cmd_pnj::reconcile::execute(sub_matches),
        Some(("nj", sub_matches)) => cmd_pnj::nj::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
