use clap::*;
use pnj::libs::phylo::tree::Tree;
use pnj::libs::recon::events::{annotate_events, subtree_cost};
use pnj::libs::recon::mapping::species_extractor;
use pnj::libs::recon::{GeneMapping, ResolveConfig, SpeciesIndex};
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("reconcile")
        .about("Reconcile gene trees against a species tree")
        .after_help(
            r###"
Maps every gene-tree node to its lowest common ancestor in the species tree
and reports duplication and loss counts.

Notes:
* Output: TSV with one row per input tree.
* With --events, annotated Newick is written instead: internal nodes carry
  an NHX D tag (D=Y duplication, D=N speciation).
* Leaf labels encode species as in `pnj resolve` (--sep / --spos).

Examples:
1. Count events:
   pnj reconcile genes.nwk -S species.nwk

2. Annotate duplications:
   pnj reconcile genes.nwk -S species.nwk --events -o annotated.nwk
"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Input gene trees file. [stdin] for standard input"),
        )
        .arg(
            Arg::new("species")
                .long("species")
                .short('S')
                .required(true)
                .num_args(1)
                .help("Species tree file"),
        )
        .arg(
            Arg::new("sep")
                .long("sep")
                .num_args(1)
                .default_value("_")
                .help("Separator between species name and gene name in leaf labels"),
        )
        .arg(
            Arg::new("spos")
                .long("spos")
                .num_args(1)
                .value_parser(["prefix", "postfix"])
                .default_value("prefix")
                .help("Position of the species name in leaf labels"),
        )
        .arg(
            Arg::new("dup_weight")
                .long("dup-weight")
                .num_args(1)
                .value_parser(value_parser!(f64))
                .default_value("1.0")
                .help("Weight of one duplication event"),
        )
        .arg(
            Arg::new("loss_weight")
                .long("loss-weight")
                .num_args(1)
                .value_parser(value_parser!(f64))
                .default_value("1.0")
                .help("Weight of one loss event"),
        )
        .arg(
            Arg::new("events")
                .long("events")
                .action(ArgAction::SetTrue)
                .help("Write event-annotated Newick instead of counts"),
        )
        .arg(
            Arg::new("outfile")
                .short('o')
                .long("outfile")
                .num_args(1)
                .default_value("stdout")
                .help("Output filename. [stdout] for screen"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let infile = args.get_one::<String>("infile").unwrap();
    let outfile = args.get_one::<String>("outfile").unwrap();
    let is_events = args.get_flag("events");

    let cfg = ResolveConfig {
        dup_weight: *args.get_one::<f64>("dup_weight").unwrap(),
        loss_weight: *args.get_one::<f64>("loss_weight").unwrap(),
        ..ResolveConfig::default()
    };

    let sep = args.get_one::<String>("sep").unwrap().clone();
    let is_prefix = args.get_one::<String>("spos").unwrap() == "prefix";

    let species_file = args.get_one::<String>("species").unwrap();
    let species_trees = Tree::from_file(species_file)?;
    let species = species_trees
        .first()
        .ok_or_else(|| anyhow::anyhow!("no species tree found in {}", species_file))?;
    let index = SpeciesIndex::build(species)?;

    let mut writer = pnj::writer(outfile);
    if !is_events {
        writer.write_all("#tree\tdups\tlosses\tweighted\n".as_ref())?;
    }

    let trees = Tree::from_file(infile)?;

    for (i, mut gene) in trees.into_iter().enumerate() {
        let extractor = species_extractor(sep.clone(), is_prefix);

        let mapping = match GeneMapping::infer(&gene, &index, extractor) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("tree {}: {}", i + 1, e);
                continue;
            }
        };

        if is_events {
            annotate_events(&mut gene, &mapping);
            writer.write_all((gene.to_newick() + "\n").as_ref())?;
        } else {
            let root = gene.get_root().unwrap();
            let cost = subtree_cost(&gene, &mapping, &index, root);
            writer.write_all(
                format!(
                    "{}\t{}\t{}\t{}\n",
                    i + 1,
                    cost.duplications,
                    cost.losses,
                    cost.weighted(&cfg)
                )
                .as_ref(),
            )?;
        }
    }

    Ok(())
}
