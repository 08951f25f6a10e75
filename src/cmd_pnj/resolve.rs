use clap::*;
use pnj::libs::phylo::tree::Tree;
use pnj::libs::recon::{
    mapping::species_extractor, resolve, GeneMapping, ResolveConfig, SpeciesIndex, TieBreakMetric,
};
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("resolve")
        .about("Resolve gene-tree polytomies to minimum duplication/loss cost")
        .after_help(
            r###"
Resolves every multifurcating node of the input gene trees into the binary
arrangement minimizing the duplication/loss reconciliation cost against the
species tree. Cost ties are broken with Neighbor-Joining over the supplied
distance matrix; without a usable matrix a deterministic canonical order is
used and reported in the summary.

Notes:
* Gene leaf labels encode their species, e.g. HUMAN_BRCA2 (species prefix)
  or BRCA2_HUMAN (species postfix). A label without the separator is taken
  whole as the species name.
* The species tree is the first tree of --species.
* Input: Newick gene trees; optional PHYLIP distance matrix over gene leaves.
* Output: resolved Newick trees, one per input tree. Trees failing to
  resolve (e.g. unmatched leaves) are skipped with a warning on stderr.

Examples:
1. Resolve against a species tree:
   pnj resolve genes.nwk -S species.nwk -o resolved.nwk

2. Break cost ties with a distance matrix, write a summary:
   pnj resolve genes.nwk -S species.nwk -d dist.phy --summary report.tsv

3. Species name at the end of the leaf label:
   pnj resolve genes.nwk -S species.nwk --spos postfix
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
            Arg::new("matrix")
                .long("matrix")
                .short('d')
                .num_args(1)
                .help("PHYLIP distance matrix over gene leaves"),
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
            Arg::new("ceiling")
                .long("ceiling")
                .num_args(1)
                .value_parser(value_parser!(usize))
                .default_value("10000")
                .help("Max candidate refinements examined per polytomy"),
        )
        .arg(
            Arg::new("metric")
                .long("metric")
                .num_args(1)
                .value_parser(["bipartition", "quartet"])
                .default_value("bipartition")
                .help("Topological agreement metric for tie-breaking"),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .num_args(1)
                .help("Write a per-polytomy TSV summary to this file"),
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

    let cfg = ResolveConfig {
        dup_weight: *args.get_one::<f64>("dup_weight").unwrap(),
        loss_weight: *args.get_one::<f64>("loss_weight").unwrap(),
        candidate_ceiling: *args.get_one::<usize>("ceiling").unwrap(),
        tie_break_metric: TieBreakMetric::from_str(args.get_one::<String>("metric").unwrap())
            .unwrap(),
    };

    let sep = args.get_one::<String>("sep").unwrap().clone();
    let is_prefix = args.get_one::<String>("spos").unwrap() == "prefix";

    // Species tree and its LCA index, shared by all gene trees
    let species_file = args.get_one::<String>("species").unwrap();
    let species_trees = Tree::from_file(species_file)?;
    let species = species_trees
        .first()
        .ok_or_else(|| anyhow::anyhow!("no species tree found in {}", species_file))?;
    let index = SpeciesIndex::build(species)?;

    let matrix = args
        .get_one::<String>("matrix")
        .map(|f| intspan::NamedMatrix::from_relaxed_phylip(f));

    let mut writer = pnj::writer(outfile);
    let mut summary: Option<Box<dyn Write>> = args.get_one::<String>("summary").map(|f| {
        let mut w = pnj::writer(f);
        writeln!(
            w,
            "#tree\tdups\tlosses\tweighted\tpolytomy\tsize\tmin_candidates\ttie_broken\tfallback\ttruncated"
        )
        .unwrap();
        w
    });

    let trees = Tree::from_file(infile)?;

    // One bad tree never aborts the batch
    for (i, mut gene) in trees.into_iter().enumerate() {
        let extractor = species_extractor(sep.clone(), is_prefix);

        let outcome = GeneMapping::infer(&gene, &index, extractor)
            .and_then(|mut mapping| resolve(&mut gene, &index, &mut mapping, matrix.as_ref(), &cfg));

        let res = match outcome {
            Ok(res) => res,
            Err(e) => {
                eprintln!("tree {}: {}", i + 1, e);
                continue;
            }
        };

        if res.truncated {
            eprintln!(
                "tree {}: candidate ceiling reached, result may be suboptimal",
                i + 1
            );
        }

        writer.write_all((gene.to_newick() + "\n").as_ref())?;

        if let Some(w) = summary.as_mut() {
            let cost_cols = format!(
                "{}\t{}\t{}\t{}",
                i + 1,
                res.cost.duplications,
                res.cost.losses,
                res.cost.weighted(&cfg)
            );
            if res.polytomies.is_empty() {
                writeln!(w, "{}\t.\t.\t.\t.\t.\t.", cost_cols)?;
            }
            for p in &res.polytomies {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    cost_cols, p.node, p.size, p.min_candidates, p.tie_broken, p.fallback, p.truncated
                )?;
            }
        }
    }

    Ok(())
}
