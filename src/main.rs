use anyhow::Context;
use clap::{Parser, Subcommand};
use itertools::{EitherOrBoth, Itertools};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

use tree_edit_distance::indexing::TedIndex;
use tree_edit_distance::parsing::{self, LabelDictionary};
use tree_edit_distance::ted::{AlgorithmKind, UnitCostModel};

/// Tree edit distance between trees in bracket notation
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Algorithm computing the distance
    #[arg(value_enum)]
    algorithm: AlgorithmKind,

    /// Threshold for the bounded variants and LGM: report the exact distance
    /// only when it does not exceed K
    #[arg(short = 'k', long = "threshold", value_name = "K")]
    threshold: Option<usize>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Both trees given inline (wrap them in single quotes on the shell)
    String { t1: String, t2: String },
    /// Both trees read from the first line of their files
    File { t1_path: PathBuf, t2_path: PathBuf },
    /// Line-paired tree collections; one distance per line goes to the
    /// results file, malformed lines are skipped with a note on stderr
    Linewise {
        t1s_path: PathBuf,
        t2s_path: PathBuf,
        results_path: PathBuf,
    },
}

fn read_first_line(path: &Path) -> anyhow::Result<String> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .with_context(|| format!("cannot read {}", path.display()))?;
    Ok(line.trim_end().to_owned())
}

fn run_pair(cli: &Cli, source: &str, destination: &str) -> anyhow::Result<()> {
    if !parsing::validate(source) {
        eprintln!("Incorrect format of source tree. Is the number of opening and closing brackets equal?");
        exit(1);
    }
    if !parsing::validate(destination) {
        eprintln!("Incorrect format of destination tree. Is the number of opening and closing brackets equal?");
        exit(1);
    }

    let mut label_dict = LabelDictionary::new();
    let source_tree = parsing::parse_single(source, &mut label_dict)?;
    let destination_tree = parsing::parse_single(destination, &mut label_dict)?;

    let ti1 = TedIndex::with_cost_model(&source_tree, &label_dict, &UnitCostModel);
    let ti2 = TedIndex::with_cost_model(&destination_tree, &label_dict, &UnitCostModel);

    println!("Size of source tree:{}", ti1.c.tree_size);
    println!("Size of destination tree:{}", ti2.c.tree_size);

    let mut algorithm = cli.algorithm.build();
    if let Some(k) = cli.threshold {
        println!("Distance TED_K:{}", algorithm.ted_k(&ti1, &ti2, k));
    }
    println!("Distance:{}", algorithm.ted(&ti1, &ti2));
    if cli.algorithm == AlgorithmKind::Lgm {
        println!("Number of subproblems:{}", algorithm.subproblem_count());
    }
    Ok(())
}

fn run_linewise(
    cli: &Cli,
    t1s_path: &Path,
    t2s_path: &Path,
    results_path: &Path,
) -> anyhow::Result<()> {
    let mut label_dict = LabelDictionary::new();
    let t1_trees = parsing::parse_lines(&t1s_path, &mut label_dict)?;
    let t2_trees = parsing::parse_lines(&t2s_path, &mut label_dict)?;

    let results = File::create(results_path)
        .with_context(|| format!("cannot create {}", results_path.display()))?;
    let mut results = BufWriter::new(results);

    let mut algorithm = cli.algorithm.build();
    for (line_no, pair) in t1_trees
        .into_iter()
        .zip_longest(t2_trees.into_iter())
        .enumerate()
    {
        match pair {
            EitherOrBoth::Both(Some(t1), Some(t2)) => {
                let ti1 = TedIndex::with_cost_model(&t1, &label_dict, &UnitCostModel);
                let ti2 = TedIndex::with_cost_model(&t2, &label_dict, &UnitCostModel);
                let distance = match cli.threshold {
                    Some(k) => algorithm.ted_k(&ti1, &ti2, k),
                    None => algorithm.ted(&ti1, &ti2),
                };
                writeln!(results, "{distance}")?;
            }
            // a malformed side was already reported while parsing
            EitherOrBoth::Both(_, _) => {}
            EitherOrBoth::Left(_) | EitherOrBoth::Right(_) => {
                eprintln!("Skipping unpaired tree on line {}", line_no + 1);
            }
        }
    }
    results.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.mode {
        Mode::String { t1, t2 } => run_pair(&cli, t1, t2)?,
        Mode::File { t1_path, t2_path } => {
            let source = read_first_line(t1_path)?;
            let destination = read_first_line(t2_path)?;
            run_pair(&cli, &source, &destination)?;
        }
        Mode::Linewise {
            t1s_path,
            t2s_path,
            results_path,
        } => run_linewise(&cli, t1s_path, t2s_path, results_path)?,
    }

    Ok(())
}
