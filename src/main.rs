use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use substr_miner::config::{MinerConfig, NgramCounting, OutputFormat, OutputMode};
use substr_miner::extract::ExtractionPolicy;
use substr_miner::extract::policy::DEFAULT_MIN_MEMBERSHIP;
use substr_miner::index::rank::Selection;
use substr_miner::index::{collect_files, MineOutput, Miner};
use substr_miner::output::{check_output_path, create_output, print_preview, write_aggregate};
use substr_miner::MinerError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "substr-miner")]
#[command(about = "Find substrings shared by many files of a binary corpus")]
#[command(version)]
struct Cli {
    /// Directory holding the corpus files
    input_dir: PathBuf,

    /// Glob selecting files inside the input directory
    #[arg(short, long, default_value = "*")]
    glob: String,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Where to store the results (aggregate: preview on stdout; tabular: rows on stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Emit one row per substring occurrence instead of an aggregate report
    #[arg(short, long)]
    tabular: bool,

    /// Directory receiving substring content, one file per hex hash (tabular mode)
    #[arg(short, long)]
    content: Option<PathBuf>,

    /// Re-hash existing content files and rewrite mismatches
    #[arg(long)]
    verify_content: bool,

    /// N-gram length
    #[arg(short)]
    n: Option<usize>,

    /// Worker threads (default: one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-partition time limit in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// How runs of qualifying n-grams are merged
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Qualify the top fraction of ranked n-grams
    #[arg(long, conflicts_with = "min_count")]
    top_fraction: Option<f64>,

    /// Qualify every n-gram counted more than this many times
    #[arg(long)]
    min_count: Option<u64>,

    /// Substrings must be longer than this many bytes
    #[arg(long)]
    min_len: Option<usize>,

    /// Minimum count an n-gram needs under the threshold policies
    #[arg(long)]
    min_membership: Option<u64>,

    /// What the n-gram histogram counts
    #[arg(long, value_enum)]
    counting: Option<NgramCounting>,

    /// JSON config file (default: the user config file, if any)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Hide progress spinners
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Extend over any qualifying n-gram
    Run,
    /// Extend only over n-grams with the starting count
    EqualCount,
    /// Threshold on membership count plus equal counts
    StrictEqualCount,
    /// Threshold on membership count only
    LooseThreshold,
}

/// Initialize tracing subscriber; RUST_LOG overrides the -v level
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Resolve the extraction policy from flags layered over the config file
fn resolve_policy(
    current: ExtractionPolicy,
    arg: Option<PolicyArg>,
    min_membership: Option<u64>,
) -> Result<ExtractionPolicy> {
    let current_min = match current {
        ExtractionPolicy::Threshold { min_count, .. } => min_count,
        _ => DEFAULT_MIN_MEMBERSHIP,
    };
    let min_count = min_membership.unwrap_or(current_min);

    let policy = match arg {
        None => match current {
            ExtractionPolicy::Threshold {
                require_equal_counts,
                ..
            } => ExtractionPolicy::Threshold {
                min_count,
                require_equal_counts,
            },
            other => other,
        },
        Some(PolicyArg::Run) => ExtractionPolicy::Run,
        Some(PolicyArg::EqualCount) => ExtractionPolicy::EqualCount,
        Some(PolicyArg::StrictEqualCount) => ExtractionPolicy::Threshold {
            min_count,
            require_equal_counts: true,
        },
        Some(PolicyArg::LooseThreshold) => ExtractionPolicy::Threshold {
            min_count,
            require_equal_counts: false,
        },
    };

    if min_membership.is_some() && !matches!(policy, ExtractionPolicy::Threshold { .. }) {
        return Err(MinerError::ConfigConflict(
            "--min-membership only applies to the threshold policies".to_string(),
        )
        .into());
    }
    Ok(policy)
}

/// Layer command-line flags over the loaded config
fn apply_overrides(mut config: MinerConfig, cli: &Cli) -> Result<MinerConfig> {
    if let Some(n) = cli.n {
        config.ngram_len = n;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if cli.timeout.is_some() {
        config.task_timeout_secs = cli.timeout;
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(counting) = cli.counting {
        config.counting = counting;
    }
    if cli.tabular {
        config.mode = OutputMode::Tabular;
    }
    if cli.content.is_some() {
        config.content_dir = cli.content.clone();
    }
    if cli.verify_content {
        config.verify_existing_content = true;
    }
    if let Some(ratio) = cli.top_fraction {
        config.selection = Selection::TopFraction { ratio };
    }
    if let Some(threshold) = cli.min_count {
        config.selection = Selection::MinCount { threshold };
    }
    if cli.min_len.is_some() {
        config.min_substring_len = cli.min_len;
    }
    config.policy = resolve_policy(config.policy, cli.policy, cli.min_membership)?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = MinerConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let config = apply_overrides(config, &cli)?;
    config.validate()?;
    if let Some(path) = &cli.output {
        check_output_path(path)?;
    }

    let files = collect_files(&cli.input_dir, &cli.glob, cli.recursive)?;
    if files.is_empty() {
        bail!(
            "No files matching {:?} in {}",
            cli.glob,
            cli.input_dir.display()
        );
    }

    let miner = Miner::new(config.clone())?.quiet(cli.quiet);
    let (output, summary) = miner.run(&files)?;

    match output {
        MineOutput::Aggregate(list) => match &cli.output {
            Some(path) => {
                info!(substrings = list.len(), path = %path.display(), "writing report");
                write_aggregate(&list, config.format, create_output(path)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            None => print_preview(&list, config.preview_rows, true)?,
        },
        MineOutput::Tabular(store) => {
            if store.is_empty() {
                warn!("no substrings were extracted; the occurrence index will be empty");
            }
            if let Some(dir) = &config.content_dir {
                info!(contents = store.len(), dir = %dir.display(), "writing substring content");
                let stats = store.flush_content(dir, config.verify_existing_content)?;
                info!(
                    written = stats.written,
                    skipped = stats.skipped,
                    rewritten = stats.rewritten,
                    "content flushed"
                );
            }
            match &cli.output {
                Some(path) => {
                    info!(rows = store.occurrences().len(), path = %path.display(), "writing occurrences");
                    let out = create_output(path)?;
                    match config.format {
                        OutputFormat::Tsv => store.write_tsv(out),
                        OutputFormat::Json => store.write_json(out),
                    }
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                }
                None => {
                    let stdout = io::stdout();
                    let mut lock = stdout.lock();
                    match config.format {
                        OutputFormat::Tsv => store.write_tsv(&mut lock),
                        OutputFormat::Json => store.write_json(&mut lock),
                    }?;
                    lock.flush()?;
                }
            }
        }
    }

    info!(
        files = summary.files,
        bytes = summary.bytes_read,
        distinct_ngrams = summary.distinct_ngrams,
        qualifying_ngrams = summary.qualifying_ngrams,
        distinct_substrings = summary.distinct_substrings,
        occurrences = summary.occurrences,
        "run complete"
    );
    Ok(())
}
