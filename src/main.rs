use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cuvinte_incrucisate::dictionary::DictionaryIndex;
use cuvinte_incrucisate::error::GenerationError;
use cuvinte_incrucisate::orchestrator::{generate, GeneratorConfig};
use cuvinte_incrucisate::theme::{BlockerSpec, Source, ThemeEntry};
use cuvinte_incrucisate::Tier;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
/// Generates dense, barred crossword puzzles from a TSV word lexicon.
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the layout-builder + CP-fill pipeline and write the result.
    Generate(GenerateArgs),
    /// Load a dictionary TSV and report how many entries were ingested.
    CheckDict(CheckDictArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Path to the tab-separated lexicon (surface, length, frequency, ...).
    #[arg(long)]
    dictionary: PathBuf,
    #[arg(long, default_value_t = 15)]
    height: usize,
    #[arg(long, default_value_t = 15)]
    width: usize,
    #[arg(long, value_enum, default_value = "medium")]
    difficulty: DifficultyArg,
    #[arg(long, default_value = "ro")]
    language: String,
    #[arg(long, default_value_t = 1)]
    seed: u64,
    #[arg(long, default_value_t = 0.6)]
    completion_target: f64,
    /// One theme word per line; all are treated as user-supplied.
    #[arg(long)]
    theme_file: Option<PathBuf>,
    #[arg(long)]
    blocker_height: Option<usize>,
    #[arg(long)]
    blocker_width: Option<usize>,
    #[arg(long)]
    blocker_row: Option<usize>,
    #[arg(long)]
    blocker_col: Option<usize>,
    #[arg(long, default_value_t = 20)]
    max_attempts: usize,
    #[arg(long, default_value_t = 4000)]
    solver_timeout_ms: u64,
    #[arg(long, default_value_t = 4)]
    solver_workers: usize,
    #[arg(long, default_value_t = true)]
    allow_phase2: bool,
    /// Write the output to this path instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Output format: a plain-text grid, or the full structured result record as JSON.
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Tier {
    fn from(value: DifficultyArg) -> Self {
        match value {
            DifficultyArg::Easy => Tier::Easy,
            DifficultyArg::Medium => Tier::Medium,
            DifficultyArg::Hard => Tier::Hard,
        }
    }
}

#[derive(Args)]
struct CheckDictArgs {
    dictionary: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Generate(args) => run_generate(args),
        Commands::CheckDict(args) => run_check_dict(args),
    }
}

fn run_generate(args: GenerateArgs) {
    let dictionary = match DictionaryIndex::load_tsv(&args.dictionary) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("failed to load dictionary: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(entries = dictionary.len(), "dictionary loaded");

    let theme_entries = match &args.theme_file {
        Some(path) => match fs::read_to_string(path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|w| ThemeEntry::new(w, Source::User))
                .collect(),
            Err(e) => {
                tracing::error!("failed to read theme file: {e}");
                std::process::exit(1);
            }
        },
        None => Vec::new(),
    };

    let blocker_spec = if args.blocker_height.is_some()
        || args.blocker_width.is_some()
        || args.blocker_row.is_some()
        || args.blocker_col.is_some()
    {
        Some(BlockerSpec {
            height: args.blocker_height,
            width: args.blocker_width,
            row: args.blocker_row,
            col: args.blocker_col,
        })
    } else {
        None
    };

    let config = GeneratorConfig {
        height: args.height,
        width: args.width,
        difficulty: args.difficulty.into(),
        language: args.language,
        seed: args.seed,
        completion_target: args.completion_target,
        blocker_spec,
        theme_entries,
        max_attempts: args.max_attempts,
        solver_timeout_ms: args.solver_timeout_ms,
        solver_workers: args.solver_workers,
        allow_phase2: args.allow_phase2,
    };

    match generate(&config, &dictionary, None) {
        Ok(puzzle) => {
            tracing::info!(attempts = puzzle.attempts, "puzzle generated");
            let rendered = match args.format {
                OutputFormat::Text => format!("{}", puzzle.grid),
                OutputFormat::Json => match serde_json::to_string_pretty(&puzzle) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("failed to serialize puzzle: {e}");
                        std::process::exit(1);
                    }
                },
            };
            match &args.out {
                Some(path) => {
                    if let Err(e) = fs::write(path, &rendered) {
                        tracing::error!("failed to write output: {e}");
                        std::process::exit(1);
                    }
                }
                None => println!("{rendered}"),
            }
        }
        Err(e) => report_generation_error(e),
    }
}

fn report_generation_error(err: GenerationError) {
    match err {
        GenerationError::GenerationFailed {
            attempts,
            last_kind,
            trace,
        } => {
            tracing::error!(attempts, last_kind, "generation exhausted all attempts");
            for outcome in trace {
                tracing::debug!(attempt = outcome.attempt, kind = outcome.kind, "attempt failed");
            }
        }
        other => tracing::error!("{other}"),
    }
    std::process::exit(1);
}

fn run_check_dict(args: CheckDictArgs) {
    match DictionaryIndex::load_tsv(&args.dictionary) {
        Ok(dictionary) => println!("loaded {} entries from {:?}", dictionary.len(), args.dictionary),
        Err(e) => {
            tracing::error!("failed to load dictionary: {e}");
            std::process::exit(1);
        }
    }
}
