//! tokenbayes CLI: train and query a durable chi-squared token classifier.
//!
//! Input files are pre-tokenized: whitespace-separated tokens, one message
//! per file (`-` reads stdin).

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use tokenbayes::classifier::{Classifier, Evidence, Verdict};
use tokenbayes::config::ClassifierConfig;
use tokenbayes::error::TokenBayesResult;
use tokenbayes::paths::TokenBayesPaths;
use tokenbayes::store::{DurableStore, Label, TokenStore};

#[derive(Parser)]
#[command(name = "tokenbayes", version, about = "Chi-squared spam/ham token classifier")]
struct Cli {
    /// Directory holding the token database.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Classifier config file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train one message per file.
    Train {
        #[command(flatten)]
        label: LabelChoice,

        /// Pre-tokenized message files (`-` for stdin).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Retract messages trained earlier with the same label.
    Untrain {
        #[command(flatten)]
        label: LabelChoice,

        /// Pre-tokenized message files (`-` for stdin).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Score messages.
    Score {
        /// Pre-tokenized message files (`-` for stdin).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Show the clues behind each score.
        #[arg(long)]
        evidence: bool,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show training totals.
    Info,

    /// Print the effective classifier configuration as TOML.
    Config,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct LabelChoice {
    /// Messages are spam.
    #[arg(long)]
    spam: bool,

    /// Messages are ham.
    #[arg(long)]
    ham: bool,
}

impl LabelChoice {
    fn label(&self) -> Label {
        if self.spam { Label::Spam } else { Label::Ham }
    }
}

#[derive(Serialize)]
struct ScoreReport<'a> {
    file: String,
    score: f64,
    verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence: Option<&'a Evidence>,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Train { label, files } => {
            let classifier = open_classifier(cli.data_dir, config)?;
            let label = label.label();
            for file in &files {
                let tokens = read_tokens(file)?;
                match label {
                    Label::Spam => classifier.add_spam(&tokens)?,
                    Label::Ham => classifier.add_ham(&tokens)?,
                }
            }
            println!("Trained {} {label} message(s)", files.len());
        }

        Commands::Untrain { label, files } => {
            let classifier = open_classifier(cli.data_dir, config)?;
            let label = label.label();
            for file in &files {
                let tokens = read_tokens(file)?;
                match label {
                    Label::Spam => classifier.remove_spam(&tokens)?,
                    Label::Ham => classifier.remove_ham(&tokens)?,
                }
            }
            println!("Untrained {} {label} message(s)", files.len());
        }

        Commands::Score {
            files,
            evidence,
            json,
        } => {
            let classifier = open_classifier(cli.data_dir, config)?;
            let mut reports = Vec::with_capacity(files.len());
            for file in &files {
                let tokens = read_tokens(file)?;
                reports.push(classifier.spam_probability_with_evidence(&tokens)?);
            }

            let rendered: Vec<ScoreReport<'_>> = files
                .iter()
                .zip(&reports)
                .map(|(file, (score, ev))| ScoreReport {
                    file: file.display().to_string(),
                    score: *score,
                    verdict: classifier.verdict(*score),
                    evidence: evidence.then_some(ev),
                })
                .collect();

            if json {
                let out = serde_json::to_string_pretty(&rendered).into_diagnostic()?;
                println!("{out}");
            } else {
                for report in &rendered {
                    println!("{}\t{:.6}\t{}", report.file, report.score, report.verdict);
                    if let Some(ev) = report.evidence {
                        for (token, value) in ev.entries() {
                            println!("    {value:.6}  {token}");
                        }
                    }
                }
            }
        }

        Commands::Info => {
            let classifier = open_classifier(cli.data_dir, config)?;
            let store = classifier.store();
            let globals = store.global_counts()?;
            println!("Database:     {}", store.path().display());
            println!("Spam trained: {}", globals.nspam);
            println!("Ham trained:  {}", globals.nham);
            println!("Tokens:       {}", store.vocabulary_size()?);
        }

        Commands::Config => {
            let rendered = config.to_toml().map_err(|e| miette::miette!("{e}"))?;
            print!("{rendered}");
        }
    }

    Ok(())
}

fn open_classifier(
    data_dir: Option<PathBuf>,
    config: ClassifierConfig,
) -> TokenBayesResult<Classifier<DurableStore>> {
    let data_dir = match data_dir {
        Some(dir) => dir,
        None => {
            let paths = TokenBayesPaths::resolve()?;
            paths.ensure_dirs()?;
            paths.data_dir
        }
    };
    let store = DurableStore::open(&data_dir)?;
    Ok(Classifier::with_config(store, config)?)
}

/// Explicit `--config`, else the XDG config file if present, else defaults.
fn load_config(explicit: Option<&Path>) -> TokenBayesResult<ClassifierConfig> {
    if let Some(path) = explicit {
        return Ok(ClassifierConfig::load(path)?);
    }
    let Ok(paths) = TokenBayesPaths::resolve() else {
        return Ok(ClassifierConfig::default());
    };
    let file = paths.config_file();
    if file.is_file() {
        tracing::debug!(path = %file.display(), "loading classifier config");
        Ok(ClassifierConfig::load(&file)?)
    } else {
        Ok(ClassifierConfig::default())
    }
}

fn read_tokens(path: &Path) -> Result<Vec<String>> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).into_diagnostic()?;
        buf
    } else {
        std::fs::read_to_string(path)
            .into_diagnostic()
            .map_err(|e| e.wrap_err(format!("failed to read {}", path.display())))?
    };
    Ok(content.split_whitespace().map(str::to_owned).collect())
}
