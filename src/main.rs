use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, warn};

mod analysis;
mod cut_scores;
mod ingest;
mod models;
mod report;
mod upload;

use cut_scores::CutScoreTable;
use models::Domain;
use upload::{UploadError, UploadOutcome};

#[derive(Parser)]
#[command(name = "student-data-analyzer")]
#[command(about = "Assessment results analyzer for school populations", long_about = None)]
struct Cli {
    /// JSON file replacing the built-in RISE cut-score table
    #[arg(long, global = true)]
    cut_scores: Option<PathBuf>,
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an assessment CSV and emit the statistics as JSON
    Analyze {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        year: i32,
        /// Write the JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Show the proficiency band of a score for a grade
    Classify {
        #[arg(long)]
        grade: String,
        #[arg(long)]
        score: f64,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn read_upload(path: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((file_name, bytes))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cut_scores = match &cli.cut_scores {
        Some(path) => CutScoreTable::load(path)?,
        None => CutScoreTable::rise(),
    };

    match cli.command {
        Commands::Analyze {
            csv,
            year,
            out,
            pretty,
        } => {
            let (file_name, bytes) = read_upload(&csv)?;
            let outcome = upload::analyze_upload(&file_name, &bytes, year, &cut_scores)?;
            let json = if pretty {
                serde_json::to_string_pretty(&outcome)?
            } else {
                serde_json::to_string(&outcome)?
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Analysis written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Report { csv, year, out } => {
            let (file_name, bytes) = read_upload(&csv)?;
            match upload::analyze_upload(&file_name, &bytes, year, &cut_scores)? {
                UploadOutcome::Empty { message } => println!("{message}"),
                UploadOutcome::Analysis(response) => {
                    let report = report::build_report(&response);
                    std::fs::write(&out, report)
                        .with_context(|| format!("failed to write {}", out.display()))?;
                    println!("Report written to {}.", out.display());
                }
            }
        }
        Commands::Classify { grade, score } => {
            for domain in [Domain::Ela, Domain::Math] {
                let classification = cut_scores.classify(domain, &grade, score);
                let passing = if classification.is_passing() {
                    "passing"
                } else {
                    "not passing"
                };
                println!("{}: {classification} ({passing})", domain.label());
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<UploadError>() {
            Some(upload_err) => {
                warn!("Rejected upload: {upload_err}");
                ExitCode::from(2)
            }
            None => {
                error!("An unexpected error occurred: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}
