//! Kula CLI - Command-line interface
//!
//! Usage:
//!   kula list
//!   kula annotate <source> [--output <name>]
//!   kula status <source>
//!   kula export-spert <annotated>

mod review;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use kula_annotator::{AnnotationSession, SharedSession, SpertExporter};
use kula_core::{AppConfig, LoggingConfig, RecordStore};
use kula_store::{with_csv_extension, CsvRecordStore};
use tracing_subscriber::EnvFilter;

use crate::review::Reviewer;

#[derive(Parser)]
#[command(name = "kula")]
#[command(about = "Review entity/relation candidates and build annotated datasets")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "KULA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidate files available for annotation
    List,
    /// Review candidates one by one
    Annotate {
        /// Candidate file, by name in the candidate directory or by path
        source: String,
        /// Output file name in the annotated directory
        #[arg(short, long)]
        output: Option<String>,
        /// Only write the output on finish
        #[arg(long)]
        no_auto_save: bool,
        /// Number of undo steps kept
        #[arg(long)]
        undo_capacity: Option<usize>,
    },
    /// Show how many candidates a file still holds
    Status {
        /// Candidate file, by name in the candidate directory or by path
        source: String,
    },
    /// Convert an annotated file into SpERT train/dev/test JSON
    ExportSpert {
        /// Annotated file, by name in the annotated directory or by path
        annotated: String,
        /// Directory for the JSON files
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Shuffle seed for the split
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    init_tracing(&config.logging);

    let store = CsvRecordStore::new(&config.annotation.data_dir);

    match cli.command {
        Commands::List => {
            let candidates = CsvRecordStore::new(config.annotation.candidate_path());
            let names = candidates.list_candidates()?;
            if names.is_empty() {
                println!(
                    "No CSV files found in {}",
                    config.annotation.candidate_path().display()
                );
            }
            for name in names {
                println!("{name}");
            }
        }
        Commands::Annotate {
            source,
            output,
            no_auto_save,
            undo_capacity,
        } => {
            let annotation = &config.annotation;
            let source_id = resolve_id(&source, &annotation.candidate_dir);
            let output_name =
                with_csv_extension(output.as_deref().unwrap_or(&annotation.default_output));
            let output_id = resolve_id(&output_name, &annotation.annotated_dir);

            let mut session = AnnotationSession::from_config(store, annotation, output_id)
                .with_auto_save(annotation.auto_save && !no_auto_save);
            if let Some(capacity) = undo_capacity {
                session = session.with_undo_capacity(capacity);
            }

            let shared = SharedSession::new(session);
            let status = shared
                .load_async(source_id.clone())
                .await
                .with_context(|| format!("cannot annotate {source_id}"))?;
            println!("{status}");

            let mut reviewer = Reviewer::new(shared).with_labels(
                annotation.entity_labels.clone(),
                annotation.relation_labels.clone(),
            );
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            if let Some(summary) = reviewer.run(stdin, &mut stdout).await? {
                tracing::info!("Annotation finished: {}", summary);
            }
        }
        Commands::Status { source } => {
            let source_id = resolve_id(&source, &config.annotation.candidate_dir);
            let table = store.load(&source_id)?;
            let records = table.to_records(&source_id)?;
            println!(
                "{}: {} candidates ({} columns: {})",
                source_id,
                records.len(),
                table.headers.len(),
                table.headers.join(", ")
            );
        }
        Commands::ExportSpert {
            annotated,
            out_dir,
            seed,
        } => {
            let annotated_id = resolve_id(&annotated, &config.annotation.annotated_dir);
            let records = store.load(&annotated_id)?.to_records(&annotated_id)?;

            let mut exporter = SpertExporter::from_config(&config.export);
            if let Some(seed) = seed {
                exporter = exporter.with_seed(seed);
            }
            let out_dir = out_dir.unwrap_or_else(|| config.export.out_dir.clone());
            let report = exporter.export(&records, &out_dir)?;

            let [train, dev, test] = &report.relation_counts;
            println!("Train relations: {}", serde_json::to_string(train)?);
            println!("Dev relations: {}", serde_json::to_string(dev)?);
            println!("Test relations: {}", serde_json::to_string(test)?);
            println!(
                "Wrote {} train / {} dev / {} test documents to {} ({} entity types, {} relation types)",
                report.train_count,
                report.dev_count,
                report.test_count,
                report.out_dir.display(),
                report.entity_types,
                report.relation_types
            );
        }
    }

    Ok(())
}

/// Initialize tracing on stderr; `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Store id for a user-supplied file name
///
/// Existing paths are used as given; bare names live in `dir` under the
/// data directory.
fn resolve_id(name: &str, dir: &Path) -> String {
    let path = Path::new(name);
    if path.is_absolute() || (path.components().count() > 1 && path.exists()) {
        return std::fs::canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
    }
    dir.join(name).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bare_name() {
        assert_eq!(
            resolve_id("candidates.csv", Path::new("csv_data")),
            Path::new("csv_data").join("candidates.csv").display().to_string()
        );
    }

    #[test]
    fn test_resolve_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chunks.csv");
        std::fs::write(&file, "text\n").unwrap();

        let resolved = resolve_id(file.to_str().unwrap(), Path::new("csv_data"));
        assert!(Path::new(&resolved).is_absolute());
        assert!(resolved.ends_with("chunks.csv"));
    }

    #[test]
    fn test_cli_parses_annotate() {
        let cli = Cli::try_parse_from([
            "kula",
            "annotate",
            "candidates.csv",
            "--output",
            "mine",
            "--no-auto-save",
        ])
        .unwrap();

        match cli.command {
            Commands::Annotate {
                source,
                output,
                no_auto_save,
                undo_capacity,
            } => {
                assert_eq!(source, "candidates.csv");
                assert_eq!(output.as_deref(), Some("mine"));
                assert!(no_auto_save);
                assert!(undo_capacity.is_none());
            }
            _ => panic!("expected annotate"),
        }
    }
}
