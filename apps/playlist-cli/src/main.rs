//! Playlist command-line driver
//!
//! Inspects, annotates, merges and exports PDF playlists from local files.

mod gestures;
mod manifest;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use playlist_core::document::{page_box, page_ids};
use playlist_core::{
    annotations_from_json, annotations_to_json, apply_to_bytes, merge_documents, parse_page_list,
    CaptureEngine, Config, DocumentLoader, ExportDecision, ExportOutcome, ExportPipeline,
    FileResolver, LocalFileSink, LopdfLoader, MergeSource, ProcessMetrics, ProcessResult, Session,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "playlist")]
#[command(version, about = "Annotate and merge PDF playlists")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print page count and page sizes
    Info { file: PathBuf },

    /// Merge PDFs. Each input is PATH or PATH:PAGES, e.g. "set.pdf:3,1-2"
    Merge {
        #[arg(required = true)]
        inputs: Vec<String>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Burn a JSON list of annotations into a PDF
    Annotate {
        input: PathBuf,

        annotations: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replay a recorded gesture script through the capture engine
    Replay {
        input: PathBuf,

        script: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Also write the resulting annotations as JSON
        #[arg(long)]
        save_annotations: Option<PathBuf>,
    },

    /// Export a playlist manifest through the full pipeline
    Export {
        manifest: PathBuf,

        /// Directory document ids are resolved against
        #[arg(long, default_value = ".")]
        source_dir: PathBuf,

        /// Directory the output is written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = Decision::Download)]
        decision: Decision,

        /// Overrides the configured output name
        #[arg(long)]
        output_name: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Decision {
    Cancel,
    Download,
    Upload,
}

impl From<Decision> for ExportDecision {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Cancel => ExportDecision::Cancel,
            Decision::Download => ExportDecision::Download,
            Decision::Upload => ExportDecision::Upload,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the JSON report, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match args.command {
        Command::Info { file } => info(&file).await,
        Command::Merge { inputs, output } => merge(&inputs, &output).await,
        Command::Annotate {
            input,
            annotations,
            output,
        } => annotate(&input, &annotations, &output).await,
        Command::Replay {
            input,
            script,
            output,
            save_annotations,
        } => replay(&config, &input, &script, &output, save_annotations.as_deref()).await,
        Command::Export {
            manifest,
            source_dir,
            out_dir,
            decision,
            output_name,
        } => {
            let output_name = output_name.unwrap_or_else(|| config.export.output_name.clone());
            export(&manifest, source_dir, out_dir, decision.into(), output_name).await
        }
    }
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn print_report(result: &ProcessResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

async fn info(file: &Path) -> Result<()> {
    let bytes = read(file).await?;
    let loader = LopdfLoader;
    let doc = loader
        .load(&bytes)
        .with_context(|| format!("Not a readable PDF: {}", file.display()))?;

    let pages: Vec<_> = page_ids(&doc)
        .into_iter()
        .map(|id| {
            let page = page_box(&doc, id);
            serde_json::json!({ "width": page.width(), "height": page.height() })
        })
        .collect();
    let report = serde_json::json!({
        "file": file.display().to_string(),
        "page_count": loader.page_count(&doc),
        "pages": pages,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Split `PATH:PAGES`. A suffix that does not look like a page list is
/// treated as part of the path.
fn parse_input(input: &str) -> Result<(PathBuf, Option<Vec<usize>>)> {
    if let Some((path, pages)) = input.rsplit_once(':') {
        let looks_like_pages = !pages.trim().is_empty()
            && pages
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ',' | '-' | ' '));
        if looks_like_pages {
            let pages = parse_page_list(pages)
                .with_context(|| format!("Bad page list in {}", input))?;
            return Ok((PathBuf::from(path), Some(pages)));
        }
    }
    Ok((PathBuf::from(input), None))
}

async fn merge(inputs: &[String], output: &Path) -> Result<()> {
    let started = Instant::now();
    let mut sources = Vec::with_capacity(inputs.len());
    for input in inputs {
        let (path, pages) = parse_input(input)?;
        let bytes = read(&path).await?;
        sources.push(match pages {
            Some(pages) => MergeSource::with_pages(bytes, pages),
            None => MergeSource::all(bytes),
        });
    }
    let input_size_bytes = sources.iter().map(|s| s.bytes.len()).sum();

    let merged = match merge_documents(&sources) {
        Ok(merged) => merged,
        Err(e) => {
            print_report(&ProcessResult::failure(&e))?;
            return Err(e).context("Merge failed");
        }
    };
    write(output, &merged).await?;

    let metrics = ProcessMetrics {
        input_size_bytes,
        output_size_bytes: merged.len(),
        page_count: playlist_core::get_page_count(&merged)?,
        annotation_count: 0,
        processing_time_ms: started.elapsed().as_millis() as u64,
    };
    print_report(&ProcessResult::ok_without_data(metrics))
}

async fn annotate(input: &Path, annotations: &Path, output: &Path) -> Result<()> {
    let started = Instant::now();
    let pdf = read(input).await?;
    let json = tokio::fs::read_to_string(annotations)
        .await
        .with_context(|| format!("Failed to read {}", annotations.display()))?;
    let annotations = annotations_from_json(&json)?;

    write_annotated(&pdf, &annotations, output, started).await
}

async fn replay(
    config: &Config,
    input: &Path,
    script: &Path,
    output: &Path,
    save_annotations: Option<&Path>,
) -> Result<()> {
    let started = Instant::now();
    let pdf = read(input).await?;
    let script = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let steps = gestures::parse_script(&script)?;

    let mut engine = CaptureEngine::new(config.capture.clone());
    let summary = gestures::replay(&mut engine, &steps);
    tracing::info!(
        committed = summary.committed,
        discarded = summary.discarded,
        "replayed gesture script"
    );
    let snapshot = engine.freeze();

    if let Some(path) = save_annotations {
        write(path, annotations_to_json(&snapshot)?.as_bytes()).await?;
    }
    write_annotated(&pdf, &snapshot, output, started).await
}

async fn write_annotated(
    pdf: &[u8],
    annotations: &[playlist_core::Annotation],
    output: &Path,
    started: Instant,
) -> Result<()> {
    let annotated = match apply_to_bytes(pdf, annotations) {
        Ok(annotated) => annotated,
        Err(e) => {
            print_report(&ProcessResult::failure(&e))?;
            return Err(e).context("Annotation failed");
        }
    };
    write(output, &annotated).await?;

    let metrics = ProcessMetrics {
        input_size_bytes: pdf.len(),
        output_size_bytes: annotated.len(),
        page_count: playlist_core::get_page_count(&annotated)?,
        annotation_count: annotations.len(),
        processing_time_ms: started.elapsed().as_millis() as u64,
    };
    print_report(&ProcessResult::ok_without_data(metrics))
}

async fn export(
    manifest: &Path,
    source_dir: PathBuf,
    out_dir: PathBuf,
    decision: ExportDecision,
    output_name: String,
) -> Result<()> {
    let json = tokio::fs::read_to_string(manifest)
        .await
        .with_context(|| format!("Failed to read {}", manifest.display()))?;
    let manifest = manifest::Manifest::from_json(&json)?;
    let output_name = manifest.output_name.clone().unwrap_or(output_name);
    let entries = manifest.into_entries()?;

    let pipeline = ExportPipeline::new(
        Arc::new(FileResolver::new(source_dir)),
        Arc::new(LocalFileSink::new(out_dir)),
    );
    let job = playlist_core::ExportJob {
        entries,
        output_name,
        decision,
    };

    let outcome = match pipeline.export(job, &Session::offline()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            print_report(&ProcessResult::failure(&e))?;
            return Err(e).context("Export failed");
        }
    };

    match outcome {
        ExportOutcome::Downloaded { metrics, .. } | ExportOutcome::Uploaded { metrics, .. } => {
            print_report(&ProcessResult::ok_without_data(metrics))
        }
        other => {
            tracing::info!(outcome = ?other, "nothing written");
            Ok(())
        }
    }
}
