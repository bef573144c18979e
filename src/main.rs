use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use skindoc_lib::config::{self, AppConfig};
use skindoc_lib::models::RawAdviceText;
use skindoc_lib::pipeline::diagnosis::{
    parse_prescription, DiagnosisOrchestrator, DiagnosisOutcome, HttpAdviceClient,
    HttpClassificationClient,
};
use skindoc_lib::report::{export_report, render_prescription, render_report, ReportView};

#[derive(Parser)]
#[command(name = "skindoc")]
#[command(version, about = "Skin condition diagnosis and prescription reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image and, if confident, fetch a prescription
    Diagnose {
        /// Image file to classify
        image: PathBuf,
        /// Minimum confidence (exclusive, 0-100)
        #[arg(long, value_parser = parse_threshold_arg)]
        threshold: Option<f64>,
        /// Export the report as PDF
        #[arg(long)]
        export: bool,
        /// Directory for the exported PDF
        #[arg(long)]
        export_dir: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render saved advice text as a prescription report
    Render {
        /// File holding the advice text
        advice_file: PathBuf,
        /// Export the report as PDF
        #[arg(long)]
        export: bool,
        /// Directory for the exported PDF
        #[arg(long)]
        export_dir: Option<PathBuf>,
        /// Print the parsed prescription as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_threshold_arg(raw: &str) -> Result<f64, String> {
    config::parse_threshold(raw).map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    skindoc_lib::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Diagnose {
            image,
            threshold,
            export,
            export_dir,
            json,
        } => {
            let config = AppConfig::from_env().context("Failed to load configuration")?;
            diagnose(config, image, threshold, export.then_some(export_dir), json).await
        }
        Commands::Render {
            advice_file,
            export,
            export_dir,
            json,
        } => render(advice_file, export.then_some(export_dir), json).await,
    }
}

/// `export` is `Some(dir override)` when export was requested.
async fn diagnose(
    config: AppConfig,
    image: PathBuf,
    threshold: Option<f64>,
    export: Option<Option<PathBuf>>,
    json: bool,
) -> anyhow::Result<()> {
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let classifier = HttpClassificationClient::from_config(&config)?;
    let advisor = HttpAdviceClient::from_config(&config)?;
    let mut orchestrator = DiagnosisOrchestrator::new(Box::new(classifier), Box::new(advisor))
        .with_confidence_threshold(threshold.unwrap_or(config.confidence_threshold))
        .with_max_image_bytes(config.max_image_bytes);

    let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    orchestrator.stage_image(bytes);

    match orchestrator.submit().await? {
        DiagnosisOutcome::Completed(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_report(&report));
            }
            if let Some(dir) = export {
                let dir = dir.unwrap_or(config.export_dir);
                write_pdf(render_report(&report), dir).await?;
            }
        }
        DiagnosisOutcome::LowConfidence { diagnosis, message } => {
            tracing::warn!(
                label = diagnosis.label.as_deref().unwrap_or("-"),
                confidence = diagnosis.confidence_score,
                "Diagnosis below confidence threshold"
            );
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "diagnosis": diagnosis, "warning": message })
                );
            } else {
                println!("{message}");
            }
        }
    }

    Ok(())
}

async fn render(advice_file: PathBuf, export: Option<Option<PathBuf>>, json: bool) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&advice_file)
        .await
        .with_context(|| format!("Failed to read {}", advice_file.display()))?;
    let raw = RawAdviceText::from(text);
    let record = parse_prescription(raw.as_str());

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("{}", render_prescription(&record, &raw, None));
    }
    if let Some(dir) = export {
        let dir = dir.unwrap_or_else(config::exports_dir);
        write_pdf(render_prescription(&record, &raw, None), dir).await?;
    }

    Ok(())
}

async fn write_pdf(view: ReportView, dir: PathBuf) -> anyhow::Result<()> {
    let path = export_report(view, dir).await?;
    println!("Saved {}", path.display());
    Ok(())
}
