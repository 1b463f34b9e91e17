use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use radlink::{AppConfig, PacsClient, ReportMetadata, StudyQueryParams};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "radlink", about = "Verify, query and store reports on a PACS")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "RADLINK_CONFIG", default_value = "radlink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Verify the PACS with C-ECHO
    Echo,
    /// Search studies with C-FIND
    Find {
        #[arg(long)]
        patient_name: Option<String>,
        #[arg(long)]
        patient_id: Option<String>,
        #[arg(long)]
        accession_number: Option<String>,
        /// YYYYMMDD or YYYYMMDD-YYYYMMDD
        #[arg(long)]
        study_date: Option<String>,
        #[arg(long)]
        modality: Option<String>,
        #[arg(long)]
        study_description: Option<String>,
        #[arg(long)]
        study_instance_uid: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
        /// Print values as received instead of formatted for display
        #[arg(long)]
        raw: bool,
    },
    /// Store a PDF report as an Encapsulated PDF instance
    Store {
        /// PDF document to send
        #[arg(short, long)]
        pdf: PathBuf,
        /// JSON file with the report metadata
        #[arg(short, long)]
        metadata: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    radlink::logging::init(&config.logging)?;
    tracing::info!("Starting radlink {}", env!("CARGO_PKG_VERSION"));

    let client = PacsClient::new(config.pacs)?;

    let (success, output) = match cli.cmd {
        Cmd::Echo => {
            let status = client.connection_status().await;
            (status.success, serde_json::to_value(&status)?)
        }
        Cmd::Find {
            patient_name,
            patient_id,
            accession_number,
            study_date,
            modality,
            study_description,
            study_instance_uid,
            max_results,
            raw,
        } => {
            let params = StudyQueryParams {
                patient_name,
                patient_id,
                accession_number,
                study_date,
                modality,
                study_description,
                study_instance_uid,
                max_results,
            };

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let result = client.query_studies_with_cancel(&params, cancel).await;
            let output = if raw {
                serde_json::to_value(&result)?
            } else {
                json!({
                    "success": result.success,
                    "totalResults": result.total_results,
                    "cancelled": result.cancelled,
                    "error": result.error,
                    "studies": result.views(),
                })
            };
            (result.success, output)
        }
        Cmd::Store { pdf, metadata } => {
            let document = std::fs::read(&pdf).with_context(|| format!("reading {}", pdf.display()))?;
            let text = std::fs::read_to_string(&metadata)
                .with_context(|| format!("reading {}", metadata.display()))?;
            let metadata: ReportMetadata = serde_json::from_str(&text)?;

            let result = client.store_report_pdf(&document, &metadata).await;
            (result.success, serde_json::to_value(&result)?)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
