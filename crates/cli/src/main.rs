//! `maiopinion` -- terminal client for the MaiOpinion diagnostic pipeline.
//!
//! Uploads an image with a condition description and prints each
//! diagnostic stage as the pipeline reports it, then the final report.
//!
//! # Environment variables
//!
//! | Variable               | Default                 | Description                      |
//! |------------------------|-------------------------|----------------------------------|
//! | `MAIOPINION_API_URL`   | `http://localhost:5000` | Pipeline base URL                |
//! | `CONNECT_TIMEOUT_SECS` | `10`                    | TCP connect timeout              |
//! | `MAX_FRAME_BYTES`      | `1048576`               | Bound on a buffered partial frame|
//! | `MAX_IMAGE_BYTES`      | `16777216`              | Upload size limit                |
//! | `RUST_LOG`             | `maiopinion_cli=info,maiopinion_client=info` | Log filter |

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use maiopinion_cli::cli::{Cli, Commands};
use maiopinion_cli::render::{report_summary, StepPrinter};
use maiopinion_client::{ClientConfig, Completion, DiagnoseApi, SubmissionCoordinator};
use maiopinion_core::validation::{DiagnosisInput, ImageUpload};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maiopinion_cli=info,maiopinion_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // --- Configuration ---
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    tracing::debug!(api_url = %config.api_url, "Loaded client configuration");

    match cli.command {
        Commands::Health => health(&config, cli.json).await,
        Commands::Diagnose {
            image,
            condition,
            email,
            save_report,
        } => {
            let input = DiagnosisInput {
                image: Some(read_image(&image).await?),
                condition,
                wants_email: email.is_some(),
                email: email.unwrap_or_default(),
            };
            diagnose(&config, input, cli.json, save_report.as_deref()).await
        }
    }
}

async fn health(config: &ClientConfig, json: bool) -> anyhow::Result<ExitCode> {
    let api = DiagnoseApi::from_config(config)?;
    let status = api
        .health()
        .await
        .with_context(|| format!("Pipeline at {} is unreachable", api.api_url()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}: {}", status.status, status.message);
    }
    Ok(if status.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn diagnose(
    config: &ClientConfig,
    input: DiagnosisInput,
    json: bool,
    save_report: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let coordinator = SubmissionCoordinator::from_config(config)?;
    let mut snapshots = coordinator.subscribe();
    let mut printer = StepPrinter::default();

    let submission = coordinator.submit(input);
    tokio::pin!(submission);

    let result = loop {
        tokio::select! {
            result = &mut submission => break result,
            changed = snapshots.changed() => {
                if changed.is_ok() && !json {
                    for line in printer.update(&snapshots.borrow_and_update()) {
                        println!("{line}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling submission");
                coordinator.reset().await;
            }
        }
    };

    let outcome = coordinator.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        for line in printer.update(&outcome) {
            println!("{line}");
        }
    }

    match result {
        Ok(Completion::Report(report)) => {
            if !json {
                println!();
                print!("{}", report_summary(&report));
            }
            if let Some(dir) = save_report {
                let path = report
                    .export_json(dir)
                    .with_context(|| format!("Failed to save report into {}", dir.display()))?;
                eprintln!("Report saved to {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Ok(Completion::StreamEnded) => {
            eprintln!("Pipeline closed the stream before sending a report");
            Ok(ExitCode::FAILURE)
        }
        Ok(Completion::Cancelled) => {
            eprintln!("Submission cancelled");
            Ok(ExitCode::from(130))
        }
        Err(err) => {
            eprintln!("Error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn read_image(path: &Path) -> anyhow::Result<ImageUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ImageUpload::new(file_name, bytes))
}
