use anyhow::{Context, bail};
use clap::Parser;
use dotenvy::dotenv;
use medcode_backend::config::AppConfig;
use medcode_backend::services::client::ApiClient;
use medcode_backend::services::normalize::{
    average_confidence, derive_code_rows, format_score, normalize_entity_graph,
};
use medcode_backend::services::poller::{PollConfig, PollEvent, ResultPoller};
use medcode_backend::services::transfer::HttpObjectTransfer;
use medcode_backend::services::uploader::{FileSpec, UploadCoordinator, UploadEvent, UploadStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upload medical documents and wait for their extraction results.
#[derive(Parser)]
#[command(name = "ingest", about = "Upload documents and wait for AI extraction results")]
struct Args {
    /// Files to upload (duplicated names are dropped, first seen wins)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Base URL of the intake API
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    api: String,

    /// Give up waiting for results after this many seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest=info,medcode_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // 1. Build the batch
    let api = Arc::new(ApiClient::new(&args.api));
    let mut coordinator = UploadCoordinator::new(api.clone(), Arc::new(HttpObjectTransfer::new()));

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                UploadEvent::Status { index, status } => {
                    info!("   file #{index}: {status:?}");
                }
                UploadEvent::Progress { index, progress } => {
                    info!("   file #{index}: {progress}%");
                }
            }
        }
    });

    let mut specs = Vec::new();
    for path in &args.files {
        specs.push(
            FileSpec::from_path(path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?,
        );
    }
    coordinator.add_files(specs);

    // 2. Upload
    info!("📤 Uploading {} file(s)...", coordinator.items().len());
    let manifest = coordinator.start_upload().await?;
    for item in coordinator.items() {
        if item.status == UploadStatus::Error {
            warn!(
                "❌ {} failed: {}",
                item.name,
                item.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    info!(
        "✅ Uploaded {}/{} file(s)",
        manifest.files.len(),
        coordinator.items().len()
    );

    let Some(primary) = manifest.files.first() else {
        bail!("manifest is empty");
    };

    // 3. Poll for the extraction result of the primary document
    info!("🔎 Waiting for extraction results for {}...", primary.key);
    let poll_config = PollConfig::from_app_config(&AppConfig::from_env());
    let poller = ResultPoller::new(api.clone(), poll_config);
    let (handle, mut poll_events) = poller.start(primary.key.clone());

    let wait_for_record = async {
        loop {
            match poll_events.recv().await {
                Some(PollEvent::Retrying { message }) => warn!("⚠️  {message} — still retrying"),
                Some(PollEvent::Resolved(record)) => break Ok(*record),
                None => break Err(anyhow::anyhow!("polling stopped unexpectedly")),
            }
        }
    };
    let record = tokio::select! {
        record = wait_for_record => record?,
        _ = tokio::time::sleep(Duration::from_secs(args.timeout)) => {
            handle.cancel();
            bail!("timed out after {}s waiting for processing results", args.timeout);
        }
    };

    // 4. Normalize and summarize
    let graph = normalize_entity_graph(Some(&record));
    let rows = derive_code_rows(&graph);

    let patient = record.patient_summary();
    info!(
        "🧑 Patient: {} ({}, {}) — service date {}",
        patient.name.as_deref().unwrap_or("N/A"),
        patient.age.as_deref().unwrap_or("N/A"),
        patient.gender.as_deref().unwrap_or("N/A"),
        patient.service_date.as_deref().unwrap_or("N/A"),
    );

    info!(
        "🧾 {} entities, {} unmapped attributes, average confidence {}%",
        graph.entities.len(),
        graph.unmapped_attributes.len(),
        average_confidence(&rows)
    );
    for entity in &graph.entities {
        let top_code = entity
            .icd_concepts
            .first()
            .map(|concept| concept.code.as_str())
            .unwrap_or("-");
        info!(
            "   [{}] {} ({} / {}) score {} → {}",
            entity.id,
            entity.text,
            entity.category,
            entity.entity_type,
            format_score(entity.score),
            top_code,
        );
    }

    Ok(())
}
