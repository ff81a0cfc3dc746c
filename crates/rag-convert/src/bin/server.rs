//! Converter server binary
//!
//! Run with: cargo run -p rag-convert --bin rag-convert-server

use rag_convert::{config::ConverterConfig, server::ConvertServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_convert=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConverterConfig::from_env()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Working directory: {}", config.staging.work_dir.display());
    tracing::info!("  - Max upload size: {} bytes", config.server.max_upload_size);
    tracing::info!("  - PDF extraction timeout: {}s", config.extraction.pdf_timeout_secs);

    let server = ConvertServer::new(config)?;

    println!("\nServer starting...");
    println!("  Upload page: http://{}/", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/convert          - Convert a file and download the JSON");
    println!("  POST /api/convert/preview  - Convert a file and preview the JSON");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
