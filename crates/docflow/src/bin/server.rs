//! Docflow server binary
//!
//! Run with: cargo run -p docflow --bin docflow-server -- --config docflow.toml

use clap::Parser;
use docflow::{config::DocflowConfig, server::DocflowServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docflow-server")]
#[command(about = "Asynchronous document processing service", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, env = "DOCFLOW_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docflow=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                         Docflow                           ║
║        Background Document Processing + Live Alerts       ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    let config = DocflowConfig::load(cli.config.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - LLM: {:?} {} at {}", config.llm.provider, config.llm.model, config.llm.base_url);
    tracing::info!("  - Max file size: {} bytes", config.processing.max_file_size);
    tracing::info!("  - Concurrent runs: {}", config.processing.max_concurrent_tasks);
    tracing::info!("  - Storage: {:?}", config.storage.backend);

    let server = DocflowServer::new(config)?;

    // Check the inference backend
    if let Err(e) = check_inference(&server).await {
        tracing::warn!("{}", e);
    }

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST /process/submit            - Upload a file for processing");
    println!("  GET  /process/tasks             - List tasks");
    println!("  GET  /process/tasks/:task_id    - Task status and result");
    println!("  GET  /process/ws/:user_id       - Live updates (?token=JWT)");
    println!("  POST /auth/validate-token       - Validate a token");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}

async fn check_inference(server: &DocflowServer) -> anyhow::Result<()> {
    let config = &server.state().config().llm;
    tracing::info!("Checking inference backend at {}...", config.base_url);
    let client = docflow::providers::create_inference_client(config)?;
    match client.health_check().await {
        Ok(true) => {
            tracing::info!("{} is reachable", client.name());
            Ok(())
        }
        Ok(false) => anyhow::bail!("{} at {} answered but is not healthy", client.name(), config.base_url),
        Err(e) => anyhow::bail!("{} not available at {}: {}", client.name(), config.base_url, e),
    }
}
