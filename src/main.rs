use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;

use menu2img::{
    build_app,
    config::{Cli, Commands, Config},
    logging::init_logging,
    models::AppState,
    pipeline::MenuPipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config;

    // Keep guard alive so file logger flushes correctly
    let _log_guards = init_logging(&config);

    log_config(&config);

    tokio::fs::create_dir_all(&config.upload_dir).await.ok();
    tokio::fs::create_dir_all(&config.output_dir).await.ok();

    if let Some(command) = cli.command {
        return handle_command(command, config).await;
    }

    let state = AppState::new(config.clone());
    let app = build_app(state);

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("listening on {}", config.bind);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn log_config(config: &Config) {
    tracing::info!("=== Configuration ===");
    tracing::info!("Bind address: {}", config.bind);
    tracing::info!("Upload directory: {}", config.upload_dir.display());
    tracing::info!("Output directory: {}", config.output_dir.display());
    tracing::info!("History file: {}", config.history_file.display());
    tracing::info!("Log file: {}", config.log_file.display());
    tracing::info!(
        "API key: {}",
        if config.api_key().is_ok() {
            "<set>"
        } else {
            "<not set>"
        }
    );
    tracing::info!("API URL: {}", config.api_url);
    tracing::info!("Vision model: {}", config.vision_model);
    tracing::info!("Image model: {} ({})", config.image_model, config.image_size);
    tracing::info!("Generation delay: {} ms", config.generation_delay_ms);
    tracing::info!("====================");
}

async fn handle_command(command: Commands, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Process { image } => process_file(&image, config).await,
    }
}

async fn process_file(image: &std::path::Path, config: Config) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("failed to read {}", image.display()))?;
    let filename = image
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let pipeline = MenuPipeline::new(config);
    let result = pipeline.process(&filename, &bytes).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
