use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use rust_object_ingest::config::IngestConfig;
use rust_object_ingest::infrastructure::{storage, transcoder};
use rust_object_ingest::services::object_service::ObjectService;
use rust_object_ingest::services::staging::LocalStagingStore;
use rust_object_ingest::services::worker::StagingSweeper;
use rust_object_ingest::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the API server to
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Disable the periodic staging sweeper
    #[arg(long)]
    no_sweeper: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_object_ingest=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Object Ingest...");

    let config = IngestConfig::from_env();
    info!(
        "⚙️  Config: env={}, staging={}, part size={}MB, transcoder={}",
        config.environment,
        config.staging_root.display(),
        config.upload_part_size / 1024 / 1024,
        config.transcoder_type
    );

    tokio::fs::create_dir_all(&config.staging_root)
        .await
        .with_context(|| format!("Failed to create {}", config.staging_root.display()))?;

    let durable = storage::setup_storage(&config).await?;
    let transcoder = transcoder::setup_transcoder(&config)?;
    let object_service = Arc::new(ObjectService::new(
        Arc::new(LocalStagingStore::new(&config.staging_root)),
        durable,
        transcoder,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sweeper_handle = if args.no_sweeper {
        None
    } else {
        let sweeper = StagingSweeper::from_config(&config, shutdown_rx);
        Some(tokio::spawn(sweeper.run()))
    };

    let state = AppState {
        object_service: object_service.clone(),
        config: config.clone(),
    };

    let app = create_app(state);
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://{}", addr);
    info!("📖 Swagger UI documentation: http://{}/swagger-ui", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    info!("🛑 Shutting down, waiting for {} background write(s)...", object_service.pending_background());
    let _ = shutdown_tx.send(true);
    object_service.wait_for_background().await;
    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }

    info!("👋 Object Ingest exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
