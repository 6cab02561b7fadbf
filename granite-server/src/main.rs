//! granite-server binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use granite::broadcast::{JobProgressBroadcaster, MemoryJobStore};
use granite::config::{load_settings, Credentials, Settings};
use granite::pipeline::PipelineConfig;
use granite::worker::JobManager;
use granite::workflow::build_factory;
use granite_server::{serve, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, Parser)]
#[command(name = "granite-server", version, about = "Narrated educational video generator")]
struct Args {
    /// Settings file (JSON, or YAML by extension).
    #[arg(short, long, env = "GRANITE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the settings file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Walk through the stages without calling any external tool or API.
    #[arg(long)]
    simulate: bool,
}

fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = format!(
        "granite={level},granite_server={level},tower_http={level}",
        level = settings.logging.level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = Registry::default().with(filter);
    if settings.logging.json {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))?;
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer()))?;
    }
    tracing_log::LogTracer::init()?;
    Ok(())
}

async fn shutdown_signal(manager: Arc<JobManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
    manager.cancel_all();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        settings.server.bind_address = bind;
    }
    if args.simulate {
        settings.simulate = true;
    }

    init_logging(&settings)?;
    log::info!("Starting granite-server v{}", env!("CARGO_PKG_VERSION"));

    let credentials = Credentials::resolve(&settings)?;
    let factory = build_factory(&settings, &credentials)?;

    let manager = Arc::new(JobManager::new(
        PipelineConfig::from_settings(&settings),
        factory,
        Arc::new(MemoryJobStore::new()),
        JobProgressBroadcaster::default(),
    ));
    let state = AppState::new(Arc::clone(&manager), &settings.server.upload_directory);

    let listener = TcpListener::bind(&settings.server.bind_address).await?;
    serve(listener, state, shutdown_signal(manager)).await?;

    log::info!("granite-server stopped");
    Ok(())
}
