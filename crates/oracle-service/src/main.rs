use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oracle_config::ConfigLoader;
use oracle_service::{api::ApiServer, implementations};
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "oracle-service")]
#[command(about = "Cross-chain price oracle service", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/oracle.toml")]
	config: PathBuf,

	#[arg(long, env = "ORACLE_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the oracle service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level);

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Loading configuration from: {:?}", cli.config);
	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;
	info!("Oracle service name: {}", config.oracle.name);

	let api_config = config.api.clone().filter(|api| api.enabled);
	let engine = implementations::builder(config)
		.build()
		.await
		.context("Failed to build oracle engine")?;

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	tokio::spawn(async move {
		setup_shutdown_signal().await;
		info!("Shutdown signal received, stopping services...");
		let _ = shutdown_tx.send(true);
	});

	let api_handle = api_config.map(|api| {
		let server = ApiServer::new(&api, engine.service());
		let shutdown = wait_for_shutdown(shutdown_rx.clone());
		tokio::spawn(async move { server.run(shutdown).await })
	});

	engine
		.run(wait_for_shutdown(shutdown_rx))
		.await
		.context("Oracle engine failed")?;

	if let Some(handle) = api_handle {
		match handle.await {
			Ok(Err(e)) => warn!("API server stopped with an error: {}", e),
			Err(e) => warn!("API server task failed: {}", e),
			Ok(Ok(())) => {}
		}
	}

	info!("Oracle service stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Storage backend: {}", config.storage.backend);
	info!("Configured oracles:");
	for oracle in &config.oracles {
		info!(
			"  {} ({} source, threshold {}) -> {}",
			oracle.id,
			oracle.source.kind(),
			oracle.threshold,
			oracle.destination.key()
		);
	}

	Ok(())
}

fn setup_tracing(log_level: &str) {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
	let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn setup_shutdown_signal() {
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
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
