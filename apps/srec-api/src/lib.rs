pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::{
	Parser,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
	version = VERSION,
	rename_all = "kebab",
	styles = styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Red.on_default() | Effects::BOLD)
		.usage(AnsiColor::Red.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = srec_config::load(&args.config)?;

	init_tracing(&config)?;

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let state = AppState::new(config).await?;

	spawn_background(&state);

	let app = routes::router(state.clone());
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(http_listener, app).with_graceful_shutdown(shutdown_signal()).await?;
	state.service.checkpoint().await?;

	tracing::info!("Index checkpointed; shutting down.");

	Ok(())
}

fn init_tracing(config: &srec_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}

/// Runs the dataset bootstrap, then periodic cache sweeps and log compaction.
fn spawn_background(state: &AppState) {
	let service = Arc::clone(&state.service);

	tokio::spawn(async move {
		let report = service.initialize().await;

		for (dataset, report) in [("stock", report.stocks), ("news", report.news)] {
			if let Some(report) = report {
				tracing::info!(
					dataset,
					skipped = report.skipped,
					records = report.records,
					inserted = report.upserted.inserted,
					"Dataset bootstrap finished."
				);
			}
		}

		tracing::info!(
			items = service.store().len(),
			news = service.news_store().len(),
			"Service ready."
		);
	});

	let service = Arc::clone(&state.service);
	let period = Duration::from_millis(service.cfg.cache.sweep_interval_ms);

	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(period);

		// The first tick completes immediately.
		ticker.tick().await;

		loop {
			ticker.tick().await;

			if let Err(err) = service.maintain().await {
				tracing::warn!(error_kind = err.kind().as_str(), error = %err, "Maintenance failed.");
			}
		}
	});
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "Failed to listen for the shutdown signal.");

		std::future::pending::<()>().await;
	}
}
