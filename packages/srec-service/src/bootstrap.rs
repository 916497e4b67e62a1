use std::{fs, io::ErrorKind, path::Path, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use srec_domain::{NewsRecord, StockRecord};
use srec_storage::VectorStore;

use crate::{Error, RecommendService, Result, items::UpsertSummary};

#[derive(Clone, Debug, Default, Serialize)]
pub struct BootstrapReport {
	/// True when the store already held items and the dataset was not read.
	pub skipped: bool,
	pub records: usize,
	pub upserted: UpsertSummary,
}

/// Outcome of each configured dataset load; `None` when the dataset is not configured or its
/// load failed.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StartupReport {
	pub stocks: Option<BootstrapReport>,
	pub news: Option<BootstrapReport>,
}

impl RecommendService {
	/// Loads a JSON array of stock records into the stock store, but only when it is empty. The
	/// whole dataset is embedded before anything is written, so a failed load leaves the store
	/// empty and the next start retries it.
	pub async fn bootstrap_from_file(&self, path: &Path) -> Result<BootstrapReport> {
		if skip_populated(&self.store, path, "stock") {
			return Ok(BootstrapReport { skipped: true, ..Default::default() });
		}

		let records: Vec<StockRecord> = read_dataset(path).await?;
		let total = records.len();

		tracing::info!(path = ?path, records = total, "Bootstrapping store from stock dataset.");

		let upserted = self.upsert_stocks(records).await?;

		Ok(BootstrapReport { skipped: false, records: total, upserted })
	}

	/// Loads a JSON array of news articles into the news store, but only when it is empty.
	pub async fn bootstrap_news_from_file(&self, path: &Path) -> Result<BootstrapReport> {
		if skip_populated(&self.news, path, "news") {
			return Ok(BootstrapReport { skipped: true, ..Default::default() });
		}

		let records: Vec<NewsRecord> = read_dataset(path).await?;
		let total = records.len();

		tracing::info!(path = ?path, records = total, "Bootstrapping news store from dataset.");

		let upserted = self.upsert_news(records).await?;

		Ok(BootstrapReport { skipped: false, records: total, upserted })
	}

	/// Runs the configured dataset loads, then marks the service ready. A failed load is logged
	/// and still ends in the ready state so queries can reach whatever the stores hold.
	pub async fn initialize(&self) -> StartupReport {
		let mut report = StartupReport::default();

		if let Some(path) = self.cfg.bootstrap.stock_data_path.clone() {
			report.stocks = log_failure(&path, self.bootstrap_from_file(&path).await);
		}
		if let Some(path) = self.cfg.bootstrap.news_data_path.clone() {
			report.news = log_failure(&path, self.bootstrap_news_from_file(&path).await);
		}

		self.mark_ready();

		report
	}
}

fn skip_populated(store: &Arc<VectorStore>, path: &Path, dataset: &str) -> bool {
	if store.is_empty() {
		return false;
	}

	tracing::info!(
		path = ?path,
		dataset,
		items = store.len(),
		"Store already populated; skipping dataset bootstrap."
	);

	true
}

async fn read_dataset<T>(path: &Path) -> Result<Vec<T>>
where
	T: DeserializeOwned,
{
	let owned = path.to_path_buf();
	let raw = tokio::task::spawn_blocking(move || fs::read(&owned))
		.await
		.map_err(|err| Error::Storage { message: format!("Dataset read task failed: {err}") })?
		.map_err(|err| match err.kind() {
			ErrorKind::NotFound =>
				Error::NotFound { message: format!("Dataset {path:?} does not exist.") },
			_ => Error::Storage { message: format!("Failed to read {path:?}: {err}") },
		})?;

	serde_json::from_slice(&raw)
		.map_err(|err| Error::invalid(format!("Dataset {path:?} is not a record array: {err}")))
}

fn log_failure(path: &Path, result: Result<BootstrapReport>) -> Option<BootstrapReport> {
	match result {
		Ok(report) => Some(report),
		Err(err) => {
			tracing::error!(
				path = ?path,
				error_kind = err.kind().as_str(),
				error = %err,
				"Dataset bootstrap failed."
			);

			None
		},
	}
}
