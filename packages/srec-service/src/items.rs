use std::{cmp::Reverse, collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};
use srec_domain::{
	EmbedSource, Filter, Item, Metadata, MetadataValue, NewsRecord, Predicate, StockRecord,
};
use srec_storage::{DeleteOutcome, UpsertOutcome, VectorStore};

use crate::{Error, RecommendService, Result};

const EMBED_BATCH_SIZE: usize = 64;

#[derive(Clone, Debug, Deserialize)]
pub struct UpsertItemRequest {
	pub id: String,
	pub vector: Vec<f32>,
	#[serde(default)]
	pub metadata: Metadata,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpsertItemResponse {
	pub id: String,
	pub outcome: UpsertOutcome,
	pub generation: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeleteItemResponse {
	pub id: String,
	pub outcome: DeleteOutcome,
	pub generation: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
	pub inserted: usize,
	pub updated: usize,
	pub unchanged: usize,
}
impl UpsertSummary {
	fn record(&mut self, outcome: UpsertOutcome) {
		match outcome {
			UpsertOutcome::Inserted => self.inserted += 1,
			UpsertOutcome::Updated => self.updated += 1,
			UpsertOutcome::Unchanged => self.unchanged += 1,
		}
	}
}

impl RecommendService {
	pub async fn upsert_item(&self, req: UpsertItemRequest) -> Result<UpsertItemResponse> {
		let id = req.id.trim().to_string();

		if id.is_empty() {
			return Err(Error::invalid("id must be non-empty."));
		}

		let item = Item::new(id.clone(), req.vector, req.metadata);
		let outcome = self.with_store(move |store| store.upsert(item)).await?;

		tracing::info!(id = %id, outcome = outcome.as_str(), "Item upserted.");

		Ok(UpsertItemResponse { id, outcome, generation: self.store.generation() })
	}

	pub async fn delete_item(&self, id: &str) -> Result<DeleteItemResponse> {
		let id = id.trim().to_string();

		if id.is_empty() {
			return Err(Error::invalid("id must be non-empty."));
		}

		let target = id.clone();
		let outcome = self.with_store(move |store| store.delete(&target)).await?;

		tracing::info!(id = %id, outcome = outcome.as_str(), "Item delete processed.");

		Ok(DeleteItemResponse { id, outcome, generation: self.store.generation() })
	}

	pub fn get_item(&self, id: &str) -> Result<Arc<Item>> {
		self.store
			.get(id.trim())
			.ok_or_else(|| Error::NotFound { message: format!("No item with id {id:?}.") })
	}

	/// Embeds stock records in provider batches, then upserts the whole set keyed by stock code
	/// in one durable write. If any batch fails to embed, nothing is stored. Records repeating an
	/// earlier code are ignored.
	pub async fn upsert_stocks(&self, records: Vec<StockRecord>) -> Result<UpsertSummary> {
		let mut seen = HashSet::new();
		let mut pending = Vec::with_capacity(records.len());

		for record in records {
			if record.item_id().is_empty() {
				return Err(Error::invalid("Every stock record needs a non-empty code."));
			}
			if seen.insert(record.item_id().to_string()) {
				pending.push(PendingItem {
					id: record.item_id().to_string(),
					metadata: record.metadata(),
					source: EmbedSource::Stock(record),
				});
			} else {
				tracing::warn!(code = record.item_id(), "Skipping duplicate stock record.");
			}
		}

		let summary = self.embed_and_upsert(&self.store, pending).await?;

		tracing::info!(
			inserted = summary.inserted,
			updated = summary.updated,
			unchanged = summary.unchanged,
			"Stock records upserted."
		);

		Ok(summary)
	}

	/// Embeds news articles from their title and body and upserts them into the news store in
	/// one durable write. Articles repeating an earlier identity are ignored.
	pub async fn upsert_news(&self, records: Vec<NewsRecord>) -> Result<UpsertSummary> {
		let mut seen = HashSet::new();
		let mut pending = Vec::with_capacity(records.len());

		for record in records {
			if record.code.trim().is_empty() || record.title.trim().is_empty() {
				return Err(Error::invalid("Every news record needs a non-empty code and title."));
			}

			let id = record.item_id();

			if !seen.insert(id.clone()) {
				tracing::warn!(id = %id, "Skipping duplicate news record.");

				continue;
			}

			pending.push(PendingItem {
				id,
				metadata: record.metadata(),
				source: EmbedSource::Text(record.embedding_text()),
			});
		}

		let summary = self.embed_and_upsert(&self.news, pending).await?;

		tracing::info!(
			inserted = summary.inserted,
			updated = summary.updated,
			unchanged = summary.unchanged,
			"News records upserted."
		);

		Ok(summary)
	}

	/// Up to `limit` articles for a stock code, newest `published_date` first.
	pub async fn news_for_code(&self, code: &str, limit: usize) -> Result<Vec<NewsRecord>> {
		let code = code.trim();

		if limit == 0 || code.is_empty() {
			return Ok(Vec::new());
		}

		let filter = Filter::new(vec![Predicate::Eq {
			field: "code".to_string(),
			value: MetadataValue::from(code),
		}])?;
		let items = self.with_news_store(move |store| Ok(store.matching(&filter))).await?;
		let mut news: Vec<(String, NewsRecord)> = items
			.iter()
			.filter_map(|item| {
				NewsRecord::from_metadata(&item.metadata).map(|record| (item.id.clone(), record))
			})
			.collect();

		news.sort_by(|(left_id, left), (right_id, right)| {
			Reverse(&left.published_date)
				.cmp(&Reverse(&right.published_date))
				.then_with(|| left_id.cmp(right_id))
		});
		news.truncate(limit);

		Ok(news.into_iter().map(|(_, record)| record).collect())
	}

	async fn embed_and_upsert(
		&self,
		store: &Arc<VectorStore>,
		pending: Vec<PendingItem>,
	) -> Result<UpsertSummary> {
		let mut items = Vec::with_capacity(pending.len());

		for batch in pending.chunks(EMBED_BATCH_SIZE) {
			let sources: Vec<EmbedSource> = batch.iter().map(|item| item.source.clone()).collect();
			let vectors = self.embed_sources(&sources).await?;

			for (item, vector) in batch.iter().zip(vectors) {
				items.push(Item::new(item.id.clone(), vector, item.metadata.clone()));
			}
		}

		let mut summary = UpsertSummary::default();

		if items.is_empty() {
			return Ok(summary);
		}

		let outcomes = run_blocking(store, move |store| store.upsert_batch(items)).await?;

		for outcome in outcomes {
			summary.record(outcome);
		}

		Ok(summary)
	}

	pub(crate) async fn with_store<T, F>(&self, work: F) -> Result<T>
	where
		T: Send + 'static,
		F: FnOnce(&VectorStore) -> srec_storage::Result<T> + Send + 'static,
	{
		run_blocking(&self.store, work).await
	}

	pub(crate) async fn with_news_store<T, F>(&self, work: F) -> Result<T>
	where
		T: Send + 'static,
		F: FnOnce(&VectorStore) -> srec_storage::Result<T> + Send + 'static,
	{
		run_blocking(&self.news, work).await
	}
}

struct PendingItem {
	id: String,
	metadata: Metadata,
	source: EmbedSource,
}

async fn run_blocking<T, F>(store: &Arc<VectorStore>, work: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce(&VectorStore) -> srec_storage::Result<T> + Send + 'static,
{
	let store = Arc::clone(store);

	tokio::task::spawn_blocking(move || work(store.as_ref()))
		.await
		.map_err(|err| Error::Storage { message: format!("Store task failed: {err}") })?
		.map_err(Error::from)
}
