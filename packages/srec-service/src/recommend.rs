use std::{
	sync::{Arc, atomic::Ordering},
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use srec_domain::{EmbedSource, Filter, RankedItem, StockRecord, item, rank};
use uuid::Uuid;

use crate::{Error, RecommendService, Result, cache};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecommendRequest {
	/// Pre-computed query vector.
	#[serde(default)]
	pub vector: Option<Vec<f32>>,
	/// A stock record embedded with the configured provider.
	#[serde(default)]
	pub record: Option<StockRecord>,
	/// Free text embedded with the configured provider.
	#[serde(default)]
	pub keyword: Option<String>,
	#[serde(default)]
	pub k: Option<u32>,
	#[serde(default)]
	pub filters: Filter,
}
impl RecommendRequest {
	pub fn keyword(keyword: impl Into<String>, k: Option<u32>) -> Self {
		Self { keyword: Some(keyword.into()), k, ..Default::default() }
	}

	pub fn vector(vector: Vec<f32>, k: Option<u32>) -> Self {
		Self { vector: Some(vector), k, ..Default::default() }
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct RecommendResponse {
	pub items: Vec<RankedItem>,
	pub took_ms: u64,
	pub cache_hit: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RequestState {
	Received,
	Embedded,
	Retrieved,
	Ranked,
	Cached,
	Returned,
	Failed,
}
impl RequestState {
	fn as_str(self) -> &'static str {
		match self {
			Self::Received => "RECEIVED",
			Self::Embedded => "EMBEDDED",
			Self::Retrieved => "RETRIEVED",
			Self::Ranked => "RANKED",
			Self::Cached => "CACHED",
			Self::Returned => "RETURNED",
			Self::Failed => "FAILED",
		}
	}
}

enum Query {
	Vector(Vec<f32>),
	Source(EmbedSource),
}
impl Query {
	/// Stable representation used in cache keys.
	fn normalized(&self) -> Value {
		match self {
			Self::Vector(vector) => serde_json::json!({ "vector": vector }),
			Self::Source(EmbedSource::Text(text)) => serde_json::json!({ "keyword": text }),
			Self::Source(EmbedSource::Stock(record)) => serde_json::json!({ "record": record }),
		}
	}
}

struct Validated {
	query: Query,
	k: usize,
	filter: Filter,
}

impl RecommendService {
	/// Runs one request through embed, retrieve, rank, and cache under the configured time
	/// budget. Dropping the future abandons the pipeline without emitting a partial result.
	pub async fn recommend(&self, req: RecommendRequest) -> Result<RecommendResponse> {
		let request_id = Uuid::new_v4();
		let timeout_ms = self.cfg.recommend.request_timeout_ms;
		let result = match tokio::time::timeout(
			Duration::from_millis(timeout_ms),
			self.run_pipeline(req, request_id),
		)
		.await
		{
			Ok(result) => result,
			Err(_) => Err(Error::Timeout { timeout_ms }),
		};

		if let Err(err) = &result {
			tracing::debug!(
				request_id = %request_id,
				state = RequestState::Failed.as_str(),
				error_kind = err.kind().as_str(),
				error = %err,
				"Recommendation failed."
			);
		}

		result
	}

	async fn run_pipeline(
		&self,
		req: RecommendRequest,
		request_id: Uuid,
	) -> Result<RecommendResponse> {
		let started = Instant::now();

		if !self.ready() {
			return Err(Error::NotReady);
		}

		let Validated { query, k, filter } = self.validate_request(req)?;

		transition(request_id, RequestState::Received);

		let generation = self.store.generation();
		let cache_key = cache::build_recommend_cache_key(
			&query.normalized(),
			&filter.canonical(),
			k,
			generation,
			&self.cfg.providers.embedding.provider_id,
		)?;

		if let Some(result) = self.cache.get(&cache_key) {
			self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);

			tracing::debug!(
				request_id = %request_id,
				cache_key_prefix = cache::cache_key_prefix(&cache_key),
				"Recommendation cache hit."
			);
			transition(request_id, RequestState::Returned);

			return Ok(RecommendResponse {
				items: result.items,
				took_ms: elapsed_ms(started),
				cache_hit: true,
			});
		}

		self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

		let vector = match query {
			Query::Vector(vector) => vector,
			Query::Source(source) => self.embed_query(source).await?,
		};

		transition(request_id, RequestState::Embedded);

		let store = Arc::clone(&self.store);
		let result = tokio::task::spawn_blocking(move || {
			let candidates = store.query_candidates(&vector, k, &filter)?;

			transition(request_id, RequestState::Retrieved);

			Ok::<_, Error>(rank(&vector, &candidates, k, &filter, store.metric()))
		})
		.await
		.map_err(|err| Error::Storage { message: format!("Ranking task failed: {err}") })??;

		self.counters.rankings.fetch_add(1, Ordering::Relaxed);

		transition(request_id, RequestState::Ranked);

		// A write that landed mid-request may not be reflected; only cache what matches the key.
		if self.cache.is_enabled() && self.store.generation() == generation {
			self.cache.put(cache_key, result.clone());

			transition(request_id, RequestState::Cached);
		}

		transition(request_id, RequestState::Returned);

		Ok(RecommendResponse { items: result.items, took_ms: elapsed_ms(started), cache_hit: false })
	}

	fn validate_request(&self, req: RecommendRequest) -> Result<Validated> {
		let RecommendRequest { vector, record, keyword, k, filters } = req;
		let k = k.unwrap_or(self.cfg.recommend.default_k);

		if k == 0 {
			return Err(Error::invalid("k must be greater than zero."));
		}
		if k > self.cfg.recommend.max_k {
			return Err(Error::invalid(format!(
				"k must be at most {}.",
				self.cfg.recommend.max_k
			)));
		}

		let query = match (vector, record, keyword) {
			(Some(vector), None, None) => {
				item::validate_vector(&vector, self.store.dimension())?;

				Query::Vector(vector)
			},
			(None, Some(record), None) => {
				if record.item_id().is_empty() {
					return Err(Error::invalid("record.code must be non-empty."));
				}

				Query::Source(EmbedSource::Stock(record))
			},
			(None, None, Some(keyword)) => {
				let keyword = normalize_keyword(&keyword);

				if keyword.is_empty() {
					return Err(Error::invalid("keyword must be non-empty."));
				}

				Query::Source(EmbedSource::Text(keyword))
			},
			(None, None, None) => {
				return Err(Error::invalid("One of vector, record, or keyword is required."));
			},
			_ => {
				return Err(Error::invalid("Only one of vector, record, or keyword may be given."));
			},
		};

		Ok(Validated { query, k: k as usize, filter: filters })
	}

	async fn embed_query(&self, source: EmbedSource) -> Result<Vec<f32>> {
		let mut vectors = self.embed_sources(std::slice::from_ref(&source)).await?;

		vectors.pop().ok_or_else(|| Error::Embedding {
			message: "Embedding provider returned no vector.".to_string(),
		})
	}
}

fn normalize_keyword(raw: &str) -> String {
	raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn transition(request_id: Uuid, state: RequestState) {
	tracing::debug!(request_id = %request_id, state = state.as_str(), "Recommendation state.");
}

fn elapsed_ms(started: Instant) -> u64 {
	started.elapsed().as_millis() as u64
}
