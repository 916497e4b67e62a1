pub mod bootstrap;
pub mod cache;
pub mod items;
pub mod recommend;

mod error;

pub use bootstrap::{BootstrapReport, StartupReport};
pub use cache::ResultCache;
pub use error::{Error, ErrorKind, Result};
pub use items::{
	DeleteItemResponse, UpsertItemRequest, UpsertItemResponse, UpsertSummary,
};
pub use recommend::{RecommendRequest, RecommendResponse};

use std::{
	future::Future,
	path::Path,
	pin::Pin,
	str::FromStr,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
};

use serde::Serialize;
use srec_config::{Config, EmbeddingProviderConfig};
use srec_domain::{EmbedSource, Metric};
use srec_storage::{CompactionReport, StoreOptions, StoreStats, VectorStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		sources: &'a [EmbedSource],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

/// The stock store ranked by recommendations and the news store looked up by stock code.
#[derive(Clone)]
pub struct Stores {
	pub stocks: Arc<VectorStore>,
	pub news: Arc<VectorStore>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceStats {
	pub cache_hits: u64,
	pub cache_misses: u64,
	pub rankings: u64,
	pub embeddings: u64,
	pub cache_entries: usize,
	pub store: StoreStats,
	pub news: StoreStats,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MaintenanceReport {
	pub cache_swept: usize,
	pub compaction: Option<CompactionReport>,
	pub news_compaction: Option<CompactionReport>,
}

pub struct RecommendService {
	pub cfg: Config,
	store: Arc<VectorStore>,
	news: Arc<VectorStore>,
	cache: ResultCache,
	providers: Providers,
	counters: Counters,
	ready: AtomicBool,
}
impl RecommendService {
	pub fn new(cfg: Config, stores: Stores) -> Self {
		Self::with_providers(cfg, stores, Providers::default())
	}

	pub fn with_providers(cfg: Config, stores: Stores, providers: Providers) -> Self {
		let cache = ResultCache::from_config(&cfg.cache);

		Self {
			cfg,
			store: stores.stocks,
			news: stores.news,
			cache,
			providers,
			counters: Counters::default(),
			ready: AtomicBool::new(false),
		}
	}

	pub fn store(&self) -> &Arc<VectorStore> {
		&self.store
	}

	pub fn news_store(&self) -> &Arc<VectorStore> {
		&self.news
	}

	/// True once the store is loaded and startup bootstrap has finished.
	pub fn ready(&self) -> bool {
		self.ready.load(Ordering::Acquire)
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Release);
	}

	pub fn stats(&self) -> ServiceStats {
		ServiceStats {
			cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
			cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
			rankings: self.counters.rankings.load(Ordering::Relaxed),
			embeddings: self.counters.embeddings.load(Ordering::Relaxed),
			cache_entries: self.cache.len(),
			store: self.store.stats(),
			news: self.news.stats(),
		}
	}

	/// Sweeps expired cache entries and compacts the record log when it is mostly dead records.
	pub async fn maintain(&self) -> Result<MaintenanceReport> {
		let cache_swept = self.cache.sweep();
		let compaction = self.with_store(|store| store.maybe_compact()).await?;
		let news_compaction = self.with_news_store(|store| store.maybe_compact()).await?;

		if cache_swept > 0 || compaction.is_some() || news_compaction.is_some() {
			tracing::info!(
				cache_swept,
				compacted = compaction.is_some(),
				news_compacted = news_compaction.is_some(),
				"Maintenance ran."
			);
		}

		Ok(MaintenanceReport { cache_swept, compaction, news_compaction })
	}

	/// Persists both index snapshots so the next start replays only newer records.
	pub async fn checkpoint(&self) -> Result<()> {
		self.with_store(|store| store.checkpoint()).await?;
		self.with_news_store(|store| store.checkpoint()).await
	}

	/// Embeds through the configured provider and checks every vector against the store shape.
	pub(crate) async fn embed_sources(&self, sources: &[EmbedSource]) -> Result<Vec<Vec<f32>>> {
		let vectors = self.providers.embedding.embed(&self.cfg.providers.embedding, sources).await?;

		self.counters.embeddings.fetch_add(sources.len() as u64, Ordering::Relaxed);

		if vectors.len() != sources.len() {
			return Err(Error::Embedding {
				message: format!(
					"Provider returned {} vectors for {} inputs.",
					vectors.len(),
					sources.len()
				),
			});
		}

		let dimension = self.store.dimension();

		for vector in &vectors {
			if vector.len() != dimension {
				return Err(Error::DimensionMismatch { expected: dimension, actual: vector.len() });
			}
			if vector.iter().any(|value| !value.is_finite()) {
				return Err(Error::Embedding {
					message: "Provider returned a non-finite component.".to_string(),
				});
			}
		}

		Ok(vectors)
	}
}

#[derive(Default)]
struct Counters {
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
	rankings: AtomicU64,
	embeddings: AtomicU64,
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		sources: &'a [EmbedSource],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(srec_providers::embed(cfg, sources).await?) })
	}
}

pub fn store_options(cfg: &Config) -> StoreOptions {
	StoreOptions {
		candidate_k: cfg.storage.candidate_k as usize,
		compact_min_records: cfg.storage.compact_min_records,
		compact_dead_ratio: f64::from(cfg.storage.compact_dead_ratio),
	}
}

/// Opens or creates the stock and news stores described by `cfg.storage`. Both share the
/// configured dimension and metric. Blocking.
pub fn open_stores(cfg: &Config) -> Result<Stores> {
	let metric = Metric::from_str(&cfg.storage.metric)?;
	let open = |path: &Path| {
		VectorStore::open_with_options(
			path,
			cfg.storage.dimension as usize,
			metric,
			store_options(cfg),
		)
	};
	let stocks = open(&cfg.storage.path)?;
	let news = open(&cfg.storage.news_path())?;

	Ok(Stores { stocks: Arc::new(stocks), news: Arc::new(news) })
}
