use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub recommend: Recommend,
	pub cache: Cache,
	#[serde(default)]
	pub bootstrap: Bootstrap,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	/// Directory holding the manifest, the record log, and the index snapshot.
	pub path: PathBuf,
	pub dimension: u32,
	/// One of "cosine" or "euclidean". A store never mixes metrics.
	pub metric: String,
	/// Lower bound on the number of candidates retrieved per query.
	pub candidate_k: u32,
	#[serde(default = "default_compact_min_records")]
	pub compact_min_records: u64,
	#[serde(default = "default_compact_dead_ratio")]
	pub compact_dead_ratio: f32,
}

impl Storage {
	/// The news store lives in its own directory beside the stock store's files.
	pub fn news_path(&self) -> PathBuf {
		self.path.join("news")
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	/// One of "openai", "hashing", or "features".
	pub provider_id: String,
	pub dimensions: u32,
	#[serde(default)]
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	#[serde(default)]
	pub path: String,
	#[serde(default)]
	pub model: String,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	/// Ordered feature names read from a stock record by the "features" provider.
	#[serde(default)]
	pub feature_fields: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Recommend {
	pub default_k: u32,
	pub max_k: u32,
	pub request_timeout_ms: u64,
	/// News articles attached to each company row; zero disables the lookup.
	#[serde(default = "default_news_per_item")]
	pub news_per_item: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Cache {
	pub enabled: bool,
	pub ttl_ms: u64,
	pub max_entries: usize,
	#[serde(default = "default_sweep_interval_ms")]
	pub sweep_interval_ms: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Bootstrap {
	/// JSON array of stock records loaded into an empty store at startup.
	pub stock_data_path: Option<PathBuf>,
	/// JSON array of news articles loaded into an empty news store at startup.
	pub news_data_path: Option<PathBuf>,
}

fn default_news_per_item() -> u32 {
	3
}

fn default_compact_min_records() -> u64 {
	1_024
}

fn default_compact_dead_ratio() -> f32 {
	0.5
}

fn default_timeout_ms() -> u64 {
	10_000
}

fn default_sweep_interval_ms() -> u64 {
	60_000
}
