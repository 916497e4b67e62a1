//! Short-lived memo of recommendation results.
//!
//! Entries expire after their TTL and are dropped lazily on read or by [`ResultCache::sweep`].
//! When full, the least recently used entry is evicted before a new one is admitted. Entries are
//! disposable: keys embed the store generation, so a mutation makes older entries unreachable.

use std::{
	num::NonZeroUsize,
	sync::{Mutex, MutexGuard},
	time::{Duration, Instant},
};

use lru::LruCache;
use serde_json::Value;
use srec_domain::RecommendationResult;

use crate::{Error, Result};

const RECOMMEND_CACHE_SCHEMA_VERSION: i32 = 1;

pub fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

/// Key for a recommendation: the normalized query, canonical filters, `k`, and the store
/// generation the result was computed against.
pub fn build_recommend_cache_key(
	query: &Value,
	filters: &[Value],
	k: usize,
	generation: u64,
	provider_id: &str,
) -> Result<String> {
	let payload = serde_json::json!({
		"kind": "recommend",
		"schema_version": RECOMMEND_CACHE_SCHEMA_VERSION,
		"query": query,
		"filters": filters,
		"k": k,
		"generation": generation,
		"provider_id": provider_id,
	});

	hash_cache_key(&payload)
}

struct Entry {
	result: RecommendationResult,
	expires_at: Instant,
}
impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at <= now
	}
}

pub struct ResultCache {
	enabled: bool,
	ttl: Duration,
	entries: Option<Mutex<LruCache<String, Entry>>>,
}
impl ResultCache {
	/// A zero `max_entries` behaves like a disabled cache.
	pub fn new(enabled: bool, ttl: Duration, max_entries: usize) -> Self {
		let entries = NonZeroUsize::new(max_entries)
			.filter(|_| enabled)
			.map(|capacity| Mutex::new(LruCache::new(capacity)));

		Self { enabled, ttl, entries }
	}

	pub fn from_config(cfg: &srec_config::Cache) -> Self {
		Self::new(cfg.enabled, Duration::from_millis(cfg.ttl_ms), cfg.max_entries)
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled && self.entries.is_some()
	}

	pub fn get(&self, key: &str) -> Option<RecommendationResult> {
		self.get_at(key, Instant::now())
	}

	pub fn get_at(&self, key: &str, now: Instant) -> Option<RecommendationResult> {
		let mut entries = self.lock()?;
		let entry = entries.get(key)?;

		if entry.is_expired(now) {
			entries.pop(key);

			return None;
		}

		Some(entry.result.clone())
	}

	pub fn put(&self, key: String, result: RecommendationResult) {
		self.put_at(key, result, self.ttl, Instant::now());
	}

	/// Admits an entry, evicting the least recently used one when the cache is full.
	pub fn put_at(&self, key: String, result: RecommendationResult, ttl: Duration, now: Instant) {
		if let Some(mut entries) = self.lock() {
			entries.put(key, Entry { result, expires_at: now + ttl });
		}
	}

	/// Drops every expired entry and returns how many were removed.
	pub fn sweep(&self) -> usize {
		self.sweep_at(Instant::now())
	}

	pub fn sweep_at(&self, now: Instant) -> usize {
		let Some(mut entries) = self.lock() else {
			return 0;
		};
		let expired: Vec<String> = entries
			.iter()
			.filter(|(_, entry)| entry.is_expired(now))
			.map(|(key, _)| key.clone())
			.collect();

		for key in &expired {
			entries.pop(key);
		}

		expired.len()
	}

	pub fn len(&self) -> usize {
		self.lock().map_or(0, |entries| entries.len())
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> Option<MutexGuard<'_, LruCache<String, Entry>>> {
		self.entries.as_ref().map(|entries| entries.lock().unwrap_or_else(|err| err.into_inner()))
	}
}
