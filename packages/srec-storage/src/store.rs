//! Durable vector store with exact nearest-neighbour retrieval.
//!
//! Every mutation is appended to the record log and synced before it becomes visible in memory.
//! Reads share an `RwLock` over the in-memory index; writers serialize on a separate mutex that
//! owns the log, so a slow fsync never blocks queries.

use std::{
	collections::HashMap,
	fs,
	path::{Path, PathBuf},
	sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::Serialize;
use srec_domain::{Filter, Item, Metric, item, metric};

use crate::{
	Error, MANIFEST_FILE, RECORD_LOG_FILE, Result, SNAPSHOT_FILE, fsutil,
	log::{self, LogEntry, RecordLog},
	manifest::Manifest,
	snapshot::Snapshot,
};

const COMPACTION_FILE: &str = "records.log.compact";

#[derive(Clone, Debug, PartialEq)]
pub struct StoreOptions {
	/// Lower bound on how many candidates a query returns before ranking.
	pub candidate_k: usize,
	pub compact_min_records: u64,
	/// Fraction of superseded log records that triggers compaction.
	pub compact_dead_ratio: f64,
}
impl StoreOptions {
	fn validate(&self, dimension: usize) -> Result<()> {
		if dimension == 0 {
			return Err(Error::InvalidOptions {
				message: "dimension must be greater than zero.".to_string(),
			});
		}
		if self.candidate_k == 0 {
			return Err(Error::InvalidOptions {
				message: "candidate_k must be greater than zero.".to_string(),
			});
		}
		if !(0.0..=1.0).contains(&self.compact_dead_ratio) {
			return Err(Error::InvalidOptions {
				message: "compact_dead_ratio must be between 0.0 and 1.0.".to_string(),
			});
		}

		Ok(())
	}
}
impl Default for StoreOptions {
	fn default() -> Self {
		Self { candidate_k: 100, compact_min_records: 1_024, compact_dead_ratio: 0.5 }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
	Inserted,
	Updated,
	/// Vector and metadata already matched; nothing was written.
	Unchanged,
}
impl UpsertOutcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Inserted => "inserted",
			Self::Updated => "updated",
			Self::Unchanged => "unchanged",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
	Deleted,
	NotFound,
}
impl DeleteOutcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Deleted => "deleted",
			Self::NotFound => "not_found",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
	pub records_before: u64,
	pub records_after: u64,
	pub bytes_before: u64,
	pub bytes_after: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreStats {
	pub items: usize,
	pub generation: u64,
	pub log_records: u64,
	pub log_bytes: u64,
	/// Share of log records no longer reflected in the live set.
	pub dead_ratio: f64,
}

#[derive(Default)]
struct Index {
	items: HashMap<String, Arc<Item>>,
	generation: u64,
}
impl Index {
	fn apply(&mut self, entry: LogEntry) {
		match entry {
			LogEntry::Upsert { item } => {
				self.items.insert(item.id.clone(), Arc::new(item));
			},
			LogEntry::Delete { id } => {
				self.items.remove(&id);
			},
		}
	}

	fn sorted_items(&self) -> Vec<Item> {
		let mut items: Vec<Item> = self.items.values().map(|item| Item::clone(item)).collect();

		items.sort_by(|left, right| left.id.cmp(&right.id));

		items
	}
}

struct Writer {
	log: RecordLog,
	manifest: Manifest,
	log_records: u64,
}

pub struct VectorStore {
	root: PathBuf,
	dimension: usize,
	metric: Metric,
	options: StoreOptions,
	index: RwLock<Index>,
	writer: Mutex<Writer>,
}
impl VectorStore {
	pub fn open(path: impl AsRef<Path>, dimension: usize, metric: Metric) -> Result<Self> {
		Self::open_with_options(path, dimension, metric, StoreOptions::default())
	}

	/// Creates the store when `path` is empty or missing, otherwise loads it. A manifest that
	/// disagrees with `dimension` or `metric` fails the open.
	pub fn open_with_options(
		path: impl AsRef<Path>,
		dimension: usize,
		metric: Metric,
		options: StoreOptions,
	) -> Result<Self> {
		options.validate(dimension)?;

		let root = path.as_ref().to_path_buf();

		fs::create_dir_all(&root).map_err(Error::io(&root))?;

		let manifest_path = root.join(MANIFEST_FILE);
		let log_path = root.join(RECORD_LOG_FILE);
		let raw = log::read_all(&log_path)?;
		let manifest = match Manifest::load(&manifest_path)? {
			Some(manifest) => {
				manifest.ensure_matches(dimension, metric)?;

				manifest
			},
			None => {
				if !raw.is_empty() {
					return Err(Error::Corruption {
						message: format!("manifest is missing but {log_path:?} holds records."),
					});
				}

				let manifest = Manifest::new(dimension, metric);

				manifest.store(&manifest_path)?;

				manifest
			},
		};

		// Left behind when a compaction was interrupted; the live log is still authoritative.
		fsutil::remove_if_exists(&root.join(COMPACTION_FILE))?;

		let mut index = Index::default();
		let (from, base_records) =
			match Snapshot::load_valid(&root.join(SNAPSHOT_FILE), &manifest, &raw) {
				Some(snapshot) => {
					for item in snapshot.items {
						index.items.insert(item.id.clone(), Arc::new(item));
					}

					(snapshot.log_offset, snapshot.log_records)
				},
				None => (0, 0),
			};
		let report = log::replay(&log_path, &raw, from, dimension, |entry| index.apply(entry));
		let mut record_log = RecordLog::open(&log_path)?;

		if report.valid_len < record_log.len() {
			record_log.truncate(report.valid_len)?;
		}

		let log_records = base_records + report.records;

		tracing::info!(
			path = ?root,
			dimension,
			metric = %metric,
			items = index.items.len(),
			log_records,
			replayed = report.records,
			corrupt = report.corrupt,
			from_snapshot = from > 0,
			"Vector store opened."
		);

		Ok(Self {
			root,
			dimension,
			metric,
			options,
			index: RwLock::new(index),
			writer: Mutex::new(Writer { log: record_log, manifest, log_records }),
		})
	}

	pub fn path(&self) -> &Path {
		&self.root
	}

	pub fn dimension(&self) -> usize {
		self.dimension
	}

	pub fn metric(&self) -> Metric {
		self.metric
	}

	pub fn options(&self) -> &StoreOptions {
		&self.options
	}

	pub fn upsert(&self, item: Item) -> Result<UpsertOutcome> {
		let outcomes = self.upsert_batch(vec![item])?;

		Ok(outcomes.into_iter().next().unwrap_or(UpsertOutcome::Unchanged))
	}

	/// Upserts `items` with a single log sync. The whole batch is validated first; a rejected
	/// item leaves the store untouched. A repeated id within the batch applies in order.
	pub fn upsert_batch(&self, items: Vec<Item>) -> Result<Vec<UpsertOutcome>> {
		for item in &items {
			item.validate(self.dimension)?;
		}

		let mut writer = self.lock_writer();
		let mut outcomes = Vec::with_capacity(items.len());
		let mut lines = Vec::new();
		let mut pending: Vec<Item> = Vec::new();

		{
			let index = self.read_index();
			let mut staged: HashMap<String, usize> = HashMap::new();

			for item in items {
				let current = staged
					.get(&item.id)
					.map(|idx| &pending[*idx])
					.or_else(|| index.items.get(&item.id).map(Arc::as_ref));
				let outcome = match current {
					Some(existing) if existing.same_content(&item) => UpsertOutcome::Unchanged,
					Some(_) => UpsertOutcome::Updated,
					None => UpsertOutcome::Inserted,
				};

				outcomes.push(outcome);

				if outcome == UpsertOutcome::Unchanged {
					continue;
				}

				lines.push(log::encode(&LogEntry::Upsert { item: item.clone() })?);
				staged.insert(item.id.clone(), pending.len());
				pending.push(item);
			}
		}

		if lines.is_empty() {
			return Ok(outcomes);
		}

		writer.log.append(&lines)?;
		writer.log_records += lines.len() as u64;

		let mut index = self.write_index();

		for item in pending {
			index.items.insert(item.id.clone(), Arc::new(item));
			index.generation += 1;
		}

		tracing::debug!(written = lines.len(), generation = index.generation, "Items upserted.");

		Ok(outcomes)
	}

	/// Removes `id`. An absent id is reported, not treated as an error.
	pub fn delete(&self, id: &str) -> Result<DeleteOutcome> {
		let mut writer = self.lock_writer();

		if !self.read_index().items.contains_key(id) {
			return Ok(DeleteOutcome::NotFound);
		}

		let line = log::encode(&LogEntry::Delete { id: id.to_string() })?;

		writer.log.append(&[line])?;
		writer.log_records += 1;

		let mut index = self.write_index();

		index.items.remove(id);
		index.generation += 1;

		tracing::debug!(id, generation = index.generation, "Item deleted.");

		Ok(DeleteOutcome::Deleted)
	}

	pub fn get(&self, id: &str) -> Option<Arc<Item>> {
		self.read_index().items.get(id).cloned()
	}

	pub fn len(&self) -> usize {
		self.read_index().items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Count of mutations applied since open. Any change to the live set bumps it.
	pub fn generation(&self) -> u64 {
		self.read_index().generation
	}

	/// Returns up to `max(k, candidate_k)` items passing `filter`, closest first. The scan is
	/// exhaustive, so the true top `k` is always included.
	pub fn query_candidates(
		&self,
		vector: &[f32],
		k: usize,
		filter: &Filter,
	) -> Result<Vec<Arc<Item>>> {
		item::validate_vector(vector, self.dimension)?;

		let limit = k.max(self.options.candidate_k);
		let index = self.read_index();
		let mut scored: Vec<(f32, &Arc<Item>)> = index
			.items
			.values()
			.filter(|item| filter.matches(&item.metadata))
			.map(|item| (self.metric.score(vector, &item.vector), item))
			.collect();
		let order = |left: &(f32, &Arc<Item>), right: &(f32, &Arc<Item>)| {
			metric::cmp_ranked(left.0, &left.1.id, right.0, &right.1.id)
		};

		if scored.len() > limit {
			scored.select_nth_unstable_by(limit, order);
			scored.truncate(limit);
		}

		scored.sort_by(order);

		Ok(scored.into_iter().map(|(_, item)| Arc::clone(item)).collect())
	}

	/// Every item passing `filter`, ordered by id. Used for lookups keyed on metadata rather than
	/// similarity.
	pub fn matching(&self, filter: &Filter) -> Vec<Arc<Item>> {
		let index = self.read_index();
		let mut items: Vec<Arc<Item>> =
			index.items.values().filter(|item| filter.matches(&item.metadata)).cloned().collect();

		items.sort_by(|left, right| left.id.cmp(&right.id));

		items
	}

	pub fn stats(&self) -> StoreStats {
		let writer = self.lock_writer();
		let index = self.read_index();

		StoreStats {
			items: index.items.len(),
			generation: index.generation,
			log_records: writer.log_records,
			log_bytes: writer.log.len(),
			dead_ratio: dead_ratio(index.items.len(), writer.log_records),
		}
	}

	/// Rewrites the record log to hold one upsert per live item.
	pub fn compact(&self) -> Result<CompactionReport> {
		let mut writer = self.lock_writer();
		let items = self.read_index().sorted_items();
		let records_before = writer.log_records;
		let bytes_before = writer.log.len();
		let staged = self.root.join(COMPACTION_FILE);
		let log_path = self.root.join(RECORD_LOG_FILE);
		let records_after = log::write_compacted(&staged, &items)?;
		let mut manifest = writer.manifest.clone();

		// The epoch moves first so a snapshot taken against the old log can never be applied to
		// the new one.
		manifest.log_epoch += 1;
		manifest.store(&self.root.join(MANIFEST_FILE))?;

		writer.manifest = manifest;
		writer.log = RecordLog::replace(&staged, &log_path)?;
		writer.log_records = records_after;

		let report = CompactionReport {
			records_before,
			records_after,
			bytes_before,
			bytes_after: writer.log.len(),
		};

		if let Err(err) = self.write_snapshot(&writer, items) {
			tracing::warn!(error = %err, "Failed to write index snapshot after compaction.");
		}

		tracing::info!(
			path = ?self.root,
			records_before = report.records_before,
			records_after = report.records_after,
			bytes_before = report.bytes_before,
			bytes_after = report.bytes_after,
			"Record log compacted."
		);

		Ok(report)
	}

	/// Compacts when the log is large enough and mostly superseded records.
	pub fn maybe_compact(&self) -> Result<Option<CompactionReport>> {
		let stats = self.stats();

		if stats.log_records < self.options.compact_min_records
			|| stats.dead_ratio < self.options.compact_dead_ratio
		{
			return Ok(None);
		}

		self.compact().map(Some)
	}

	/// Writes the rebuildable snapshot so the next open only replays newer records.
	pub fn checkpoint(&self) -> Result<()> {
		let writer = self.lock_writer();
		let items = self.read_index().sorted_items();

		self.write_snapshot(&writer, items)?;

		tracing::debug!(path = ?self.root, log_records = writer.log_records, "Index checkpointed.");

		Ok(())
	}

	pub fn close(self) -> Result<()> {
		self.checkpoint()
	}

	fn write_snapshot(&self, writer: &Writer, items: Vec<Item>) -> Result<()> {
		Snapshot::new(&writer.manifest, writer.log.len(), writer.log_records, items)
			.store(&self.root.join(SNAPSHOT_FILE))
	}

	fn read_index(&self) -> RwLockReadGuard<'_, Index> {
		self.index.read().unwrap_or_else(|err| err.into_inner())
	}

	fn write_index(&self) -> RwLockWriteGuard<'_, Index> {
		self.index.write().unwrap_or_else(|err| err.into_inner())
	}

	fn lock_writer(&self) -> MutexGuard<'_, Writer> {
		self.writer.lock().unwrap_or_else(|err| err.into_inner())
	}
}

fn dead_ratio(live: usize, log_records: u64) -> f64 {
	if log_records == 0 {
		return 0.0;
	}

	log_records.saturating_sub(live as u64) as f64 / log_records as f64
}
