//! Rebuildable checkpoint of the in-memory index.
//!
//! The snapshot records the log epoch and byte offset it reflects, so opening a store loads it
//! and replays only the log tail. Any doubt about the snapshot falls back to a full replay.

use std::{fs, io::ErrorKind, path::Path};

use serde::{Deserialize, Serialize};
use srec_domain::{Item, Metric};

use crate::{Result, fsutil, manifest::Manifest};

const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Snapshot {
	schema_version: u32,
	pub(crate) dimension: usize,
	pub(crate) metric: Metric,
	pub(crate) log_epoch: u64,
	pub(crate) log_offset: u64,
	pub(crate) log_records: u64,
	pub(crate) items: Vec<Item>,
}
impl Snapshot {
	pub(crate) fn new(
		manifest: &Manifest,
		log_offset: u64,
		log_records: u64,
		items: Vec<Item>,
	) -> Self {
		Self {
			schema_version: SNAPSHOT_SCHEMA_VERSION,
			dimension: manifest.dimension,
			metric: manifest.metric,
			log_epoch: manifest.log_epoch,
			log_offset,
			log_records,
			items,
		}
	}

	pub(crate) fn store(&self, path: &Path) -> Result<()> {
		let raw = serde_json::to_vec(self)?;

		fsutil::atomic_write(path, &raw)
	}

	/// Returns the snapshot when it still describes `manifest` and a prefix of `log`.
	pub(crate) fn load_valid(path: &Path, manifest: &Manifest, log: &[u8]) -> Option<Self> {
		let raw = match fs::read(path) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return None,
			Err(err) => {
				tracing::warn!(path = ?path, error = %err, "Index snapshot is unreadable.");

				return None;
			},
		};
		let snapshot: Self = match serde_json::from_slice(&raw) {
			Ok(snapshot) => snapshot,
			Err(err) => {
				tracing::warn!(path = ?path, error = %err, "Index snapshot is corrupt; rebuilding.");

				return None;
			},
		};

		if let Err(reason) = snapshot.check(manifest, log) {
			tracing::info!(path = ?path, reason, "Index snapshot is stale; rebuilding.");

			return None;
		}

		Some(snapshot)
	}

	fn check(&self, manifest: &Manifest, log: &[u8]) -> Result<(), &'static str> {
		if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
			return Err("schema version changed");
		}
		if self.dimension != manifest.dimension || self.metric != manifest.metric {
			return Err("dimension or metric changed");
		}
		if self.log_epoch != manifest.log_epoch {
			return Err("log was compacted");
		}

		let Ok(offset) = usize::try_from(self.log_offset) else {
			return Err("log offset out of range");
		};

		if offset > log.len() {
			return Err("log is shorter than the snapshot offset");
		}
		if offset > 0 && log[offset - 1] != b'\n' {
			return Err("snapshot offset is not on a record boundary");
		}
		if self.items.iter().any(|item| item.validate(self.dimension).is_err()) {
			return Err("snapshot holds an invalid item");
		}

		Ok(())
	}
}
