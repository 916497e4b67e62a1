use std::{fs, io::ErrorKind, path::Path};

use serde::{Deserialize, Serialize};
use srec_domain::Metric;

use crate::{Error, Result, fsutil};

pub(crate) const FORMAT_VERSION: u32 = 1;

/// Durable description of a store. A mismatch against the caller's expectations is fatal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Manifest {
	pub(crate) format_version: u32,
	pub(crate) dimension: usize,
	pub(crate) metric: Metric,
	/// Bumped by every compaction; snapshots from an older epoch are discarded.
	pub(crate) log_epoch: u64,
}
impl Manifest {
	pub(crate) fn new(dimension: usize, metric: Metric) -> Self {
		Self { format_version: FORMAT_VERSION, dimension, metric, log_epoch: 0 }
	}

	pub(crate) fn load(path: &Path) -> Result<Option<Self>> {
		let raw = match fs::read(path) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(Error::Io { path: path.to_path_buf(), source: err }),
		};
		let manifest: Self = serde_json::from_slice(&raw).map_err(|err| Error::Corruption {
			message: format!("manifest at {path:?} is unreadable: {err}"),
		})?;

		if manifest.format_version != FORMAT_VERSION {
			return Err(Error::Corruption {
				message: format!(
					"manifest format version {} is not supported (expected {FORMAT_VERSION}).",
					manifest.format_version
				),
			});
		}

		Ok(Some(manifest))
	}

	pub(crate) fn store(&self, path: &Path) -> Result<()> {
		let raw = serde_json::to_vec_pretty(self)?;

		fsutil::atomic_write(path, &raw)
	}

	pub(crate) fn ensure_matches(&self, dimension: usize, metric: Metric) -> Result<()> {
		if self.dimension != dimension {
			return Err(Error::Corruption {
				message: format!(
					"store was created with dimension {}, opened with {dimension}.",
					self.dimension
				),
			});
		}
		if self.metric != metric {
			return Err(Error::Corruption {
				message: format!("store was created with metric {}, opened with {metric}.", self.metric),
			});
		}

		Ok(())
	}
}
