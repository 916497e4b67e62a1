//! Append-only record log.
//!
//! Each line is `<blake3 hex of payload>\t<json payload>\n`. A line whose checksum or payload
//! does not verify is skipped on replay; a trailing line without a newline is a torn write and
//! is cut off before new records are appended.

use std::{
	fs::{self, File, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use srec_domain::Item;

use crate::{Error, Result, fsutil};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum LogEntry {
	Upsert { item: Item },
	Delete { id: String },
}

#[derive(Debug, Default)]
pub(crate) struct ReplayReport {
	/// Complete lines seen, corrupt ones included.
	pub(crate) records: u64,
	pub(crate) corrupt: u64,
	/// Offset just past the last complete line.
	pub(crate) valid_len: u64,
}

pub(crate) struct RecordLog {
	path: PathBuf,
	file: File,
	len: u64,
}
impl RecordLog {
	pub(crate) fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new()
			.create(true)
			.read(true)
			.append(true)
			.open(path)
			.map_err(Error::io(path))?;
		let len = file.metadata().map_err(Error::io(path))?.len();

		Ok(Self { path: path.to_path_buf(), file, len })
	}

	pub(crate) fn len(&self) -> u64 {
		self.len
	}

	/// Appends the encoded lines and syncs them. On failure the file is cut back to its previous
	/// length so no partial line survives.
	pub(crate) fn append(&mut self, lines: &[Vec<u8>]) -> Result<()> {
		let buf: Vec<u8> = lines.concat();
		let written = self
			.file
			.write_all(&buf)
			.and_then(|()| self.file.sync_data())
			.map_err(Error::io(&self.path));

		if let Err(err) = written {
			if let Err(rollback) = self.file.set_len(self.len) {
				tracing::error!(
					path = ?self.path,
					error = %rollback,
					"Failed to roll back a partial record log append."
				);
			}

			return Err(err);
		}

		self.len += buf.len() as u64;

		Ok(())
	}

	/// Swaps in a read-only handle so the next append fails.
	#[cfg(test)]
	pub(crate) fn make_read_only(&mut self) -> Result<()> {
		self.file = File::open(&self.path).map_err(Error::io(&self.path))?;

		Ok(())
	}

	pub(crate) fn truncate(&mut self, len: u64) -> Result<()> {
		self.file.set_len(len).map_err(Error::io(&self.path))?;
		self.file.sync_data().map_err(Error::io(&self.path))?;
		self.len = len;

		Ok(())
	}

	/// Moves the fully written log at `staged` over `path` and returns a handle to it. The open
	/// handle follows the renamed file, so appends never land in an unlinked inode.
	pub(crate) fn replace(staged: &Path, path: &Path) -> Result<Self> {
		let mut log = Self::open(staged)?;

		fs::rename(staged, path).map_err(Error::io(path))?;
		fsutil::sync_parent(path)?;

		log.path = path.to_path_buf();

		Ok(log)
	}
}

pub(crate) fn encode(entry: &LogEntry) -> Result<Vec<u8>> {
	let payload = serde_json::to_vec(entry)?;
	let checksum = blake3::hash(&payload).to_hex();
	let mut line = Vec::with_capacity(checksum.len() + payload.len() + 2);

	line.extend_from_slice(checksum.as_bytes());
	line.push(b'\t');
	line.extend_from_slice(&payload);
	line.push(b'\n');

	Ok(line)
}

/// Feeds every verifiable entry of `raw` at or after `from` to `apply`, in log order. `path` only
/// labels warnings.
pub(crate) fn replay<F>(
	path: &Path,
	raw: &[u8],
	from: u64,
	dimension: usize,
	mut apply: F,
) -> ReplayReport
where
	F: FnMut(LogEntry),
{
	let start = usize::try_from(from).unwrap_or(usize::MAX).min(raw.len());
	let mut report = ReplayReport { valid_len: start as u64, ..Default::default() };
	let mut offset = start;

	while offset < raw.len() {
		let Some(end) = raw[offset..].iter().position(|byte| *byte == b'\n') else {
			tracing::warn!(
				path = ?path,
				offset,
				bytes = raw.len() - offset,
				"Discarding torn record at the end of the log."
			);

			break;
		};
		let line = &raw[offset..offset + end];

		report.records += 1;

		match decode(line, dimension) {
			Ok(entry) => apply(entry),
			Err(reason) => {
				report.corrupt += 1;

				tracing::warn!(path = ?path, offset, reason = %reason, "Skipping corrupt record.");
			},
		}

		offset += end + 1;
		report.valid_len = offset as u64;
	}

	report
}

/// Reads the whole log; a missing file reads as empty.
pub(crate) fn read_all(path: &Path) -> Result<Vec<u8>> {
	match fs::read(path) {
		Ok(raw) => Ok(raw),
		Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
		Err(err) => Err(Error::Io { path: path.to_path_buf(), source: err }),
	}
}

/// Writes a fresh log holding one upsert per item and returns the number of records.
pub(crate) fn write_compacted<'a, I>(path: &Path, items: I) -> Result<u64>
where
	I: IntoIterator<Item = &'a Item>,
{
	let mut file = OpenOptions::new()
		.create(true)
		.write(true)
		.truncate(true)
		.open(path)
		.map_err(Error::io(path))?;
	let mut records = 0;

	for item in items {
		let line = encode(&LogEntry::Upsert { item: item.clone() })?;

		file.write_all(&line).map_err(Error::io(path))?;

		records += 1;
	}

	file.sync_all().map_err(Error::io(path))?;

	Ok(records)
}

fn decode(line: &[u8], dimension: usize) -> Result<LogEntry, String> {
	let tab = line
		.iter()
		.position(|byte| *byte == b'\t')
		.ok_or_else(|| "missing checksum separator".to_string())?;
	let (checksum, payload) = (&line[..tab], &line[tab + 1..]);

	if blake3::hash(payload).to_hex().as_bytes() != checksum {
		return Err("checksum mismatch".to_string());
	}

	let entry: LogEntry =
		serde_json::from_slice(payload).map_err(|err| format!("undecodable payload: {err}"))?;

	if let LogEntry::Upsert { item } = &entry {
		item.validate(dimension).map_err(|err| format!("invalid item {:?}: {err}", item.id))?;
	}

	Ok(entry)
}
