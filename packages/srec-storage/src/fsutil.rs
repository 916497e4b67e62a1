use std::{
	fs::{self, File, OpenOptions},
	io::{ErrorKind, Write},
	path::Path,
};

use crate::{Error, Result};

/// Replaces `path` with `bytes` so readers see either the old or the new content.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
	let tmp = path.with_extension("tmp");
	let mut file = OpenOptions::new()
		.create(true)
		.write(true)
		.truncate(true)
		.open(&tmp)
		.map_err(Error::io(&tmp))?;

	file.write_all(bytes).map_err(Error::io(&tmp))?;
	file.sync_all().map_err(Error::io(&tmp))?;

	drop(file);

	fs::rename(&tmp, path).map_err(Error::io(path))?;

	sync_parent(path)
}

/// Flushes directory entries so a rename survives a crash.
pub(crate) fn sync_parent(path: &Path) -> Result<()> {
	let Some(parent) = path.parent() else {
		return Ok(());
	};

	#[cfg(unix)]
	File::open(parent).and_then(|dir| dir.sync_all()).map_err(Error::io(parent))?;
	#[cfg(not(unix))]
	let _ = parent;

	Ok(())
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
	match fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
		Err(err) => Err(Error::Io { path: path.to_path_buf(), source: err }),
	}
}
