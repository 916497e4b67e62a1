mod error;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A uniquely named scratch directory under the system temp dir, removed on drop.
pub struct TestDir {
	dir: TempDir,
}
impl TestDir {
	pub fn new(prefix: &str) -> Result<Self> {
		let dir = tempfile::Builder::new().prefix(&format!("{prefix}_")).tempdir().map_err(
			|err| Error::Message(format!("Failed to create test dir for {prefix:?}: {err}.")),
		)?;

		Ok(Self { dir })
	}

	pub fn path(&self) -> &Path {
		self.dir.path()
	}

	/// Path of a not-yet-created subdirectory, for exercising lazy creation.
	pub fn child(&self, name: &str) -> PathBuf {
		self.dir.path().join(name)
	}

	/// Removes the directory now and reports failures that drop would swallow.
	pub fn cleanup(self) -> Result<()> {
		Ok(self.dir.close()?)
	}
}
