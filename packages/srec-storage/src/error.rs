use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("I/O failure at {path:?}: {source}")]
	Io { path: PathBuf, source: std::io::Error },
	#[error(transparent)]
	InvalidItem(#[from] srec_domain::Error),
	#[error("Invalid store options: {message}")]
	InvalidOptions { message: String },
	#[error("Storage corruption: {message}")]
	Corruption { message: String },
	#[error("Failed to encode record: {0}")]
	Encode(#[from] serde_json::Error),
}
impl Error {
	pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
		let path = path.into();

		move |source| Self::Io { path, source }
	}
}
