use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Vector has {actual} dimensions, expected {expected}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Embedding error: {message}")]
	Embedding { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Request exceeded its {timeout_ms} ms budget.")]
	Timeout { timeout_ms: u64 },
	#[error("Service is not ready.")]
	NotReady,
	#[error("Storage corruption: {message}")]
	StorageCorruption { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
			Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
			Self::Embedding { .. } => ErrorKind::EmbeddingError,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::Timeout { .. } => ErrorKind::Timeout,
			Self::NotReady => ErrorKind::NotReady,
			Self::StorageCorruption { .. } => ErrorKind::StorageCorruption,
			Self::Storage { .. } => ErrorKind::Storage,
		}
	}

	pub(crate) fn invalid(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}
}
impl From<srec_domain::Error> for Error {
	fn from(err: srec_domain::Error) -> Self {
		match err {
			srec_domain::Error::DimensionMismatch { expected, actual } =>
				Self::DimensionMismatch { expected, actual },
			other => Self::InvalidRequest { message: other.to_string() },
		}
	}
}
impl From<srec_storage::Error> for Error {
	fn from(err: srec_storage::Error) -> Self {
		match err {
			srec_storage::Error::InvalidItem(inner) => inner.into(),
			srec_storage::Error::Corruption { message } => Self::StorageCorruption { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
impl From<srec_providers::Error> for Error {
	fn from(err: srec_providers::Error) -> Self {
		Self::Embedding { message: err.to_string() }
	}
}

/// Stable, machine-readable failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	DimensionMismatch,
	InvalidRequest,
	EmbeddingError,
	NotFound,
	Timeout,
	NotReady,
	StorageCorruption,
	Storage,
}
impl ErrorKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::DimensionMismatch => "dimension_mismatch",
			Self::InvalidRequest => "invalid_request",
			Self::EmbeddingError => "embedding_error",
			Self::NotFound => "not_found",
			Self::Timeout => "timeout",
			Self::NotReady => "not_ready",
			Self::StorageCorruption => "storage_corruption",
			Self::Storage => "storage",
		}
	}
}
