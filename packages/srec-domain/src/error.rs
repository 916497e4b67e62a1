pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("Vector has {actual} dimensions, expected {expected}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Vector component {index} is not a finite number.")]
	NonFiniteVector { index: usize },
	#[error("Metadata field '{field}' must be a finite number.")]
	NonFiniteMetadata { field: String },
	#[error("Item id must be non-empty.")]
	EmptyId,
	#[error("Invalid filter: {message}")]
	InvalidFilter { message: String },
	#[error("Unknown metric '{0}', expected cosine or euclidean.")]
	UnknownMetric(String),
}
