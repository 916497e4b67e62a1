pub mod store;

mod error;
mod fsutil;
mod log;
mod manifest;
mod snapshot;

pub use error::Error;
pub use store::{
	CompactionReport, DeleteOutcome, StoreOptions, StoreStats, UpsertOutcome, VectorStore,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const RECORD_LOG_FILE: &str = "records.log";
pub const SNAPSHOT_FILE: &str = "index.snapshot.json";
