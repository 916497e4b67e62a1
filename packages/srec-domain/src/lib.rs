pub mod filter;
pub mod item;
pub mod metric;
pub mod ranking;

mod error;

pub use error::{Error, Result};
pub use filter::{Filter, Predicate};
pub use item::{EmbedSource, Item, Metadata, MetadataValue, NewsRecord, StockRecord};
pub use metric::Metric;
pub use ranking::{RankedItem, RecommendationResult, rank};
