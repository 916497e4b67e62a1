use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, Result};

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Scalar metadata attached to an item. Serialized as a plain JSON scalar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
	Bool(bool),
	Number(f64),
	String(String),
}
impl MetadataValue {
	pub fn as_number(&self) -> Option<f64> {
		match self {
			Self::Number(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(value) => Some(value),
			_ => None,
		}
	}

	pub fn is_finite(&self) -> bool {
		self.as_number().is_none_or(f64::is_finite)
	}
}
impl From<&str> for MetadataValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}
impl From<String> for MetadataValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}
impl From<f64> for MetadataValue {
	fn from(value: f64) -> Self {
		Self::Number(value)
	}
}
impl From<bool> for MetadataValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
	pub id: String,
	pub vector: Vec<f32>,
	#[serde(default)]
	pub metadata: Metadata,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl Item {
	pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Metadata) -> Self {
		Self { id: id.into(), vector, metadata, updated_at: OffsetDateTime::now_utc() }
	}

	/// Checks the id, the vector length against `dimension`, and that every component and
	/// numeric metadata value is finite.
	pub fn validate(&self, dimension: usize) -> Result<()> {
		if self.id.trim().is_empty() {
			return Err(Error::EmptyId);
		}

		validate_vector(&self.vector, dimension)?;

		if let Some((key, _)) = self.metadata.iter().find(|(_, value)| !value.is_finite()) {
			return Err(Error::NonFiniteMetadata { field: key.clone() });
		}

		Ok(())
	}

	/// True when vector and metadata match; `updated_at` is ignored.
	pub fn same_content(&self, other: &Self) -> bool {
		self.id == other.id && self.vector == other.vector && self.metadata == other.metadata
	}
}

pub fn validate_vector(vector: &[f32], dimension: usize) -> Result<()> {
	if vector.len() != dimension {
		return Err(Error::DimensionMismatch { expected: dimension, actual: vector.len() });
	}
	if let Some(index) = vector.iter().position(|value| !value.is_finite()) {
		return Err(Error::NonFiniteVector { index });
	}

	Ok(())
}

/// A listed company as it appears in the stock dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
	pub code: String,
	pub name: String,
	#[serde(default)]
	pub market: String,
	#[serde(default)]
	pub industry: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub comments: Vec<String>,
	#[serde(default)]
	pub tags: Vec<String>,
	/// Numeric profile used by feature-based embedding.
	#[serde(default)]
	pub features: BTreeMap<String, f64>,
}
impl StockRecord {
	pub fn item_id(&self) -> &str {
		self.code.trim()
	}

	pub fn embedding_text(&self) -> String {
		format!(
			"name: {}\nindustry: {}\ndescription: {}\ndetails: {}\nkeywords: {}",
			self.name,
			self.industry,
			self.description,
			self.comments.join(" "),
			self.tags.join(", "),
		)
		.trim()
		.to_string()
	}

	pub fn metadata(&self) -> Metadata {
		let mut metadata = Metadata::new();

		metadata.insert("market".to_string(), self.market.clone().into());
		metadata.insert("code".to_string(), self.code.clone().into());
		metadata.insert("name".to_string(), self.name.clone().into());
		metadata.insert("industry".to_string(), self.industry.clone().into());
		metadata.insert("description".to_string(), self.description.clone().into());

		metadata
	}
}

/// A news article tied to one stock code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRecord {
	pub code: String,
	pub title: String,
	#[serde(default)]
	pub content: String,
	#[serde(default)]
	pub link: String,
	#[serde(default)]
	pub published_date: String,
}
impl NewsRecord {
	const FIELDS: [&'static str; 5] = ["code", "title", "content", "link", "published_date"];

	/// Stable identity: the link when present, otherwise date and title, scoped by stock code.
	pub fn item_id(&self) -> String {
		let code = self.code.trim();
		let link = self.link.trim();

		if link.is_empty() {
			format!("{code}:{}:{}", self.published_date.trim(), self.title.trim())
		} else {
			format!("{code}:{link}")
		}
	}

	pub fn embedding_text(&self) -> String {
		format!("title: {}\ncontent: {}", self.title, self.content).trim().to_string()
	}

	pub fn metadata(&self) -> Metadata {
		let values = [&self.code, &self.title, &self.content, &self.link, &self.published_date];

		Self::FIELDS
			.iter()
			.zip(values)
			.map(|(field, value)| (field.to_string(), value.trim().into()))
			.collect()
	}

	/// Rebuilds the article from stored metadata; `None` when a field is missing or not text.
	pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
		let field = |key: &str| metadata.get(key).and_then(MetadataValue::as_str).map(String::from);

		Some(Self {
			code: field("code")?,
			title: field("title")?,
			content: field("content")?,
			link: field("link")?,
			published_date: field("published_date")?,
		})
	}
}

/// Raw input handed to an embedding provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedSource {
	Stock(StockRecord),
	Text(String),
}
impl EmbedSource {
	pub fn text(&self) -> String {
		match self {
			Self::Stock(record) => record.embedding_text(),
			Self::Text(text) => text.clone(),
		}
	}
}
