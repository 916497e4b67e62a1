use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Metadata, MetadataValue, Result};

const MAX_PREDICATES: usize = 32;
const MAX_IN_LIST_ITEMS: usize = 128;

/// A single metadata predicate. A field missing from the metadata never matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
	Eq {
		field: String,
		value: MetadataValue,
	},
	/// Inclusive numeric bounds; at least one bound is required.
	Range {
		field: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		min: Option<f64>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		max: Option<f64>,
	},
	In {
		field: String,
		values: Vec<MetadataValue>,
	},
}
impl Predicate {
	pub fn field(&self) -> &str {
		match self {
			Self::Eq { field, .. } | Self::Range { field, .. } | Self::In { field, .. } => field,
		}
	}

	pub fn matches(&self, metadata: &Metadata) -> bool {
		let Some(actual) = metadata.get(self.field()) else {
			return false;
		};

		match self {
			Self::Eq { value, .. } => actual == value,
			Self::Range { min, max, .. } => {
				let Some(number) = actual.as_number() else {
					return false;
				};

				min.is_none_or(|min| number >= min) && max.is_none_or(|max| number <= max)
			},
			Self::In { values, .. } => values.iter().any(|value| value == actual),
		}
	}

	fn validate(&self) -> Result<()> {
		if self.field().trim().is_empty() {
			return Err(invalid("predicate field must be non-empty."));
		}

		match self {
			Self::Eq { value, .. } =>
				if !value.is_finite() {
					return Err(invalid("eq value must be a finite number."));
				},
			Self::Range { min, max, .. } => {
				if min.is_none() && max.is_none() {
					return Err(invalid("range requires min, max, or both."));
				}
				if min.is_some_and(|min| !min.is_finite()) || max.is_some_and(|max| !max.is_finite())
				{
					return Err(invalid("range bounds must be finite numbers."));
				}
				if let (Some(min), Some(max)) = (min, max)
					&& min > max
				{
					return Err(invalid("range min must not exceed max."));
				}
			},
			Self::In { values, .. } => {
				if values.is_empty() {
					return Err(invalid("in requires at least one value."));
				}
				if values.len() > MAX_IN_LIST_ITEMS {
					return Err(invalid(format!(
						"in list exceeds maximum size ({}/{MAX_IN_LIST_ITEMS}).",
						values.len()
					)));
				}
				if values.iter().any(|value| !value.is_finite()) {
					return Err(invalid("in values must be finite numbers."));
				}
			},
		}

		Ok(())
	}
}

/// Conjunction of predicates. Deserializes from either a predicate list or a plain
/// `field -> scalar` map, which means equality on every entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FilterRepr", into = "Vec<Predicate>")]
pub struct Filter {
	predicates: Vec<Predicate>,
}
impl Filter {
	pub fn new(predicates: Vec<Predicate>) -> Result<Self> {
		if predicates.len() > MAX_PREDICATES {
			return Err(invalid(format!(
				"filter exceeds maximum predicate count ({}/{MAX_PREDICATES}).",
				predicates.len()
			)));
		}

		for predicate in &predicates {
			predicate.validate()?;
		}

		Ok(Self { predicates })
	}

	pub fn equals(fields: BTreeMap<String, MetadataValue>) -> Result<Self> {
		Self::new(fields.into_iter().map(|(field, value)| Predicate::Eq { field, value }).collect())
	}

	pub fn is_empty(&self) -> bool {
		self.predicates.is_empty()
	}

	pub fn predicates(&self) -> &[Predicate] {
		&self.predicates
	}

	pub fn matches(&self, metadata: &Metadata) -> bool {
		self.predicates.iter().all(|predicate| predicate.matches(metadata))
	}

	/// Predicates in a stable order, so equivalent filters hash identically.
	pub fn canonical(&self) -> Vec<serde_json::Value> {
		let mut encoded: Vec<serde_json::Value> = self
			.predicates
			.iter()
			.filter_map(|predicate| serde_json::to_value(predicate).ok())
			.collect();

		encoded.sort_by_cached_key(|value| value.to_string());
		encoded.dedup();

		encoded
	}
}
impl From<Filter> for Vec<Predicate> {
	fn from(filter: Filter) -> Self {
		filter.predicates
	}
}
impl TryFrom<FilterRepr> for Filter {
	type Error = Error;

	fn try_from(repr: FilterRepr) -> Result<Self> {
		match repr {
			FilterRepr::Predicates(predicates) => Self::new(predicates),
			FilterRepr::Equals(fields) => Self::equals(fields),
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterRepr {
	Predicates(Vec<Predicate>),
	Equals(BTreeMap<String, MetadataValue>),
}

fn invalid(message: impl Into<String>) -> Error {
	Error::InvalidFilter { message: message.into() }
}
