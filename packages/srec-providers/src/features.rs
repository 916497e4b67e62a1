//! Embeds a stock record as its numeric feature profile, in a fixed field order.

use srec_domain::{EmbedSource, StockRecord};

use crate::{Error, Result};

pub fn embed(fields: &[String], sources: &[EmbedSource]) -> Result<Vec<Vec<f32>>> {
	sources
		.iter()
		.map(|source| match source {
			EmbedSource::Stock(record) => profile(fields, record),
			EmbedSource::Text(_) => Err(Error::UnsupportedSource {
				message: "The features provider embeds stock records only, not free text."
					.to_string(),
			}),
		})
		.collect()
}

fn profile(fields: &[String], record: &StockRecord) -> Result<Vec<f32>> {
	fields
		.iter()
		.map(|field| {
			record
				.features
				.get(field)
				.copied()
				.filter(|value| value.is_finite())
				.map(|value| value as f32)
				.ok_or_else(|| Error::MissingFeature {
					code: record.code.clone(),
					field: field.clone(),
				})
		})
		.collect()
}
