pub mod embedding;
pub mod features;
pub mod hashing;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};
use srec_config::EmbeddingProviderConfig;
use srec_domain::EmbedSource;

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Embeds `sources` with the backend named by `cfg.provider_id`, one vector per source in input
/// order.
pub async fn embed(
	cfg: &EmbeddingProviderConfig,
	sources: &[EmbedSource],
) -> Result<Vec<Vec<f32>>> {
	if sources.is_empty() {
		return Ok(Vec::new());
	}

	match cfg.provider_id.as_str() {
		"openai" => {
			let texts: Vec<String> = sources.iter().map(EmbedSource::text).collect();

			embedding::embed(cfg, &texts).await
		},
		"hashing" => Ok(hashing::embed(sources, cfg.dimensions as usize)),
		"features" => features::embed(&cfg.feature_fields, sources),
		other => Err(Error::InvalidConfig {
			message: format!("Unknown embedding provider '{other}'."),
		}),
	}
}
