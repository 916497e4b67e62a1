mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Bootstrap, Cache, Config, EmbeddingProviderConfig, Providers, Recommend, Service, Storage,
};

use std::{fs, path::Path};

const MAX_NEWS_PER_ITEM: u32 = 20;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse_at(&raw, path)
}

/// Parses, normalizes, and validates a config from an in-memory TOML document.
pub fn parse(raw: &str) -> Result<Config> {
	parse_at(raw, Path::new("<inline>"))
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.path.as_os_str().is_empty() {
		return Err(Error::Validation { message: "storage.path must be non-empty.".to_string() });
	}
	if cfg.storage.dimension == 0 {
		return Err(Error::Validation {
			message: "storage.dimension must be greater than zero.".to_string(),
		});
	}
	if !matches!(cfg.storage.metric.as_str(), "cosine" | "euclidean") {
		return Err(Error::Validation {
			message: "storage.metric must be one of cosine or euclidean.".to_string(),
		});
	}
	if cfg.storage.candidate_k == 0 {
		return Err(Error::Validation {
			message: "storage.candidate_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.storage.compact_dead_ratio.is_finite()
		|| !(0.0..=1.0).contains(&cfg.storage.compact_dead_ratio)
	{
		return Err(Error::Validation {
			message: "storage.compact_dead_ratio must be in the range 0.0-1.0.".to_string(),
		});
	}

	let embedding = &cfg.providers.embedding;

	if embedding.dimensions != cfg.storage.dimension {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.dimension.".to_string(),
		});
	}

	match embedding.provider_id.as_str() {
		"openai" => {
			for (label, value) in [
				("api_base", &embedding.api_base),
				("api_key", &embedding.api_key),
				("path", &embedding.path),
				("model", &embedding.model),
			] {
				if value.trim().is_empty() {
					return Err(Error::Validation {
						message: format!("providers.embedding.{label} must be non-empty."),
					});
				}
			}
			if embedding.timeout_ms == 0 {
				return Err(Error::Validation {
					message: "providers.embedding.timeout_ms must be greater than zero."
						.to_string(),
				});
			}
		},
		"hashing" => {},
		"features" =>
			if embedding.feature_fields.len() != embedding.dimensions as usize {
				return Err(Error::Validation {
					message: "providers.embedding.feature_fields must list exactly `dimensions` fields."
						.to_string(),
				});
			},
		_ => {
			return Err(Error::Validation {
				message: "providers.embedding.provider_id must be one of openai, hashing, or features."
					.to_string(),
			});
		},
	}

	if cfg.recommend.default_k == 0 {
		return Err(Error::Validation {
			message: "recommend.default_k must be greater than zero.".to_string(),
		});
	}
	if cfg.recommend.max_k < cfg.recommend.default_k {
		return Err(Error::Validation {
			message: "recommend.max_k must be at least recommend.default_k.".to_string(),
		});
	}
	if cfg.recommend.request_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "recommend.request_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.recommend.news_per_item > MAX_NEWS_PER_ITEM {
		return Err(Error::Validation {
			message: format!("recommend.news_per_item must be at most {MAX_NEWS_PER_ITEM}."),
		});
	}
	if cfg.cache.enabled {
		if cfg.cache.ttl_ms == 0 {
			return Err(Error::Validation {
				message: "cache.ttl_ms must be greater than zero when enabled.".to_string(),
			});
		}
		if cfg.cache.max_entries == 0 {
			return Err(Error::Validation {
				message: "cache.max_entries must be greater than zero when enabled.".to_string(),
			});
		}
	}
	if cfg.cache.sweep_interval_ms == 0 {
		return Err(Error::Validation {
			message: "cache.sweep_interval_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.storage.metric = cfg.storage.metric.trim().to_ascii_lowercase();
	cfg.providers.embedding.provider_id =
		cfg.providers.embedding.provider_id.trim().to_ascii_lowercase();

	for path in [&mut cfg.bootstrap.stock_data_path, &mut cfg.bootstrap.news_data_path] {
		if path.as_deref().is_some_and(|path| path.as_os_str().is_empty()) {
			*path = None;
		}
	}
}

fn parse_at(raw: &str, path: &Path) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}
