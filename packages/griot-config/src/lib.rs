mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, Corpus, EmbeddingProviderConfig, LlmProviderConfig, Pipeline, Providers, Qdrant,
	Redis, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.redis.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.redis.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.pipeline.top_k == 0 {
		return Err(Error::Validation {
			message: "pipeline.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.max_context_budget == 0 {
		return Err(Error::Validation {
			message: "pipeline.max_context_budget must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.lock_lease_ms == 0 {
		return Err(Error::Validation {
			message: "pipeline.lock_lease_ms must be greater than zero.".to_string(),
		});
	}

	for (label, ttl) in [
		("cache.rewrite_ttl_secs", cfg.cache.rewrite_ttl_secs),
		("cache.retrieval_ttl_secs", cfg.cache.retrieval_ttl_secs),
		("cache.compress_ttl_secs", cfg.cache.compress_ttl_secs),
		("cache.answer_ttl_secs", cfg.cache.answer_ttl_secs),
		("cache.file_listing_ttl_secs", cfg.cache.file_listing_ttl_secs),
	] {
		if ttl < 0 {
			return Err(Error::Validation {
				message: format!("{label} must be zero or greater."),
			});
		}
	}

	for (label, llm) in
		[("generation", &cfg.providers.generation), ("rewrite", &cfg.providers.rewrite)]
	{
		if !llm.temperature.is_finite() || llm.temperature < 0.0 {
			return Err(Error::Validation {
				message: format!("Provider {label} temperature must be zero or greater."),
			});
		}
		if llm.max_tokens == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} max_tokens must be greater than zero."),
			});
		}
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("generation", &cfg.providers.generation.api_key),
		("rewrite", &cfg.providers.rewrite.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for llm in [&mut cfg.providers.generation, &mut cfg.providers.rewrite] {
		if llm.path.trim().is_empty() {
			llm.path = "/v1/chat/completions".to_string();
		}
	}
	if cfg.providers.embedding.path.trim().is_empty() {
		cfg.providers.embedding.path = "/v1/embeddings".to_string();
	}
}
