use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use griot_config::{EmbeddingProviderConfig, LlmProviderConfig};
use griot_domain::{AnswerMode, NormalizedQuery};

use crate::{Error, Result};

const REWRITE_KEY_VERSION: i32 = 1;
const RETRIEVAL_KEY_VERSION: i32 = 1;
const COMPRESS_KEY_VERSION: i32 = 1;
const ANSWER_KEY_VERSION: i32 = 1;
const FILE_LISTING_KEY_VERSION: i32 = 1;

pub fn decode_json<T>(value: Value, label: &str) -> Result<T>
where
	T: DeserializeOwned,
{
	serde_json::from_value(value)
		.map_err(|err| Error::Internal { message: format!("Invalid {label} value: {err}") })
}

pub fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Internal {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

/// Key contract: rewrites are idempotent for caching purposes, not pure.
/// The external model need not reproduce byte-identical output, but any
/// cached rewrite remains a valid rewrite of its normalized query for the
/// TTL window, so the key covers the query text and the rewrite
/// configuration — never the rewrite output.
pub fn build_rewrite_key(
	normalized: &NormalizedQuery,
	cfg: &LlmProviderConfig,
) -> Result<String> {
	let payload = serde_json::json!({
		"kind": "rewrite",
		"schema_version": REWRITE_KEY_VERSION,
		"query": normalized.text,
		"provider_id": cfg.provider_id,
		"model": cfg.model,
		"temperature": cfg.temperature,
	});

	hash_cache_key(&payload)
}

pub fn build_retrieval_key(
	rewritten: &str,
	filters: &BTreeMap<String, String>,
	top_k: u32,
	cfg: &EmbeddingProviderConfig,
) -> Result<String> {
	let payload = serde_json::json!({
		"kind": "retrieval",
		"schema_version": RETRIEVAL_KEY_VERSION,
		"query": rewritten,
		"filters": filters,
		"top_k": top_k,
		"provider_id": cfg.provider_id,
		"model": cfg.model,
		"dimensions": cfg.dimensions,
	});

	hash_cache_key(&payload)
}

pub fn build_compress_key(
	rewritten: &str,
	chunk_ids: &[Uuid],
	budget_words: u32,
) -> Result<String> {
	let payload = serde_json::json!({
		"kind": "compress",
		"schema_version": COMPRESS_KEY_VERSION,
		"query": rewritten,
		"chunk_ids": chunk_ids,
		"budget_words": budget_words,
	});

	hash_cache_key(&payload)
}

pub fn build_answer_key(rewritten: &str, model: &str, mode: AnswerMode) -> Result<String> {
	let payload = serde_json::json!({
		"kind": "answer",
		"schema_version": ANSWER_KEY_VERSION,
		"query": rewritten,
		"model": model,
		"mode": mode.as_str(),
	});

	hash_cache_key(&payload)
}

pub fn build_file_listing_key() -> Result<String> {
	let payload = serde_json::json!({
		"kind": "file_listing",
		"schema_version": FILE_LISTING_KEY_VERSION,
	});

	hash_cache_key(&payload)
}

#[cfg(test)]
mod tests {
	use super::*;
	use griot_domain::normalize_query;

	fn llm() -> LlmProviderConfig {
		LlmProviderConfig {
			provider_id: "test".to_string(),
			api_base: "http://127.0.0.1:1".to_string(),
			api_key: "test-key".to_string(),
			path: "/".to_string(),
			model: "test-model".to_string(),
			temperature: 0.1,
			max_tokens: 256,
			timeout_ms: 1_000,
			default_headers: serde_json::Map::new(),
		}
	}

	#[test]
	fn rewrite_key_is_stable_for_identical_inputs() {
		let normalized = normalize_query("How do I reset my voicemail PIN?");
		let a = build_rewrite_key(&normalized, &llm()).expect("key build failed");
		let b = build_rewrite_key(&normalized, &llm()).expect("key build failed");

		assert_eq!(a, b);
	}

	#[test]
	fn rewrite_key_changes_with_model() {
		let normalized = normalize_query("How do I reset my voicemail PIN?");
		let mut other = llm();

		other.model = "other-model".to_string();

		let a = build_rewrite_key(&normalized, &llm()).expect("key build failed");
		let b = build_rewrite_key(&normalized, &other).expect("key build failed");

		assert_ne!(a, b);
	}

	#[test]
	fn answer_key_separates_modes() {
		let a = build_answer_key("q", "m", AnswerMode::Answer).expect("key build failed");
		let b = build_answer_key("q", "m", AnswerMode::Verbatim).expect("key build failed");

		assert_ne!(a, b);
	}

	#[test]
	fn compress_key_tracks_chunk_identity() {
		let chunks_a = vec![Uuid::new_v4()];
		let chunks_b = vec![Uuid::new_v4()];
		let a = build_compress_key("q", &chunks_a, 100).expect("key build failed");
		let b = build_compress_key("q", &chunks_b, 100).expect("key build failed");

		assert_ne!(a, b);
	}
}
