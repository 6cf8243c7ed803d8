use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub pipeline: Pipeline,
	pub cache: Cache,
	pub corpus: Corpus,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub redis: Redis,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Redis {
	pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: LlmProviderConfig,
	pub rewrite: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Pipeline {
	pub top_k: u32,
	/// Compression budget in whitespace-delimited words.
	pub max_context_budget: u32,
	pub lock_lease_ms: u64,
	#[serde(default = "default_lease_retry_limit")]
	pub lease_retry_limit: u32,
}

/// Per-bucket TTLs in seconds. A TTL of zero disables the bucket: every
/// read misses and nothing is stored, leaving the stage as a pure
/// pass-through to live computation.
#[derive(Debug, Deserialize)]
pub struct Cache {
	pub rewrite_ttl_secs: i64,
	pub retrieval_ttl_secs: i64,
	pub compress_ttl_secs: i64,
	pub answer_ttl_secs: i64,
	pub file_listing_ttl_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct Corpus {
	pub manifest_path: String,
}

fn default_lease_retry_limit() -> u32 {
	3
}
