//! In-process fakes for the pipeline's external collaborators. Unlike live
//! deployments, nothing here needs a network: the scripted chat provider
//! counts its calls, the fixture index serves seeded chunks with explicit
//! scores, and services run over the in-memory store.

use std::{
	collections::BTreeMap,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;
use uuid::Uuid;

use griot_config::{
	Cache, Config, Corpus, EmbeddingProviderConfig, LlmProviderConfig, Pipeline,
	Providers as ProviderConfigs, Qdrant, Redis, Service, Storage,
};
use griot_domain::{DocumentInfo, RetrievedChunk};
use griot_providers::chat::{ChatCompletion, ChatUsage};
use griot_service::{
	BoxFuture, BoxTextStream, ChatProvider, DocumentCatalog, EmbeddingProvider, GriotService,
	Providers, prompts,
};
use griot_store::{MemoryKv, VectorSearch};

/// A chat provider that replays a scripted reply and counts what it was
/// asked to do. Rewrite and generation traffic are tallied separately by
/// matching the system prompt, so dedup tests can assert on exactly one
/// generation call.
pub struct ScriptedChat {
	reply: String,
	delay: Option<Duration>,
	fail: AtomicBool,
	rewrite_calls: AtomicUsize,
	generation_calls: AtomicUsize,
}
impl ScriptedChat {
	pub fn new(reply: &str) -> Self {
		Self {
			reply: reply.to_string(),
			delay: None,
			fail: AtomicBool::new(false),
			rewrite_calls: AtomicUsize::new(0),
			generation_calls: AtomicUsize::new(0),
		}
	}

	/// Adds latency to every call so concurrent requests overlap while the
	/// leader is still computing.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn set_failing(&self, failing: bool) {
		self.fail.store(failing, Ordering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.rewrite_calls() + self.generation_calls()
	}

	pub fn rewrite_calls(&self) -> usize {
		self.rewrite_calls.load(Ordering::SeqCst)
	}

	pub fn generation_calls(&self) -> usize {
		self.generation_calls.load(Ordering::SeqCst)
	}

	fn record(&self, system: &str) {
		if system == prompts::REWRITE_SYSTEM_PROMPT {
			self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
		} else {
			self.generation_calls.fetch_add(1, Ordering::SeqCst);
		}
	}

	async fn respond(&self, system: &str) -> color_eyre::Result<String> {
		self.record(system);

		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		if self.fail.load(Ordering::SeqCst) {
			return Err(eyre::eyre!("Scripted chat provider failure."));
		}

		Ok(self.reply.clone())
	}
}
impl ChatProvider for ScriptedChat {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		system: &'a str,
		user: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<ChatCompletion>> {
		Box::pin(async move {
			let text = self.respond(system).await?;
			let usage = ChatUsage {
				prompt_tokens: user.split_whitespace().count() as u32,
				completion_tokens: text.split_whitespace().count() as u32,
			};

			Ok(ChatCompletion { text, usage })
		})
	}

	fn stream<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		system: &'a str,
		_user: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<BoxTextStream>> {
		Box::pin(async move {
			let text = self.respond(system).await?;
			let midpoint = text.len() / 2;
			let midpoint = (0..=midpoint)
				.rev()
				.find(|idx| text.is_char_boundary(*idx))
				.unwrap_or(0);
			let parts = vec![
				Ok(text[..midpoint].to_string()),
				Ok(text[midpoint..].to_string()),
			];

			Ok(Box::pin(futures::stream::iter(parts)) as BoxTextStream)
		})
	}
}

/// Deterministic embeddings derived from the text hash. Useless for
/// semantics, which is exactly what fixture-scored retrieval wants.
pub struct HashEmbedder;
impl EmbeddingProvider for HashEmbedder {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			let vectors = texts
				.iter()
				.map(|text| {
					let digest = blake3::hash(text.as_bytes());
					let bytes = digest.as_bytes();

					(0..cfg.dimensions as usize)
						.map(|idx| bytes[idx % bytes.len()] as f32 / 255.0)
						.collect()
				})
				.collect();

			Ok(vectors)
		})
	}
}

/// An embedding provider that is always down, for upstream-failure tests.
pub struct FailingEmbedder;
impl EmbeddingProvider for FailingEmbedder {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Err(eyre::eyre!("Embedding service unreachable.")) })
	}
}

#[derive(Clone)]
pub struct FixtureChunk {
	pub chunk: RetrievedChunk,
	pub metadata: BTreeMap<String, String>,
}

/// A vector index replaced by fixtures: seeded chunks with explicit scores,
/// exact-match metadata filtering, descending-score order with stable ties.
pub struct FixtureIndex {
	chunks: Vec<FixtureChunk>,
}
impl FixtureIndex {
	pub fn new(chunks: Vec<FixtureChunk>) -> Self {
		Self { chunks }
	}

	pub fn empty() -> Self {
		Self { chunks: Vec::new() }
	}
}
impl VectorSearch for FixtureIndex {
	fn search<'a>(
		&'a self,
		_vector: &'a [f32],
		filters: &'a BTreeMap<String, String>,
		limit: u32,
	) -> BoxFuture<'a, griot_store::Result<Vec<RetrievedChunk>>> {
		Box::pin(async move {
			let mut hits: Vec<&FixtureChunk> = self
				.chunks
				.iter()
				.filter(|fixture| {
					filters.iter().all(|(field, value)| {
						fixture.metadata.get(field).map(|seeded| seeded == value).unwrap_or(false)
					})
				})
				.collect();

			hits.sort_by(|a, b| b.chunk.score.total_cmp(&a.chunk.score));
			hits.truncate(limit as usize);

			Ok(hits.into_iter().map(|fixture| fixture.chunk.clone()).collect())
		})
	}
}

/// Builds a fixture chunk with ids derived from the filename and text, so
/// two service instances seeded with the same corpus agree on identity.
pub fn corpus_chunk(filename: &str, text: &str, score: f32) -> FixtureChunk {
	let document_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, filename.as_bytes());
	let chunk_id =
		Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{filename}:{text}").as_bytes());

	FixtureChunk {
		chunk: RetrievedChunk {
			chunk_id,
			document_id,
			filename: filename.to_string(),
			page: None,
			score,
			start_offset: 0,
			end_offset: text.len() as u32,
			text: text.to_string(),
		},
		metadata: BTreeMap::new(),
	}
}

pub fn corpus_chunk_with_metadata(
	filename: &str,
	text: &str,
	score: f32,
	metadata: &[(&str, &str)],
) -> FixtureChunk {
	let mut fixture = corpus_chunk(filename, text, score);

	fixture.metadata = metadata
		.iter()
		.map(|(field, value)| (field.to_string(), value.to_string()))
		.collect();

	fixture
}

pub struct StaticCatalog {
	documents: Vec<DocumentInfo>,
	calls: AtomicUsize,
}
impl StaticCatalog {
	pub fn new(documents: Vec<DocumentInfo>) -> Self {
		Self { documents, calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl DocumentCatalog for StaticCatalog {
	fn list_documents<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentInfo>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(self.documents.clone())
		})
	}
}

pub fn test_config() -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			redis: Redis { url: "redis://127.0.0.1:1/0".to_string() },
			qdrant: Qdrant {
				url: "http://127.0.0.1:1".to_string(),
				collection: "test_chunks".to_string(),
				vector_dim: 32,
			},
		},
		providers: ProviderConfigs {
			embedding: dummy_embedding_provider(),
			generation: dummy_llm_provider("test-generation-model"),
			rewrite: dummy_llm_provider("test-rewrite-model"),
		},
		pipeline: Pipeline {
			top_k: 8,
			max_context_budget: 400,
			lock_lease_ms: 2_000,
			lease_retry_limit: 3,
		},
		cache: Cache {
			rewrite_ttl_secs: 60,
			retrieval_ttl_secs: 60,
			compress_ttl_secs: 60,
			answer_ttl_secs: 60,
			file_listing_ttl_secs: 60,
		},
		corpus: Corpus { manifest_path: "/nonexistent/.griot_index.json".to_string() },
	}
}

/// The pass-through configuration: every bucket disabled, so each request
/// pays for live computation.
pub fn test_config_uncached() -> Config {
	let mut cfg = test_config();

	cfg.cache = Cache {
		rewrite_ttl_secs: 0,
		retrieval_ttl_secs: 0,
		compress_ttl_secs: 0,
		answer_ttl_secs: 0,
		file_listing_ttl_secs: 0,
	};

	cfg
}

pub fn test_service(
	cfg: Config,
	chat: Arc<ScriptedChat>,
	index: FixtureIndex,
) -> GriotService {
	test_service_with_catalog(cfg, chat, index, Arc::new(StaticCatalog::new(Vec::new())))
}

pub fn test_service_with_catalog(
	cfg: Config,
	chat: Arc<ScriptedChat>,
	index: FixtureIndex,
	catalog: Arc<StaticCatalog>,
) -> GriotService {
	test_service_on_kv(cfg, chat, index, catalog, Arc::new(MemoryKv::new()))
}

/// Builds a service over a caller-owned store, so tests can share one store
/// between service instances or inspect it directly.
pub fn test_service_on_kv(
	cfg: Config,
	chat: Arc<ScriptedChat>,
	index: FixtureIndex,
	catalog: Arc<StaticCatalog>,
	kv: Arc<MemoryKv>,
) -> GriotService {
	GriotService::with_providers(
		cfg,
		kv,
		Arc::new(index),
		catalog,
		Providers::new(Arc::new(HashEmbedder), chat),
	)
}

fn dummy_embedding_provider() -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/v1/embeddings".to_string(),
		model: "test-embedding-model".to_string(),
		dimensions: 32,
		timeout_ms: 1_000,
		default_headers: serde_json::Map::new(),
	}
}

fn dummy_llm_provider(model: &str) -> LlmProviderConfig {
	LlmProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/v1/chat/completions".to_string(),
		model: model.to_string(),
		temperature: 0.0,
		max_tokens: 256,
		timeout_ms: 1_000,
		default_headers: serde_json::Map::new(),
	}
}
