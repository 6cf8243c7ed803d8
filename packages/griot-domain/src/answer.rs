use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::AnswerMode;

/// A grounded reference into the corpus: the document, the chunk, and the
/// byte span of the cited content within the document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Citation {
	pub document_id: Uuid,
	pub chunk_id: Uuid,
	pub start_offset: u32,
	pub end_offset: u32,
}

/// Observability attached to a served answer. Not part of the cache key: a
/// cached or joined answer carries the metadata recorded when the one
/// underlying generation call produced it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerationMetadata {
	pub model: String,
	pub latency_ms: u64,
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
	pub generation_calls: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Answer {
	pub text: String,
	pub mode: AnswerMode,
	pub sources: Vec<Citation>,
	pub quotes: Vec<String>,
	pub grounded: bool,
	pub truncated: bool,
	pub metadata: GenerationMetadata,
}
impl Answer {
	/// The cited documents, deduplicated in citation order. Used by the
	/// idempotence property: the set is stable across cache states.
	pub fn cited_documents(&self) -> Vec<Uuid> {
		let mut seen = Vec::new();

		for source in &self.sources {
			if !seen.contains(&source.document_id) {
				seen.push(source.document_id);
			}
		}

		seen
	}
}

/// One element of the streaming answer surface. The stream is finite and not
/// restartable: zero or more deltas followed by exactly one terminal
/// `Complete` carrying the full answer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AnswerEvent {
	Delta(String),
	Complete(Answer),
}

/// A corpus document as reported by the ingestion subsystem's manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DocumentInfo {
	pub document_id: Uuid,
	pub filename: String,
	pub content_hash: String,
	pub size_bytes: u64,
	pub total_chunks: u32,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub last_ingested_at: Option<OffsetDateTime>,
}
