use std::collections::BTreeMap;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Whether the answer may paraphrase grounded content or must quote it
/// exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
	#[default]
	Answer,
	Verbatim,
}
impl AnswerMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Answer => "answer",
			Self::Verbatim => "verbatim",
		}
	}
}

/// A submitted question. Immutable once built; filters are exact-match
/// metadata predicates that only ever narrow retrieval.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Query {
	pub text: String,
	#[serde(default)]
	pub mode: AnswerMode,
	#[serde(default)]
	pub filters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
	HowTo,
	Definition,
	Troubleshoot,
	Lookup,
}
impl IntentTag {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::HowTo => "how_to",
			Self::Definition => "definition",
			Self::Troubleshoot => "troubleshoot",
			Self::Lookup => "lookup",
		}
	}
}

/// Canonical form of a query: NFKC-folded, lowercased, whitespace-collapsed
/// text plus the intent tags extracted from it. Derivation is deterministic,
/// which makes this the cache key root for the rewrite stage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedQuery {
	pub text: String,
	pub intent_tags: Vec<IntentTag>,
}
impl NormalizedQuery {
	pub fn is_empty(&self) -> bool {
		self.text.is_empty()
	}
}

pub fn normalize_query(raw: &str) -> NormalizedQuery {
	let folded = raw.trim().nfkc().collect::<String>().to_lowercase();
	let text = folded.split_whitespace().collect::<Vec<_>>().join(" ");
	let intent_tags = extract_intent_tags(&text);

	NormalizedQuery { text, intent_tags }
}

fn extract_intent_tags(text: &str) -> Vec<IntentTag> {
	let rules: [(IntentTag, &str); 4] = [
		(IntentTag::HowTo, r"\bhow (do|does|can|to|should)\b"),
		(IntentTag::Definition, r"\b(what is|what are|define|meaning of)\b"),
		(
			IntentTag::Troubleshoot,
			r"\b(error|fail|failed|failing|broken|not working|cannot|can't|won't|crash)\b",
		),
		(IntentTag::Lookup, r"\b(where|when|who|which|list|show)\b"),
	];
	let mut tags = Vec::new();

	for (tag, pattern) in rules {
		if Regex::new(pattern).map(|re| re.is_match(text)).unwrap_or(false) {
			tags.push(tag);
		}
	}

	tags
}

/// A retrieved passage with its provenance. Content is owned by the vector
/// store; the pipeline never mutates it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetrievedChunk {
	pub chunk_id: Uuid,
	pub document_id: Uuid,
	pub filename: String,
	pub page: Option<u32>,
	pub score: f32,
	pub start_offset: u32,
	pub end_offset: u32,
	pub text: String,
}

/// Top-K retrieval results in the similarity store's returned order. Ties in
/// score keep that original order, so results are as reproducible as the
/// store itself. An empty set is a valid outcome, not a failure.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RetrievalSet {
	pub items: Vec<RetrievedChunk>,
}
impl RetrievalSet {
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn chunk_ids(&self) -> Vec<Uuid> {
		self.items.iter().map(|chunk| chunk.chunk_id).collect()
	}
}
