use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::query::RetrievalSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
	Fact,
	Step,
	Constraint,
}

/// One retained span of grounded content. The text is a verbatim sentence of
/// its source chunk; offsets are document offsets of that exact span.
/// Invariant: `citations` is never empty.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContextItem {
	pub kind: ContextKind,
	pub text: String,
	pub citations: Vec<Uuid>,
	pub score: f32,
	pub start_offset: u32,
	pub end_offset: u32,
}

/// Compressed grounding context: classified spans with citations, bounded by
/// a word budget. `truncated` records that lower-relevance chunks were
/// dropped to fit.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ContextPack {
	pub facts: Vec<ContextItem>,
	pub steps: Vec<ContextItem>,
	pub constraints: Vec<ContextItem>,
	pub truncated: bool,
}
impl ContextPack {
	pub fn is_empty(&self) -> bool {
		self.facts.is_empty() && self.steps.is_empty() && self.constraints.is_empty()
	}

	pub fn items(&self) -> impl Iterator<Item = &ContextItem> {
		self.facts.iter().chain(self.steps.iter()).chain(self.constraints.iter())
	}

	/// Cited chunk ids in first-seen order, deduplicated.
	pub fn cited_chunk_ids(&self) -> Vec<Uuid> {
		let mut seen = Vec::new();

		for item in self.items() {
			for chunk_id in &item.citations {
				if !seen.contains(chunk_id) {
					seen.push(*chunk_id);
				}
			}
		}

		seen
	}
}

/// Compresses a retrieval set into a context pack bounded by `budget_words`.
///
/// Chunks are consumed in relevance order; when the next chunk would exceed
/// the budget, it and everything below it are dropped whole. A span is never
/// split mid-citation: an item is included whole or not at all.
pub fn compress(set: &RetrievalSet, budget_words: u32) -> ContextPack {
	let budget = budget_words as usize;
	let mut pack = ContextPack::default();
	let mut used = 0_usize;

	for chunk in &set.items {
		let mut items = Vec::new();
		let mut cost = 0_usize;

		for (idx, sentence) in chunk.text.split_sentence_bound_indices() {
			let trimmed = sentence.trim();

			if trimmed.is_empty() {
				continue;
			}

			let lead = sentence.len() - sentence.trim_start().len();
			let start = chunk.start_offset.saturating_add((idx + lead) as u32);

			cost += trimmed.split_whitespace().count();

			items.push(ContextItem {
				kind: classify(trimmed),
				text: trimmed.to_string(),
				citations: vec![chunk.chunk_id],
				score: chunk.score,
				start_offset: start,
				end_offset: start.saturating_add(trimmed.len() as u32),
			});
		}

		if items.is_empty() {
			continue;
		}
		if used + cost > budget {
			pack.truncated = true;

			break;
		}

		used += cost;

		for item in items {
			match item.kind {
				ContextKind::Fact => pack.facts.push(item),
				ContextKind::Step => pack.steps.push(item),
				ContextKind::Constraint => pack.constraints.push(item),
			}
		}
	}

	pack
}

fn classify(sentence: &str) -> ContextKind {
	let constraint_pattern = r"(?i)\b(must( not)?|cannot|can't|never|always|only|required|at least|at most|do not|don't|forbidden|prohibited)\b";
	let step_pattern = r"(?i)^(\d+[.)]\s|step \d|first\b|then\b|next\b|finally\b|dial\b|press\b|click\b|open\b|go to\b|select\b|enter\b|run\b|restart\b|navigate\b)";

	if matches_pattern(sentence, constraint_pattern) {
		return ContextKind::Constraint;
	}
	if matches_pattern(sentence, step_pattern) {
		return ContextKind::Step;
	}

	ContextKind::Fact
}

fn matches_pattern(text: &str, pattern: &str) -> bool {
	Regex::new(pattern).map(|re| re.is_match(text)).unwrap_or(false)
}
