use std::time::Instant;

use griot_domain::{Answer, AnswerMode, Citation, ContextPack, GenerationMetadata, RetrievalSet};
use griot_providers::chat::ChatUsage;

use crate::{Error, GriotService, Result, prompts};

pub const REFUSAL_EMPTY_QUERY: &str = "The query is empty. Please provide a question.";
pub const REFUSAL_NO_GROUNDING: &str =
	"No grounding found in the corpus for this question. Try refreshing the documents.";
pub const REFUSAL_BUDGET_EXCEEDED: &str =
	"The retrieved content could not fit the context budget.";
pub const NOT_FOUND_VERBATIM: &str = "No verbatim passage matches this question.";

const MAX_SUPPORT_QUOTE_CHARS: usize = 400;

impl GriotService {
	/// `answer`-mode generation: one call to the generation service over the
	/// rendered context pack. Refusal on empty context happens before this
	/// is reached, so the pack always carries cited content here.
	pub(crate) async fn complete_answer(
		&self,
		question: &str,
		pack: &ContextPack,
		set: &RetrievalSet,
	) -> Result<Answer> {
		let cfg = &self.cfg.providers.generation;
		let started = Instant::now();
		let completion = self
			.providers
			.chat
			.complete(cfg, prompts::SYSTEM_PROMPT, &prompts::answer_prompt(question, pack))
			.await
			.map_err(|err| Error::upstream("generation", err))?;

		Ok(grounded_answer(
			completion.text,
			pack,
			set,
			AnswerMode::Answer,
			&cfg.model,
			completion.usage,
			started.elapsed().as_millis() as u64,
		))
	}
}

pub(crate) fn grounded_answer(
	text: String,
	pack: &ContextPack,
	set: &RetrievalSet,
	mode: AnswerMode,
	model: &str,
	usage: ChatUsage,
	latency_ms: u64,
) -> Answer {
	let mut sources = Vec::new();
	let mut quotes = Vec::new();

	for chunk_id in pack.cited_chunk_ids() {
		let Some(chunk) = set.items.iter().find(|chunk| chunk.chunk_id == chunk_id) else {
			continue;
		};

		sources.push(Citation {
			document_id: chunk.document_id,
			chunk_id: chunk.chunk_id,
			start_offset: chunk.start_offset,
			end_offset: chunk.end_offset,
		});
		quotes.push(support_quote(&chunk.text));
	}

	Answer {
		text,
		mode,
		sources,
		quotes,
		grounded: true,
		truncated: pack.truncated,
		metadata: GenerationMetadata {
			model: model.to_string(),
			latency_ms,
			prompt_tokens: usage.prompt_tokens,
			completion_tokens: usage.completion_tokens,
			generation_calls: 1,
		},
	}
}

/// `verbatim`-mode answers never touch the generation service: every quote
/// is the exact text of a context pack item, which is a verbatim span of a
/// retrieved chunk by construction. No paraphrase can slip in.
pub fn verbatim_answer(pack: &ContextPack, set: &RetrievalSet, model: &str) -> Answer {
	let mut sources = Vec::new();
	let mut quotes = Vec::new();

	for item in pack.items() {
		let mut cited = false;

		for chunk_id in &item.citations {
			let Some(chunk) = set.items.iter().find(|chunk| chunk.chunk_id == *chunk_id) else {
				continue;
			};
			let citation = Citation {
				document_id: chunk.document_id,
				chunk_id: chunk.chunk_id,
				start_offset: item.start_offset,
				end_offset: item.end_offset,
			};

			if !sources.contains(&citation) {
				sources.push(citation);
			}

			cited = true;
		}
		if cited {
			quotes.push(item.text.clone());
		}
	}

	if quotes.is_empty() {
		return not_found_answer(model);
	}

	Answer {
		text: quotes.join("\n"),
		mode: AnswerMode::Verbatim,
		sources,
		quotes,
		grounded: true,
		truncated: pack.truncated,
		metadata: GenerationMetadata { model: model.to_string(), ..Default::default() },
	}
}

pub fn refusal_answer(text: &str, mode: AnswerMode, model: &str) -> Answer {
	Answer {
		text: text.to_string(),
		mode,
		sources: Vec::new(),
		quotes: Vec::new(),
		grounded: false,
		truncated: false,
		metadata: GenerationMetadata { model: model.to_string(), ..Default::default() },
	}
}

pub fn budget_exceeded_answer(mode: AnswerMode, model: &str) -> Answer {
	let mut answer = refusal_answer(REFUSAL_BUDGET_EXCEEDED, mode, model);

	answer.truncated = true;

	answer
}

pub fn not_found_answer(model: &str) -> Answer {
	refusal_answer(NOT_FOUND_VERBATIM, AnswerMode::Verbatim, model)
}

fn support_quote(text: &str) -> String {
	let trimmed = text.trim();

	if trimmed.chars().count() <= MAX_SUPPORT_QUOTE_CHARS {
		return trimmed.to_string();
	}

	trimmed.chars().take(MAX_SUPPORT_QUOTE_CHARS).collect()
}
