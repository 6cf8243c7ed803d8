use griot_domain::NormalizedQuery;

use crate::{GriotService, Result, prompts};

impl GriotService {
	/// Clarifies a normalized query. A query that is already specific enough
	/// passes through as-is; otherwise one call to the generation service
	/// expands it. Provider failure falls back to the normalized text so an
	/// unreachable rewrite model never fails the pipeline.
	pub(crate) async fn rewrite_query(&self, normalized: &NormalizedQuery) -> Result<String> {
		if is_self_contained(normalized) {
			return Ok(normalized.text.clone());
		}

		match self
			.providers
			.chat
			.complete(&self.cfg.providers.rewrite, prompts::REWRITE_SYSTEM_PROMPT, &normalized.text)
			.await
		{
			Ok(completion) => {
				let rewritten =
					completion.text.split_whitespace().collect::<Vec<_>>().join(" ");

				if rewritten.is_empty() {
					Ok(normalized.text.clone())
				} else {
					Ok(rewritten)
				}
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					"Query rewrite failed; falling back to the normalized query."
				);

				Ok(normalized.text.clone())
			},
		}
	}
}

/// Local heuristic: a query with enough terms and a recognizable question
/// shape needs no clarification call.
fn is_self_contained(normalized: &NormalizedQuery) -> bool {
	let words = normalized.text.split_whitespace().count();

	words >= 4 && (!normalized.intent_tags.is_empty() || normalized.text.ends_with('?'))
}
