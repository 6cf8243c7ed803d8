use griot_domain::ContextPack;

pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant that answers questions using only the provided context. \
Cite the source identifiers in square brackets. If the context does not contain the \
answer, reply that no grounded answer is available and suggest refreshing the \
knowledge base.";

pub const REWRITE_SYSTEM_PROMPT: &str = "\
Rewrite the user's query into a clear, self-contained search query over a private \
document corpus. Keep every constraint from the original query. Reply with the \
rewritten query only.";

pub fn answer_prompt(question: &str, pack: &ContextPack) -> String {
	format!(
		"Answer succinctly with citations referencing [chunk-id].\nQuestion: {question}\nContext:\n{}",
		render_context(pack)
	)
}

pub fn render_context(pack: &ContextPack) -> String {
	let mut out = String::new();

	for (label, items) in
		[("Facts", &pack.facts), ("Steps", &pack.steps), ("Constraints", &pack.constraints)]
	{
		if items.is_empty() {
			continue;
		}

		out.push_str(label);
		out.push_str(":\n");

		for item in items {
			for citation in &item.citations {
				out.push('[');
				out.push_str(&citation.to_string());
				out.push_str("] ");
			}

			out.push_str(&item.text);
			out.push('\n');
		}
	}

	out
}
