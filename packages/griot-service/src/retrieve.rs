use std::collections::BTreeMap;

use griot_domain::RetrievalSet;

use crate::{Error, GriotService, Result};

impl GriotService {
	/// Embeds the rewritten query and runs the filtered similarity search.
	/// The store's returned order is preserved so score ties break by its
	/// original ordering; an empty or under-K result is a valid outcome.
	pub(crate) async fn retrieve_chunks(
		&self,
		rewritten: &str,
		filters: &BTreeMap<String, String>,
	) -> Result<RetrievalSet> {
		let embed_cfg = &self.cfg.providers.embedding;
		let embeddings = self
			.providers
			.embedding
			.embed(embed_cfg, std::slice::from_ref(&rewritten.to_string()))
			.await
			.map_err(|err| Error::upstream("embedding", err))?;
		let Some(vector) = embeddings.into_iter().next() else {
			return Err(Error::upstream("embedding", "Embedding provider returned no vectors."));
		};

		if vector.len() != embed_cfg.dimensions as usize {
			return Err(Error::upstream("embedding", "Embedding vector dimension mismatch."));
		}

		let top_k = self.cfg.pipeline.top_k;
		let mut items = self.vectors.search(&vector, filters, top_k).await?;

		items.truncate(top_k as usize);

		Ok(RetrievalSet { items })
	}
}
