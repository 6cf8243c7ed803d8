use std::{collections::BTreeMap, io::ErrorKind, path::PathBuf};

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use griot_domain::DocumentInfo;

use crate::{
	BoxFuture, CacheBucket, Error, GriotService, Result, answer::no_stage_citations, keys,
};

/// The ingestion subsystem's view of the corpus. Griot only reads it; the
/// chunk-to-document mapping and the listing itself are owned externally.
pub trait DocumentCatalog
where
	Self: Send + Sync,
{
	fn list_documents<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentInfo>>>;
}

#[derive(Debug, serde::Deserialize)]
struct ManifestEntry {
	document_id: Uuid,
	hash: String,
	size_bytes: u64,
	total_chunks: u32,
	#[serde(default)]
	last_ingested_at: Option<String>,
}

/// Reads the manifest file the ingestion subsystem maintains next to the
/// corpus: a JSON map of filename to document metadata. A missing manifest
/// is an empty corpus, not an error.
pub struct ManifestCatalog {
	path: PathBuf,
}
impl ManifestCatalog {
	pub fn new(cfg: &griot_config::Corpus) -> Self {
		Self { path: PathBuf::from(&cfg.manifest_path) }
	}
}
impl DocumentCatalog for ManifestCatalog {
	fn list_documents<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<DocumentInfo>>> {
		Box::pin(async move {
			let raw = match tokio::fs::read_to_string(&self.path).await {
				Ok(raw) => raw,
				Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
				Err(err) => return Err(err.into()),
			};
			let manifest: BTreeMap<String, ManifestEntry> = serde_json::from_str(&raw)?;
			let documents = manifest
				.into_iter()
				.map(|(filename, entry)| DocumentInfo {
					document_id: entry.document_id,
					filename,
					content_hash: entry.hash,
					size_bytes: entry.size_bytes,
					total_chunks: entry.total_chunks,
					last_ingested_at: entry
						.last_ingested_at
						.as_deref()
						.and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok()),
				})
				.collect();

			Ok(documents)
		})
	}
}

impl GriotService {
	/// Serves the corpus listing through the file-listing bucket so document
	/// churn invalidates it alongside the chunk-derived buckets.
	pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
		let key = match keys::build_file_listing_key() {
			Ok(key) => Some(key),
			Err(err) => {
				tracing::warn!(error = %err, "File listing key build failed.");

				None
			},
		};
		let svc = self.clone();

		self.run_stage(CacheBucket::FileListing, key, no_stage_citations, move || {
			let svc = svc.clone();

			async move {
				svc.catalog
					.list_documents()
					.await
					.map_err(|err| Error::upstream("catalog", err))
			}
		})
		.await
	}
}
