use griot_domain::InvalidationEvent;

use crate::{CacheBucket, StageCache};

/// What an invalidation pass removed, returned to the ingestion webhook for
/// observability.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct EvictionReport {
	pub evicted: u64,
}

/// Propagates document-change events into cache eviction. Which buckets are
/// touched is decided by the static `CacheBucket::depends_on_corpus` table:
/// retrieval, compression, and answer entries fall with the chunks they
/// cite, the file listing is purged whole, and the rewrite bucket — which
/// depends only on query text — is never touched.
#[derive(Clone)]
pub struct InvalidationBus {
	cache: StageCache,
}
impl InvalidationBus {
	pub fn new(cache: StageCache) -> Self {
		Self { cache }
	}

	pub async fn on_document_changed(&self, event: &InvalidationEvent) -> EvictionReport {
		let mut evicted = 0;

		for bucket in CacheBucket::ALL {
			if !bucket.depends_on_corpus() {
				continue;
			}

			evicted += match bucket {
				CacheBucket::FileListing => self.cache.invalidate_bucket(bucket).await,
				_ => self.cache.invalidate_chunks(bucket, &event.chunk_ids).await,
			};
		}

		tracing::info!(
			document_id = %event.document_id,
			affected_chunks = event.chunk_ids.len(),
			evicted,
			"Evicted cache entries for changed document."
		);

		EvictionReport { evicted }
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use time::OffsetDateTime;
	use uuid::Uuid;

	use griot_store::MemoryKv;

	use super::*;

	fn cache() -> StageCache {
		StageCache::new(Arc::new(MemoryKv::new()), &griot_config::Cache {
			rewrite_ttl_secs: 60,
			retrieval_ttl_secs: 60,
			compress_ttl_secs: 60,
			answer_ttl_secs: 60,
			file_listing_ttl_secs: 60,
		})
	}

	#[tokio::test]
	async fn document_change_spares_the_rewrite_bucket() {
		let cache = cache();
		let chunk_id = Uuid::new_v4();

		cache.put(CacheBucket::Rewrite, "rw", &"rewritten".to_string(), &[]).await;
		cache.put(CacheBucket::Retrieval, "rt", &"set".to_string(), &[chunk_id]).await;
		cache.put(CacheBucket::Compression, "cp", &"pack".to_string(), &[chunk_id]).await;
		cache.put(CacheBucket::Answer, "an", &"answer".to_string(), &[chunk_id]).await;
		cache.put(CacheBucket::FileListing, "fl", &"listing".to_string(), &[]).await;

		let bus = InvalidationBus::new(cache.clone());
		let report = bus
			.on_document_changed(&InvalidationEvent {
				document_id: Uuid::new_v4(),
				chunk_ids: vec![chunk_id],
				occurred_at: OffsetDateTime::now_utc(),
			})
			.await;

		assert_eq!(report.evicted, 4);

		let rewrite: Option<String> = cache.get(CacheBucket::Rewrite, "rw").await;
		let retrieval: Option<String> = cache.get(CacheBucket::Retrieval, "rt").await;
		let compression: Option<String> = cache.get(CacheBucket::Compression, "cp").await;
		let answer: Option<String> = cache.get(CacheBucket::Answer, "an").await;
		let listing: Option<String> = cache.get(CacheBucket::FileListing, "fl").await;

		assert_eq!(rewrite.as_deref(), Some("rewritten"));
		assert_eq!(retrieval, None);
		assert_eq!(compression, None);
		assert_eq!(answer, None);
		assert_eq!(listing, None);
	}

	#[tokio::test]
	async fn unrelated_chunks_survive_the_event() {
		let cache = cache();
		let changed = Uuid::new_v4();
		let unrelated = Uuid::new_v4();

		cache.put(CacheBucket::Answer, "hit", &"a".to_string(), &[changed]).await;
		cache.put(CacheBucket::Answer, "keep", &"b".to_string(), &[unrelated]).await;

		let bus = InvalidationBus::new(cache.clone());

		bus.on_document_changed(&InvalidationEvent {
			document_id: Uuid::new_v4(),
			chunk_ids: vec![changed],
			occurred_at: OffsetDateTime::now_utc(),
		})
		.await;

		let gone: Option<String> = cache.get(CacheBucket::Answer, "hit").await;
		let kept: Option<String> = cache.get(CacheBucket::Answer, "keep").await;

		assert_eq!(gone, None);
		assert_eq!(kept.as_deref(), Some("b"));
	}
}
