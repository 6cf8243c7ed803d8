use std::{collections::HashSet, sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use griot_store::KvStore;

use crate::keys::cache_key_prefix;

const KEY_NAMESPACE: &str = "griot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBucket {
	Rewrite,
	Retrieval,
	Compression,
	Answer,
	FileListing,
}
impl CacheBucket {
	pub const ALL: [Self; 5] =
		[Self::Rewrite, Self::Retrieval, Self::Compression, Self::Answer, Self::FileListing];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Rewrite => "rewrite",
			Self::Retrieval => "retrieval",
			Self::Compression => "compress",
			Self::Answer => "answer",
			Self::FileListing => "file_listing",
		}
	}

	/// Static dependency table for invalidation. Rewrites derive from query
	/// text alone and survive document churn; every other bucket derives
	/// from chunk content or the file listing and must be evicted when
	/// documents change.
	pub fn depends_on_corpus(self) -> bool {
		match self {
			Self::Rewrite => false,
			Self::Retrieval | Self::Compression | Self::Answer | Self::FileListing => true,
		}
	}
}

#[derive(Debug, Clone, Copy)]
struct BucketTtls {
	rewrite_secs: i64,
	retrieval_secs: i64,
	compress_secs: i64,
	answer_secs: i64,
	file_listing_secs: i64,
}

/// Advisory per-stage cache over the shared key-value store. Store failures
/// and undecodable payloads degrade to misses: the pipeline stays correct if
/// every read misses, it just pays for live computation.
///
/// Entries in corpus-dependent buckets are tagged with their cited chunk ids
/// so the content-addressed keys can be evicted per chunk.
#[derive(Clone)]
pub struct StageCache {
	kv: Arc<dyn KvStore>,
	ttls: BucketTtls,
}
impl StageCache {
	pub fn new(kv: Arc<dyn KvStore>, cfg: &griot_config::Cache) -> Self {
		Self {
			kv,
			ttls: BucketTtls {
				rewrite_secs: cfg.rewrite_ttl_secs,
				retrieval_secs: cfg.retrieval_ttl_secs,
				compress_secs: cfg.compress_ttl_secs,
				answer_secs: cfg.answer_ttl_secs,
				file_listing_secs: cfg.file_listing_ttl_secs,
			},
		}
	}

	/// The bucket's TTL policy; `None` means the bucket is disabled and
	/// behaves as a permanent miss.
	pub fn ttl(&self, bucket: CacheBucket) -> Option<Duration> {
		let secs = match bucket {
			CacheBucket::Rewrite => self.ttls.rewrite_secs,
			CacheBucket::Retrieval => self.ttls.retrieval_secs,
			CacheBucket::Compression => self.ttls.compress_secs,
			CacheBucket::Answer => self.ttls.answer_secs,
			CacheBucket::FileListing => self.ttls.file_listing_secs,
		};

		(secs > 0).then(|| Duration::from_secs(secs as u64))
	}

	pub async fn get<T>(&self, bucket: CacheBucket, key: &str) -> Option<T>
	where
		T: DeserializeOwned,
	{
		self.ttl(bucket)?;

		let storage_key = storage_key(bucket, key);

		match self.kv.get(&storage_key).await {
			Ok(Some(raw)) => match serde_json::from_str(&raw) {
				Ok(value) => {
					tracing::info!(
						cache_kind = bucket.as_str(),
						cache_key_prefix = cache_key_prefix(key),
						hit = true,
						"Cache hit."
					);

					Some(value)
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_kind = bucket.as_str(),
						cache_key_prefix = cache_key_prefix(key),
						"Cache payload decode failed."
					);

					None
				},
			},
			Ok(None) => {
				tracing::info!(
					cache_kind = bucket.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					hit = false,
					"Cache miss."
				);

				None
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = bucket.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					"Cache read failed."
				);

				None
			},
		}
	}

	/// Stores a stage result and tags it with its cited chunks. A disabled
	/// bucket stores nothing; store failures are logged and swallowed.
	pub async fn put<T>(&self, bucket: CacheBucket, key: &str, value: &T, cited: &[Uuid])
	where
		T: Serialize,
	{
		let Some(ttl) = self.ttl(bucket) else {
			return;
		};
		let raw = match serde_json::to_string(value) {
			Ok(raw) => raw,
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = bucket.as_str(),
					cache_key_prefix = cache_key_prefix(key),
					"Cache payload encode failed."
				);

				return;
			},
		};
		let storage_key = storage_key(bucket, key);

		if let Err(err) = self.kv.put(&storage_key, &raw, Some(ttl)).await {
			tracing::warn!(
				error = %err,
				cache_kind = bucket.as_str(),
				cache_key_prefix = cache_key_prefix(key),
				"Cache write failed."
			);

			return;
		}

		tracing::info!(
			cache_kind = bucket.as_str(),
			cache_key_prefix = cache_key_prefix(key),
			payload_size = raw.len(),
			ttl_secs = ttl.as_secs(),
			"Cache stored."
		);

		if !bucket.depends_on_corpus() {
			return;
		}

		for chunk_id in cited {
			let tag = tag_key(bucket, *chunk_id);

			if let Err(err) = self.kv.add_to_set(&tag, &storage_key, Some(ttl)).await {
				tracing::warn!(
					error = %err,
					cache_kind = bucket.as_str(),
					chunk_id = %chunk_id,
					"Cache tag write failed."
				);
			}
		}
	}

	/// Evicts every entry in the bucket tagged with one of the given chunks.
	/// Matching keys are removed before this returns.
	pub async fn invalidate_chunks(&self, bucket: CacheBucket, chunk_ids: &[Uuid]) -> u64 {
		let mut keys = HashSet::new();
		let mut tags = Vec::with_capacity(chunk_ids.len());

		for chunk_id in chunk_ids {
			let tag = tag_key(bucket, *chunk_id);

			match self.kv.set_members(&tag).await {
				Ok(members) => keys.extend(members),
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_kind = bucket.as_str(),
						chunk_id = %chunk_id,
						"Cache tag read failed during invalidation."
					);
				},
			}

			tags.push(tag);
		}

		let keys: Vec<String> = keys.into_iter().collect();
		let evicted = match self.kv.delete(&keys).await {
			Ok(count) => count,
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = bucket.as_str(),
					"Cache eviction failed."
				);

				0
			},
		};

		if let Err(err) = self.kv.delete(&tags).await {
			tracing::warn!(
				error = %err,
				cache_kind = bucket.as_str(),
				"Cache tag cleanup failed."
			);
		}

		evicted
	}

	/// Evicts the whole bucket by key prefix.
	pub async fn invalidate_bucket(&self, bucket: CacheBucket) -> u64 {
		let prefix = format!("{KEY_NAMESPACE}:{}:", bucket.as_str());

		match self.kv.delete_prefix(&prefix).await {
			Ok(count) => count,
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = bucket.as_str(),
					"Bucket eviction failed."
				);

				0
			},
		}
	}
}

fn storage_key(bucket: CacheBucket, key: &str) -> String {
	format!("{KEY_NAMESPACE}:{}:{key}", bucket.as_str())
}

fn tag_key(bucket: CacheBucket, chunk_id: Uuid) -> String {
	format!("{KEY_NAMESPACE}:tag:{}:{chunk_id}", bucket.as_str())
}
