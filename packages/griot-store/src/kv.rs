use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use redis::{AsyncCommands, aio::ConnectionManager};

use crate::{BoxFuture, Result};

const RELEASE_SCRIPT: &str = "\
if redis.call('GET', KEYS[1]) == ARGV[1] then return redis.call('DEL', KEYS[1]) else return 0 end";

/// The shared, durable key-value/lock store behind the stage cache and the
/// in-flight coordinator. Every mutation is a single atomic operation
/// against the backing store; there is no read-modify-write across process
/// instances.
pub trait KvStore: Send + Sync {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>>;
	fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<u64>>;
	/// Removes every key with the given prefix before returning.
	fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<u64>>;
	/// Atomic SET-if-absent with a TTL; the lock primitive. Returns whether
	/// this caller became the holder.
	fn put_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Duration,
	) -> BoxFuture<'a, Result<bool>>;
	/// Deletes the key only while it still holds `value`, so a holder never
	/// releases a lock that has already been re-acquired by someone else.
	fn delete_if_value<'a>(&'a self, key: &'a str, value: &'a str)
	-> BoxFuture<'a, Result<bool>>;
	fn add_to_set<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>>;
	fn set_members<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}

#[derive(Clone)]
pub struct RedisKv {
	manager: ConnectionManager,
}
impl RedisKv {
	pub async fn connect(url: &str) -> Result<Self> {
		let client = redis::Client::open(url)?;
		let manager = ConnectionManager::new(client).await?;

		Ok(Self { manager })
	}
}
impl KvStore for RedisKv {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
		let mut conn = self.manager.clone();

		Box::pin(async move {
			let value: Option<String> = conn.get(key).await?;

			Ok(value)
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>> {
		let mut conn = self.manager.clone();

		Box::pin(async move {
			let mut cmd = redis::cmd("SET");

			cmd.arg(key).arg(value);

			if let Some(ttl) = ttl {
				cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
			}

			let _: () = cmd.query_async(&mut conn).await?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<u64>> {
		let mut conn = self.manager.clone();

		Box::pin(async move {
			if keys.is_empty() {
				return Ok(0);
			}

			let removed: u64 = conn.del(keys).await?;

			Ok(removed)
		})
	}

	fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<u64>> {
		let mut scan_conn = self.manager.clone();
		let mut del_conn = self.manager.clone();

		Box::pin(async move {
			let pattern = format!("{prefix}*");
			let mut keys = Vec::new();
			let mut iter = scan_conn.scan_match::<_, String>(pattern).await?;

			while let Some(key) = iter.next_item().await {
				keys.push(key);
			}

			drop(iter);

			if keys.is_empty() {
				return Ok(0);
			}

			let removed: u64 = del_conn.del(&keys).await?;

			Ok(removed)
		})
	}

	fn put_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Duration,
	) -> BoxFuture<'a, Result<bool>> {
		let mut conn = self.manager.clone();

		Box::pin(async move {
			let reply: Option<String> = redis::cmd("SET")
				.arg(key)
				.arg(value)
				.arg("NX")
				.arg("PX")
				.arg(ttl.as_millis().max(1) as u64)
				.query_async(&mut conn)
				.await?;

			Ok(reply.is_some())
		})
	}

	fn delete_if_value<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
	) -> BoxFuture<'a, Result<bool>> {
		let mut conn = self.manager.clone();

		Box::pin(async move {
			let removed: i64 = redis::Script::new(RELEASE_SCRIPT)
				.key(key)
				.arg(value)
				.invoke_async(&mut conn)
				.await?;

			Ok(removed > 0)
		})
	}

	fn add_to_set<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>> {
		let mut conn = self.manager.clone();

		Box::pin(async move {
			let mut pipe = redis::pipe();

			pipe.atomic().sadd(key, member).ignore();

			if let Some(ttl) = ttl {
				pipe.expire(key, ttl.as_secs().max(1) as i64).ignore();
			}

			let _: () = pipe.query_async(&mut conn).await?;

			Ok(())
		})
	}

	fn set_members<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		let mut conn = self.manager.clone();

		Box::pin(async move {
			let members: Vec<String> = conn.smembers(key).await?;

			Ok(members)
		})
	}
}

struct MemoryEntry {
	value: String,
	expires_at: Option<Instant>,
}

struct MemorySet {
	members: HashSet<String>,
	expires_at: Option<Instant>,
}

#[derive(Default)]
struct MemoryKvInner {
	entries: Mutex<HashMap<String, MemoryEntry>>,
	sets: Mutex<HashMap<String, MemorySet>>,
}

/// In-process implementation of the store contract, used by tests and
/// single-node deployments. Expiry is enforced on read: an expired entry is
/// absent, never stale.
#[derive(Clone, Default)]
pub struct MemoryKv {
	inner: Arc<MemoryKvInner>,
}
impl MemoryKv {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>> {
		self.inner.entries.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn lock_sets(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemorySet>> {
		self.inner.sets.lock().unwrap_or_else(|err| err.into_inner())
	}
}

fn expired(expires_at: Option<Instant>, now: Instant) -> bool {
	expires_at.map(|at| at <= now).unwrap_or(false)
}

impl KvStore for MemoryKv {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move {
			let now = Instant::now();
			let mut entries = self.lock_entries();

			if entries.get(key).map(|entry| expired(entry.expires_at, now)).unwrap_or(false) {
				entries.remove(key);
			}

			Ok(entries.get(key).map(|entry| entry.value.clone()))
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.lock_entries().insert(key.to_string(), MemoryEntry {
				value: value.to_string(),
				expires_at: ttl.map(|ttl| Instant::now() + ttl),
			});

			Ok(())
		})
	}

	fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut entries = self.lock_entries();
			let mut removed = 0;

			for key in keys {
				if entries.remove(key).is_some() {
					removed += 1;
				}
			}

			Ok(removed)
		})
	}

	fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut entries = self.lock_entries();
			let before = entries.len();

			entries.retain(|key, _| !key.starts_with(prefix));

			Ok((before - entries.len()) as u64)
		})
	}

	fn put_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Duration,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let now = Instant::now();
			let mut entries = self.lock_entries();

			if entries.get(key).map(|entry| expired(entry.expires_at, now)).unwrap_or(false) {
				entries.remove(key);
			}
			if entries.contains_key(key) {
				return Ok(false);
			}

			entries.insert(key.to_string(), MemoryEntry {
				value: value.to_string(),
				expires_at: Some(now + ttl),
			});

			Ok(true)
		})
	}

	fn delete_if_value<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut entries = self.lock_entries();

			if entries.get(key).map(|entry| entry.value == value).unwrap_or(false) {
				entries.remove(key);

				return Ok(true);
			}

			Ok(false)
		})
	}

	fn add_to_set<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = Instant::now();
			let mut sets = self.lock_sets();

			if sets.get(key).map(|set| expired(set.expires_at, now)).unwrap_or(false) {
				sets.remove(key);
			}

			let set = sets.entry(key.to_string()).or_insert_with(|| MemorySet {
				members: HashSet::new(),
				expires_at: None,
			});

			set.members.insert(member.to_string());
			set.expires_at = ttl.map(|ttl| now + ttl);

			Ok(())
		})
	}

	fn set_members<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			let now = Instant::now();
			let mut sets = self.lock_sets();

			if sets.get(key).map(|set| expired(set.expires_at, now)).unwrap_or(false) {
				sets.remove(key);
			}

			Ok(sets
				.get(key)
				.map(|set| set.members.iter().cloned().collect())
				.unwrap_or_default())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn expired_entries_read_as_absent() {
		let kv = MemoryKv::new();

		kv.put("k", "v", Some(Duration::from_millis(30))).await.expect("put failed");

		assert_eq!(kv.get("k").await.expect("get failed"), Some("v".to_string()));

		tokio::time::sleep(Duration::from_millis(60)).await;

		assert_eq!(kv.get("k").await.expect("get failed"), None);
	}

	#[tokio::test]
	async fn put_if_absent_admits_exactly_one_holder() {
		let kv = MemoryKv::new();
		let lease = Duration::from_millis(50);

		assert!(kv.put_if_absent("lock", "a", lease).await.expect("cas failed"));
		assert!(!kv.put_if_absent("lock", "b", lease).await.expect("cas failed"));

		tokio::time::sleep(Duration::from_millis(80)).await;

		// Lease expired; a new holder may be elected.
		assert!(kv.put_if_absent("lock", "c", lease).await.expect("cas failed"));
	}

	#[tokio::test]
	async fn delete_if_value_only_releases_own_lock() {
		let kv = MemoryKv::new();

		kv.put("lock", "holder-a", None).await.expect("put failed");

		assert!(!kv.delete_if_value("lock", "holder-b").await.expect("release failed"));
		assert!(kv.delete_if_value("lock", "holder-a").await.expect("release failed"));
		assert_eq!(kv.get("lock").await.expect("get failed"), None);
	}

	#[tokio::test]
	async fn delete_prefix_removes_all_matches() {
		let kv = MemoryKv::new();

		kv.put("answer:1", "a", None).await.expect("put failed");
		kv.put("answer:2", "b", None).await.expect("put failed");
		kv.put("rewrite:1", "c", None).await.expect("put failed");

		let removed = kv.delete_prefix("answer:").await.expect("delete failed");

		assert_eq!(removed, 2);
		assert_eq!(kv.get("rewrite:1").await.expect("get failed"), Some("c".to_string()));
	}

	#[tokio::test]
	async fn set_members_round_trip() {
		let kv = MemoryKv::new();

		kv.add_to_set("tag", "k1", None).await.expect("sadd failed");
		kv.add_to_set("tag", "k2", None).await.expect("sadd failed");
		kv.add_to_set("tag", "k1", None).await.expect("sadd failed");

		let mut members = kv.set_members("tag").await.expect("smembers failed");

		members.sort();

		assert_eq!(members, vec!["k1".to_string(), "k2".to_string()]);
	}
}
