use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use tokio::sync::watch;
use uuid::Uuid;

use griot_store::KvStore;

use crate::{StageFailure, keys::cache_key_prefix};

const LOCK_NAMESPACE: &str = "griot:flight";
const REMOTE_POLL_FLOOR: Duration = Duration::from_millis(25);
const REMOTE_POLL_CEILING: Duration = Duration::from_millis(250);
const LEASE_SLACK: Duration = Duration::from_millis(100);

/// What a leader broadcasts to its followers: the stage's JSON value or the
/// failure every follower must observe identically.
#[derive(Debug, Clone)]
pub enum FlightOutcome {
	Ok(serde_json::Value),
	Failed(StageFailure),
}

type Slot = watch::Sender<Option<FlightOutcome>>;

struct FlightInner {
	kv: Arc<dyn KvStore>,
	lease: Duration,
	channels: Mutex<HashMap<String, Slot>>,
}
impl FlightInner {
	fn lock_channels(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
		self.channels.lock().unwrap_or_else(|err| err.into_inner())
	}
}

/// The role handed to a caller for one keyed unit of expensive work.
pub enum Flight {
	Leader(FlightGuard),
	Follower(watch::Receiver<Option<FlightOutcome>>),
	/// The lock is held by another process instance; there is no local
	/// channel to join. Callers wait out the lease and retry.
	Remote,
	/// The lock store is unavailable. Callers degrade to undeduplicated
	/// computation rather than failing the request.
	Bypass,
}

/// Collapses duplicate concurrent work on an identical key into one
/// execution. Leadership is an atomic SET-if-absent on the shared lock store
/// with a bounded lease; followers wait on a watch channel, never by
/// recomputing and never by polling the leader's result.
#[derive(Clone)]
pub struct InFlightCoordinator {
	inner: Arc<FlightInner>,
}
impl InFlightCoordinator {
	pub fn new(kv: Arc<dyn KvStore>, lease: Duration) -> Self {
		Self { inner: Arc::new(FlightInner { kv, lease, channels: Mutex::new(HashMap::new()) }) }
	}

	pub fn lease(&self) -> Duration {
		self.inner.lease
	}

	pub async fn join(&self, key: &str) -> Flight {
		let lock_key = lock_key(key);
		let token = Uuid::new_v4().to_string();

		match self.inner.kv.put_if_absent(&lock_key, &token, self.inner.lease).await {
			Ok(true) => {
				let (tx, _rx) = watch::channel(None);

				self.inner.lock_channels().insert(key.to_string(), tx);

				Flight::Leader(FlightGuard {
					inner: self.inner.clone(),
					key: key.to_string(),
					token,
					published: false,
				})
			},
			Ok(false) => match self.inner.lock_channels().get(key) {
				Some(tx) => Flight::Follower(tx.subscribe()),
				None => Flight::Remote,
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_key_prefix = cache_key_prefix(key),
					"Lock store unavailable; proceeding without dedup."
				);

				Flight::Bypass
			},
		}
	}

	/// Waits for the leader's broadcast, bounded by the lease plus slack.
	/// `None` means the lease expired without an outcome; the caller may
	/// re-elect. A caller dropping this wait cancels only its own slot,
	/// never the leader's computation.
	pub async fn await_outcome(
		&self,
		mut rx: watch::Receiver<Option<FlightOutcome>>,
	) -> Option<FlightOutcome> {
		let wait = async move {
			loop {
				let current = rx.borrow_and_update().clone();

				if let Some(outcome) = current {
					return Some(outcome);
				}
				if rx.changed().await.is_err() {
					return rx.borrow().clone();
				}
			}
		};

		tokio::time::timeout(self.inner.lease + LEASE_SLACK, wait).await.unwrap_or(None)
	}

	/// Waits for a holder in another process instance to release or for its
	/// lease to lapse, with capped backoff. This is the cross-process
	/// degraded path; in-process followers use the watch channel instead.
	pub async fn wait_remote(&self, key: &str) {
		let lock_key = lock_key(key);
		let deadline = Instant::now() + self.inner.lease + LEASE_SLACK;
		let mut backoff = REMOTE_POLL_FLOOR;

		while Instant::now() < deadline {
			match self.inner.kv.get(&lock_key).await {
				Ok(None) | Err(_) => return,
				Ok(Some(_)) => {},
			}

			tokio::time::sleep(backoff).await;

			backoff = (backoff * 2).min(REMOTE_POLL_CEILING);
		}
	}
}

/// Held by the one leader per key. Publishing broadcasts the outcome to all
/// followers and releases the lock with a compare-and-delete, so a holder
/// whose lease already lapsed never releases a successor's lock. Dropping
/// the guard without publishing broadcasts a retryable failure instead of
/// leaving followers waiting for the full lease.
pub struct FlightGuard {
	inner: Arc<FlightInner>,
	key: String,
	token: String,
	published: bool,
}
impl FlightGuard {
	pub async fn publish(mut self, outcome: FlightOutcome) {
		self.published = true;

		if let Some(tx) = self.inner.lock_channels().remove(&self.key) {
			let _ = tx.send(Some(outcome));
		}
		if let Err(err) = self.inner.kv.delete_if_value(&lock_key(&self.key), &self.token).await {
			tracing::warn!(
				error = %err,
				cache_key_prefix = cache_key_prefix(&self.key),
				"Lock release failed; lease will lapse on its own."
			);
		}
	}
}
impl Drop for FlightGuard {
	fn drop(&mut self) {
		if self.published {
			return;
		}
		if let Some(tx) = self.inner.lock_channels().remove(&self.key) {
			let _ = tx.send(Some(FlightOutcome::Failed(StageFailure {
				service: "pipeline".to_string(),
				message: "Leader aborted before publishing a result.".to_string(),
				retryable: true,
			})));
		}

		let inner = self.inner.clone();
		let lock_key = lock_key(&self.key);
		let token = std::mem::take(&mut self.token);

		tokio::spawn(async move {
			let _ = inner.kv.delete_if_value(&lock_key, &token).await;
		});
	}
}

fn lock_key(key: &str) -> String {
	format!("{LOCK_NAMESPACE}:{key}")
}

#[cfg(test)]
mod tests {
	use super::*;
	use griot_store::MemoryKv;

	fn coordinator(lease: Duration) -> InFlightCoordinator {
		InFlightCoordinator::new(Arc::new(MemoryKv::new()), lease)
	}

	#[tokio::test]
	async fn one_leader_per_key_and_followers_share_the_result() {
		let flights = coordinator(Duration::from_secs(5));
		let Flight::Leader(guard) = flights.join("k").await else {
			panic!("first caller must lead");
		};
		let Flight::Follower(rx) = flights.join("k").await else {
			panic!("second caller must follow");
		};

		guard.publish(FlightOutcome::Ok(serde_json::json!({"value": 7}))).await;

		match flights.await_outcome(rx).await {
			Some(FlightOutcome::Ok(value)) => assert_eq!(value["value"], 7),
			other => panic!("unexpected outcome: {other:?}"),
		}
	}

	#[tokio::test]
	async fn unrelated_keys_lead_in_parallel() {
		let flights = coordinator(Duration::from_secs(5));

		assert!(matches!(flights.join("a").await, Flight::Leader(_)));
		assert!(matches!(flights.join("b").await, Flight::Leader(_)));
	}

	#[tokio::test]
	async fn leader_failure_reaches_every_follower() {
		let flights = coordinator(Duration::from_secs(5));
		let Flight::Leader(guard) = flights.join("k").await else {
			panic!("first caller must lead");
		};
		let Flight::Follower(rx_a) = flights.join("k").await else {
			panic!("second caller must follow");
		};
		let Flight::Follower(rx_b) = flights.join("k").await else {
			panic!("third caller must follow");
		};

		guard
			.publish(FlightOutcome::Failed(StageFailure {
				service: "generation".to_string(),
				message: "boom".to_string(),
				retryable: true,
			}))
			.await;

		for rx in [rx_a, rx_b] {
			match flights.await_outcome(rx).await {
				Some(FlightOutcome::Failed(failure)) => assert_eq!(failure.message, "boom"),
				other => panic!("unexpected outcome: {other:?}"),
			}
		}
	}

	#[tokio::test]
	async fn dropped_guard_fails_followers_and_frees_the_key() {
		let flights = coordinator(Duration::from_secs(5));
		let Flight::Leader(guard) = flights.join("k").await else {
			panic!("first caller must lead");
		};
		let Flight::Follower(rx) = flights.join("k").await else {
			panic!("second caller must follow");
		};

		drop(guard);

		match flights.await_outcome(rx).await {
			Some(FlightOutcome::Failed(failure)) => assert!(failure.retryable),
			other => panic!("unexpected outcome: {other:?}"),
		}

		// The abandoned lock is released in the background.
		tokio::time::sleep(Duration::from_millis(50)).await;

		assert!(matches!(flights.join("k").await, Flight::Leader(_)));
	}

	#[tokio::test]
	async fn lease_expiry_allows_a_new_leader() {
		let flights = coordinator(Duration::from_millis(60));
		let Flight::Leader(guard) = flights.join("k").await else {
			panic!("first caller must lead");
		};
		let Flight::Follower(rx) = flights.join("k").await else {
			panic!("second caller must follow");
		};

		// The stalled leader never publishes; the follower times out on the
		// lease, then a fresh election succeeds.
		assert!(flights.await_outcome(rx).await.is_none());

		tokio::time::sleep(Duration::from_millis(80)).await;

		// Clear the stale local channel as a lapsed leader would on drop.
		std::mem::forget(guard);
		flights.inner.lock_channels().remove("k");

		assert!(matches!(flights.join("k").await, Flight::Leader(_)));
	}
}
