//! Distributed mutual exclusion over a [`SharedStore`].
//!
//! A lock key is either unheld or held by exactly one owner value until its lease runs out.
//! [`LockManager::acquire`] claims the key with a single set-if-absent-with-expiry call and
//! retries a bounded number of times with a fixed delay. Release and extend are compare
//! operations keyed on the owner value, so a holder whose lease already lapsed (and whose key
//! may have been claimed by someone else) can never delete or prolong a foreign lock.
//!
//! Mutual exclusion holds only while the lease outlives the critical section. Pick a lease
//! longer than the expected remote latency or call [`LockManager::extend`] from long bodies.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs,
	store::SharedStore,
};

/// Tunables for [`LockManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockOptions {
	/// Lease used when callers do not pass one.
	#[serde(with = "duration_millis")]
	pub lease: Duration,
	/// Additional attempts after the first failed acquisition.
	pub retry_count: u32,
	/// Fixed pause between attempts.
	#[serde(with = "duration_millis")]
	pub retry_delay: Duration,
}
impl LockOptions {
	/// Overrides the default lease.
	pub fn with_lease(mut self, lease: Duration) -> Self {
		self.lease = lease;

		self
	}

	/// Overrides the retry count.
	pub fn with_retry_count(mut self, retry_count: u32) -> Self {
		self.retry_count = retry_count;

		self
	}

	/// Overrides the retry delay.
	pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
		self.retry_delay = retry_delay;

		self
	}

	/// Upper bound of time spent waiting inside [`LockManager::acquire`] (excluding store latency).
	pub fn max_wait(&self) -> Duration {
		self.retry_delay * self.retry_count
	}
}
impl Default for LockOptions {
	fn default() -> Self {
		Self {
			lease: Duration::seconds(10),
			retry_count: 3,
			retry_delay: Duration::milliseconds(200),
		}
	}
}

/// Proof of ownership returned by a successful acquisition.
#[derive(Clone, PartialEq, Eq)]
pub struct LockToken {
	key: String,
	owner: String,
	lease: Duration,
}
impl LockToken {
	/// Resource key the lock guards.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Random owner value stored under the key.
	pub fn owner(&self) -> &str {
		&self.owner
	}

	/// Lease requested at acquisition (or the last successful extension).
	pub fn lease(&self) -> Duration {
		self.lease
	}
}
impl Debug for LockToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LockToken")
			.field("key", &self.key)
			.field("owner", &"<redacted>")
			.field("lease", &self.lease)
			.finish()
	}
}

/// Lock coordinator shared by every flow of a broker; construct once and pass it down.
#[derive(Clone)]
pub struct LockManager {
	store: Arc<dyn SharedStore>,
	options: LockOptions,
}
impl LockManager {
	/// Creates a manager over `store`.
	pub fn new(store: Arc<dyn SharedStore>, options: LockOptions) -> Self {
		Self { store, options }
	}

	/// Active options.
	pub fn options(&self) -> &LockOptions {
		&self.options
	}

	/// Tries to claim `key` for `lease` (or the default lease).
	///
	/// Returns `Ok(None)` once `retry_count + 1` attempts have failed; never blocks beyond
	/// [`LockOptions::max_wait`] plus store latency.
	pub async fn acquire(&self, key: &str, lease: Option<Duration>) -> Result<Option<LockToken>> {
		let lease = lease.unwrap_or(self.options.lease);

		if !lease.is_positive() {
			return Err(ConfigError::NonPositiveLease.into());
		}

		let owner = new_owner_value();

		for attempt in 0..=self.options.retry_count {
			if self.store.set_if_absent(key, &owner, lease).await? {
				return Ok(Some(LockToken { key: key.to_owned(), owner, lease }));
			}
			if attempt < self.options.retry_count {
				obs::note("lock_contended", key);

				tokio::time::sleep(self.options.retry_delay.unsigned_abs()).await;
			}
		}

		obs::note("lock_exhausted", key);

		Ok(None)
	}

	/// Deletes the lock if `token` still owns it.
	///
	/// `Ok(false)` means the lease had already lapsed (and possibly been re-claimed); it is
	/// informational, not an error.
	pub async fn release(&self, token: &LockToken) -> Result<bool> {
		let released = self.store.delete_if_equals(&token.key, &token.owner).await?;

		if !released {
			obs::note("lock_lapsed_before_release", &token.key);
		}

		Ok(released)
	}

	/// Resets the lease to `lease` if `token` still owns the lock.
	pub async fn extend(&self, token: &mut LockToken, lease: Duration) -> Result<bool> {
		if !lease.is_positive() {
			return Err(ConfigError::NonPositiveLease.into());
		}

		let extended = self.store.expire_if_equals(&token.key, &token.owner, lease).await?;

		if extended {
			token.lease = lease;
		}

		Ok(extended)
	}

	/// Runs `body` while holding `key`, releasing afterwards whatever `body` returned.
	///
	/// Fails with [`Error::LockUnavailable`] when the lock is never acquired; `body` is not run in
	/// that case. A failed release is reported through tracing only, since the lease bounds it.
	pub async fn with_lock<T, F, Fut>(
		&self,
		key: &str,
		lease: Option<Duration>,
		body: F,
	) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let token = self
			.acquire(key, lease)
			.await?
			.ok_or_else(|| Error::LockUnavailable { key: key.to_owned() })?;
		let outcome = body().await;

		if self.release(&token).await.is_err() {
			obs::note("lock_release_failed", key);
		}

		outcome
	}
}
impl Debug for LockManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LockManager").field("options", &self.options).finish()
	}
}

fn new_owner_value() -> String {
	hex::encode(rand::random::<[u8; 16]>())
}

pub(crate) mod duration_millis {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};
	use time::Duration;

	pub(crate) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(i64::try_from(value.whole_milliseconds()).unwrap_or(i64::MAX))
	}

	pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::milliseconds)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn manager(retry_count: u32, retry_delay_ms: i64) -> (LockManager, MemoryStore) {
		let store = MemoryStore::default();
		let options = LockOptions::default()
			.with_retry_count(retry_count)
			.with_retry_delay(Duration::milliseconds(retry_delay_ms));

		(LockManager::new(Arc::new(store.clone()), options), store)
	}

	#[tokio::test]
	async fn acquire_then_release() {
		let (locks, store) = manager(0, 10);
		let token = locks
			.acquire("res", Some(Duration::seconds(5)))
			.await
			.expect("Acquire should not fail.")
			.expect("Free lock should be granted.");

		assert_eq!(token.key(), "res");
		assert_eq!(token.owner().len(), 32);
		assert_eq!(store.get("res").await.expect("Read."), Some(token.owner().to_owned()));
		assert!(locks.release(&token).await.expect("Release should not fail."));
		assert!(!locks.release(&token).await.expect("Second release should not fail."));
		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn debug_output_hides_owner_value() {
		let (locks, _store) = manager(0, 10);
		let token = locks.acquire("res", None).await.expect("Acquire.").expect("Granted.");
		let rendered = format!("{token:?}");

		assert!(rendered.contains("res"));
		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains(token.owner()));
	}

		#[tokio::test]
	async fn held_lock_exhausts_retries() {
		let (locks, _store) = manager(2, 5);
		let _held = locks.acquire("res", None).await.expect("Acquire.").expect("Granted.");
		let started = std::time::Instant::now();
		let second = locks.acquire("res", None).await.expect("Acquire should not fail.");

		assert!(second.is_none());
		assert!(started.elapsed() >= std::time::Duration::from_millis(10));
	}

	#[tokio::test]
	async fn waiter_succeeds_after_release() {
		let (locks, _store) = manager(20, 10);
		let first = locks.acquire("res", None).await.expect("Acquire.").expect("Granted.");
		let waiter = {
			let locks = locks.clone();

			tokio::spawn(async move { locks.acquire("res", None).await })
		};

		tokio::time::sleep(std::time::Duration::from_millis(30)).await;
		locks.release(&first).await.expect("Release should not fail.");

		let second = waiter
			.await
			.expect("Waiter task should not panic.")
			.expect("Acquire should not fail.")
			.expect("Waiter should obtain the lock after release.");

		assert_ne!(second.owner(), first.owner());
	}

	#[tokio::test]
	async fn stale_owner_cannot_release_reclaimed_lock() {
		let (locks, store) = manager(0, 10);
		let stale = locks
			.acquire("res", Some(Duration::milliseconds(20)))
			.await
			.expect("Acquire.")
			.expect("Granted.");

		tokio::time::sleep(std::time::Duration::from_millis(40)).await;

		let current = locks.acquire("res", None).await.expect("Acquire.").expect("Reclaimed.");

		assert!(!locks.release(&stale).await.expect("Stale release should not fail."));
		assert_eq!(store.get("res").await.expect("Read."), Some(current.owner().to_owned()));

		let mut stale = stale;

		assert!(!locks.extend(&mut stale, Duration::seconds(30)).await.expect("Stale extend."));
	}

	#[tokio::test]
	async fn extend_prolongs_owned_lease() {
		let (locks, store) = manager(0, 10);
		let mut token = locks
			.acquire("res", Some(Duration::milliseconds(50)))
			.await
			.expect("Acquire.")
			.expect("Granted.");

		assert!(locks.extend(&mut token, Duration::seconds(30)).await.expect("Extend."));
		assert_eq!(token.lease(), Duration::seconds(30));

		tokio::time::sleep(std::time::Duration::from_millis(80)).await;

		assert!(store.get("res").await.expect("Read.").is_some(), "Extended lock must survive.");
	}

	#[tokio::test]
	async fn non_positive_lease_is_rejected() {
		let (locks, _store) = manager(0, 10);
		let err = locks
			.acquire("res", Some(Duration::ZERO))
			.await
			.expect_err("Zero lease must be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::NonPositiveLease)));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_acquires_grant_single_owner() {
		let (locks, _store) = manager(0, 10);
		let attempts = (0..16).map(|_| {
			let locks = locks.clone();

			tokio::spawn(async move { locks.acquire("contended", Some(Duration::seconds(5))).await })
		});
		let mut granted = 0;

		for attempt in attempts.collect::<Vec<_>>() {
			if attempt.await.expect("Task should not panic.").expect("Acquire should not fail.").is_some() {
				granted += 1;
			}
		}

		assert_eq!(granted, 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn with_lock_serializes_bodies() {
		let (locks, _store) = manager(200, 5);
		let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));
		let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
		let tasks = (0..8)
			.map(|_| {
				let locks = locks.clone();
				let inside = inside.clone();
				let max_seen = max_seen.clone();

				tokio::spawn(async move {
					locks
						.with_lock("critical", Some(Duration::seconds(5)), || async {
							let now = inside.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;

							max_seen.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
							tokio::time::sleep(std::time::Duration::from_millis(5)).await;
							inside.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);

							Ok(())
						})
						.await
				})
			})
			.collect::<Vec<_>>();

		for task in tasks {
			task.await.expect("Task should not panic.").expect("Every body should eventually run.");
		}

		assert_eq!(max_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn with_lock_releases_after_body_error() {
		let (locks, store) = manager(0, 10);
		let err = locks
			.with_lock("res", None, || async {
				Err::<(), _>(Error::LockUnavailable { key: "inner".into() })
			})
			.await
			.expect_err("Body error should propagate.");

		assert!(matches!(err, Error::LockUnavailable { key } if key == "inner"));
		assert!(store.is_empty(), "Lock must be released even when the body fails.");
	}

	#[tokio::test]
	async fn with_lock_fails_fast_when_unavailable() {
		let (locks, _store) = manager(1, 5);
		let _held = locks.acquire("res", None).await.expect("Acquire.").expect("Granted.");
		let mut ran = false;
		let err = locks
			.with_lock("res", None, || {
				ran = true;

				async { Ok(()) }
			})
			.await
			.expect_err("Contended lock should fail.");

		assert!(matches!(err, Error::LockUnavailable { key } if key == "res"));
		assert!(!ran);
	}

	#[test]
	fn options_deserialize_from_millis() {
		let options: LockOptions =
			serde_json::from_str(r#"{"lease":1500,"retry_delay":50}"#).expect("Options should parse.");

		assert_eq!(options.lease, Duration::milliseconds(1500));
		assert_eq!(options.retry_delay, Duration::milliseconds(50));
		assert_eq!(options.retry_count, 3);
		assert_eq!(options.max_wait(), Duration::milliseconds(150));
	}
}
