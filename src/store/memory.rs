//! Thread-safe in-memory [`SharedStore`] for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	store::{SharedStore, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, Entry>>>;

#[derive(Clone, Debug)]
struct Entry {
	value: String,
	expires_at: Option<OffsetDateTime>,
}
impl Entry {
	fn new(value: String, ttl: Option<Duration>, now: OffsetDateTime) -> Self {
		Self { value, expires_at: ttl.map(|ttl| now + ttl) }
	}

	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|deadline| now < deadline)
	}
}

/// Storage backend that keeps entries in-process; every operation runs under one write lock,
/// which makes the compare primitives atomic.
///
/// Clones share the same map, so several brokers built from clones behave like processes that
/// share one backing store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of live entries; expired entries are purged first.
	pub fn len(&self) -> usize {
		let now = OffsetDateTime::now_utc();
		let mut guard = self.0.write();

		guard.retain(|_, entry| entry.is_live_at(now));

		guard.len()
	}

	/// Returns `true` when no live entry remains.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Remaining lifetime of `key`, `None` when absent or stored without expiry.
	pub fn ttl(&self, key: &str) -> Option<Duration> {
		let now = OffsetDateTime::now_utc();
		let guard = self.0.read();

		guard.get(key).filter(|entry| entry.is_live_at(now)).and_then(|entry| entry.expires_at).map(
			|deadline| deadline - now,
		)
	}

	fn get_now(map: &StoreMap, key: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		match guard.get(key) {
			Some(entry) if entry.is_live_at(now) => Some(entry.value.clone()),
			Some(_) => {
				guard.remove(key);

				None
			},
			None => None,
		}
	}

	fn set_now(map: &StoreMap, key: &str, value: String, ttl: Option<Duration>) {
		let now = OffsetDateTime::now_utc();

		map.write().insert(key.to_owned(), Entry::new(value, ttl, now));
	}

	fn set_if_absent_now(map: &StoreMap, key: &str, value: &str, ttl: Duration) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		if guard.get(key).is_some_and(|entry| entry.is_live_at(now)) {
			return false;
		}

		guard.insert(key.to_owned(), Entry::new(value.to_owned(), Some(ttl), now));

		true
	}

	fn delete_if_equals_now(map: &StoreMap, key: &str, expected: &str) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();
		let matches =
			guard.get(key).is_some_and(|entry| entry.is_live_at(now) && entry.value == expected);

		if matches {
			guard.remove(key);
		}

		matches
	}

	fn expire_if_equals_now(map: &StoreMap, key: &str, expected: &str, ttl: Duration) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		match guard.get_mut(key) {
			Some(entry) if entry.is_live_at(now) && entry.value == expected => {
				entry.expires_at = Some(now + ttl);

				true
			},
			_ => false,
		}
	}
}
impl SharedStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(Self::get_now(&self.0, key)) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			if ttl.is_some_and(|ttl| !ttl.is_positive()) {
				return Err(StoreError::Backend {
					message: format!("Refusing to store `{key}` with a non-positive TTL"),
				});
			}

			Self::set_now(&self.0, key, value, ttl);

			Ok(())
		})
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(Self::set_if_absent_now(&self.0, key, value, ttl)) })
	}

	fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(Self::delete_if_equals_now(&self.0, key, expected)) })
	}

	fn expire_if_equals<'a>(
		&'a self,
		key: &'a str,
		expected: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(Self::expire_if_equals_now(&self.0, key, expected, ttl)) })
	}
}
