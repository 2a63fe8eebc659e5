//! Shared-store protocol for cached credentials and lock state.
//!
//! Every process in a fleet points at the same backing key-value store. The broker only needs
//! plain get/set for cache records plus three atomic primitives for the distributed lock:
//! set-if-absent with expiry, compare-and-delete, and compare-and-expire. Any backend that
//! offers those can implement [`SharedStore`]; Redis-compatible backends run
//! [`RELEASE_SCRIPT`] and [`EXTEND_SCRIPT`] to get the compare operations atomically.

pub mod memory;

pub use memory::MemoryStore;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{CredentialClass, TenantId},
};

/// Compare-and-delete script (`KEYS[1]` = lock key, `ARGV[1]` = owner value).
pub const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
	return redis.call("del", KEYS[1])
else
	return 0
end
"#;
/// Compare-and-expire script (`ARGV[2]` = new lease in milliseconds).
pub const EXTEND_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
	return redis.call("pexpire", KEYS[1], ARGV[2])
else
	return 0
end
"#;

/// Boxed future returned by [`SharedStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Backing key-value store shared by every broker process.
///
/// Mutations must go through [`SharedStore::set`] (cache writes) or one of the atomic
/// compare operations (lock state). Implementations must never emulate the compare operations
/// with a separate read followed by a write.
pub trait SharedStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, treating expired entries as absent.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Unconditionally writes `value`, replacing any previous value and expiry.
	fn set<'a>(&'a self, key: &'a str, value: String, ttl: Option<Duration>)
	-> StoreFuture<'a, ()>;

	/// Writes `value` with `ttl` only when `key` is absent; returns whether the write happened.
	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool>;

	/// Deletes `key` only when it still holds `expected`; returns whether it was deleted.
	fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool>;

	/// Resets the expiry of `key` to `ttl` only when it still holds `expected`.
	fn expire_if_equals<'a>(
		&'a self,
		key: &'a str,
		expected: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool>;
}
impl dyn SharedStore {
	/// Reads and decodes a JSON value.
	pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned,
	{
		match self.get(key).await? {
			Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to decode `{key}`: {e}") }
			}),
			None => Ok(None),
		}
	}

	/// Encodes and writes a JSON value.
	pub async fn set_json<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), StoreError>
	where
		T: ?Sized + Serialize,
	{
		let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode `{key}`: {e}"),
		})?;

		self.set(key, raw, ttl).await
	}
}

/// Error type produced by [`SharedStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding cached values.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Builds the stable, collision-free key layout used in the shared store.
///
/// Platform-level records live under `<namespace>:component:<tenant>:<suffix>` and per-account
/// records under `<namespace>:<tenant>:<suffix>`. Tenant identifiers cannot contain `:`, so the
/// two spaces never overlap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKeys {
	namespace: String,
}
impl CacheKeys {
	/// Creates a key builder rooted at `namespace`.
	pub fn new(namespace: impl Into<String>) -> Self {
		Self { namespace: namespace.into() }
	}

	/// Returns the root namespace.
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Key of the cached credential for `(tenant, class)`.
	pub fn credential(&self, tenant: &TenantId, class: CredentialClass) -> String {
		self.scoped(tenant, class, "token")
	}

	/// Key of the refresh lock for `(tenant, class)`.
	pub fn lock(&self, tenant: &TenantId, class: CredentialClass) -> String {
		self.scoped(tenant, class, "lock")
	}

	/// Key of the pushed verification ticket for a platform tenant.
	pub fn ticket(&self, tenant: &TenantId) -> String {
		self.scoped(tenant, CredentialClass::Platform, "ticket")
	}

	/// Key of the cached account-info lookup for an authorized account.
	pub fn authorizer_info(&self, tenant: &TenantId) -> String {
		self.scoped(tenant, CredentialClass::Account, "authorizer")
	}

	fn scoped(&self, tenant: &TenantId, class: CredentialClass, suffix: &str) -> String {
		match class {
			CredentialClass::Platform => format!("{}:component:{tenant}:{suffix}", self.namespace),
			CredentialClass::Account => format!("{}:{tenant}:{suffix}", self.namespace),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn tenant(value: &str) -> TenantId {
		TenantId::new(value).expect("Tenant fixture should be valid.")
	}

	#[test]
	fn keys_follow_namespace_layout() {
		let keys = CacheKeys::new("wechat");
		let platform = tenant("wxcomponent");
		let account = tenant("wxaccount");

		assert_eq!(
			keys.credential(&platform, CredentialClass::Platform),
			"wechat:component:wxcomponent:token"
		);
		assert_eq!(keys.lock(&platform, CredentialClass::Platform), "wechat:component:wxcomponent:lock");
		assert_eq!(keys.ticket(&platform), "wechat:component:wxcomponent:ticket");
		assert_eq!(keys.credential(&account, CredentialClass::Account), "wechat:wxaccount:token");
		assert_eq!(keys.lock(&account, CredentialClass::Account), "wechat:wxaccount:lock");
		assert_eq!(keys.authorizer_info(&account), "wechat:wxaccount:authorizer");
	}

	#[test]
	fn keys_never_collide_across_classes() {
		let keys = CacheKeys::new("ns");
		let component = tenant("component");
		let same = tenant("same");
		let mut all = vec![
			keys.credential(&same, CredentialClass::Platform),
			keys.credential(&same, CredentialClass::Account),
			keys.lock(&same, CredentialClass::Platform),
			keys.lock(&same, CredentialClass::Account),
			keys.ticket(&same),
			keys.authorizer_info(&same),
			keys.credential(&component, CredentialClass::Account),
			keys.lock(&component, CredentialClass::Account),
		];
		let total = all.len();

		all.sort();
		all.dedup();

		assert_eq!(all.len(), total);
	}

	#[test]
	fn scripts_compare_before_mutating() {
		assert!(RELEASE_SCRIPT.contains(r#"redis.call("get", KEYS[1]) == ARGV[1]"#));
		assert!(RELEASE_SCRIPT.contains(r#"redis.call("del", KEYS[1])"#));
		assert!(EXTEND_SCRIPT.contains(r#"redis.call("pexpire", KEYS[1], ARGV[2])"#));
	}
}
