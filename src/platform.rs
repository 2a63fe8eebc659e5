//! Remote platform description plus broker-wide tunables.
//!
//! [`PlatformDescriptor`] lists the token-issuing endpoints the broker calls, [`ComponentConfig`]
//! holds the credentials provisioned for the platform tenant, and [`BrokerOptions`] carries the
//! cache and locking policy. All three are plain values built once at process start.

/// Builder API for assembling platform descriptors.
pub mod builder;
/// Provisioned platform credentials.
pub mod config;

pub use builder::*;
pub use config::*;

// self
use crate::{_prelude::*, error::ConfigError, lock::LockOptions};

/// Base URL of the open-platform component API.
pub const WECHAT_COMPONENT_API: &str = "https://api.weixin.qq.com/cgi-bin/component/";

/// Endpoint set declared by a platform descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEndpoints {
	/// Issues the platform-level credential from the verification ticket.
	pub component_token: Url,
	/// Refreshes a per-account credential from its refresh token.
	pub authorizer_token: Url,
	/// Looks up account info, including the account's refresh token.
	pub authorizer_info: Url,
	/// Exchanges an authorization code for the account's authorization info.
	pub query_auth: Url,
}

/// Immutable platform descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
	/// Human-readable label used in logs.
	pub name: String,
	/// Endpoint definitions exposed by the platform.
	pub endpoints: PlatformEndpoints,
}
impl PlatformDescriptor {
	/// Creates a new builder for the provided label.
	pub fn builder(name: impl Into<String>) -> PlatformDescriptorBuilder {
		PlatformDescriptorBuilder::new(name)
	}

	/// Descriptor for the WeChat open platform's component API.
	pub fn wechat_open_platform() -> Result<Self, PlatformDescriptorError> {
		PlatformDescriptorBuilder::new("wechat-open-platform")
			.base_url(WECHAT_COMPONENT_API)?
			.build()
	}
}

/// Cache and locking policy shared by every flow of one broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerOptions {
	/// Root namespace of every cache and lock key.
	pub namespace: String,
	/// Lease of the refresh critical section.
	///
	/// Must exceed the remote endpoint's latency; once the lease lapses mid-refresh another
	/// process may start a second refresh for the same credential.
	#[serde(with = "crate::lock::duration_millis")]
	pub refresh_lease: Duration,
	/// Margin subtracted from every server-reported lifetime.
	#[serde(with = "crate::lock::duration_millis")]
	pub token_buffer: Duration,
	/// How long a credential record stays in the store after its buffered expiry.
	///
	/// An expired account credential still carries the refresh value the next refresh needs.
	#[serde(with = "crate::lock::duration_millis")]
	pub stale_retention: Duration,
	/// Lifetime of a pushed verification ticket.
	#[serde(with = "crate::lock::duration_millis")]
	pub ticket_ttl: Duration,
	/// Lifetime of a cached account-info lookup.
	#[serde(with = "crate::lock::duration_millis")]
	pub authorizer_info_ttl: Duration,
	/// Acquisition retry policy.
	pub lock: LockOptions,
}
impl BrokerOptions {
	/// Overrides the key namespace.
	pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = namespace.into();

		self
	}

	/// Overrides the refresh lease.
	pub fn with_refresh_lease(mut self, lease: Duration) -> Self {
		self.refresh_lease = lease;

		self
	}

	/// Overrides how long expired credential records are retained.
	pub fn with_stale_retention(mut self, retention: Duration) -> Self {
		self.stale_retention = retention;

		self
	}

	/// Overrides the lock retry policy.
	pub fn with_lock(mut self, lock: LockOptions) -> Self {
		self.lock = lock;

		self
	}

	/// Checks that every duration can be used as a store TTL or lease.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.namespace.is_empty() {
			return Err(ConfigError::MissingField { field: "namespace" });
		}
		if [self.refresh_lease, self.ticket_ttl, self.authorizer_info_ttl, self.lock.lease]
			.iter()
			.any(|lease| !lease.is_positive())
		{
			return Err(ConfigError::NonPositiveLease);
		}
		if self.token_buffer.is_negative() {
			return Err(ConfigError::MissingField { field: "token_buffer" });
		}
		if self.stale_retention.is_negative() {
			return Err(ConfigError::MissingField { field: "stale_retention" });
		}

		Ok(())
	}
}
impl Default for BrokerOptions {
	fn default() -> Self {
		Self {
			namespace: "wechat".into(),
			refresh_lease: Duration::seconds(1),
			token_buffer: crate::auth::TOKEN_BUFFER,
			stale_retention: Duration::days(1),
			ticket_ttl: Duration::seconds(600 + 10),
			authorizer_info_ttl: Duration::days(30),
			lock: LockOptions::default(),
		}
	}
}
