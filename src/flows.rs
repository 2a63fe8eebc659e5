//! Credential orchestration for the platform and every authorized account.
//!
//! Each lookup follows the same sequence: read the shared cache and return a valid credential
//! without locking; otherwise take the `(tenant, class)` refresh lock, read the cache again,
//! call the remote endpoint only if the credential is still stale, write it back, and release.
//! Across every process sharing one store that keeps at most one refresh per credential in
//! flight, for as long as the refresh lease outlives the remote call.

pub mod authorizer;
pub mod callback;
pub mod common;
pub mod component;

mod metrics;

pub use authorizer::*;
pub use callback::*;
pub use common::*;
pub use metrics::*;

// self
use crate::{
	_prelude::*,
	http::PlatformHttpClient,
	lock::LockManager,
	platform::{BrokerOptions, ComponentConfig, PlatformDescriptor},
	store::{CacheKeys, SharedStore},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport.
pub type ReqwestBroker = Broker<ReqwestHttpClient>;

/// Coordinates credential lookups for one platform tenant and its authorized accounts.
///
/// The broker owns handles to the HTTP client, the shared store, and the lock manager, so build
/// it once at process start and share it (it is cheap to clone). Several brokers in different
/// processes cooperate through the store alone.
#[derive(Clone)]
pub struct Broker<C>
where
	C: ?Sized + PlatformHttpClient,
{
	/// HTTP client used for every outbound platform request.
	pub http_client: Arc<C>,
	/// Shared store holding cached credentials, tickets, and lock state.
	pub store: Arc<dyn SharedStore>,
	/// Lock manager over the same store.
	pub locks: LockManager,
	/// Platform endpoints.
	pub descriptor: PlatformDescriptor,
	/// Provisioned platform credentials.
	pub config: ComponentConfig,
	/// Cache and locking policy.
	pub options: BrokerOptions,
	/// Key layout derived from [`BrokerOptions::namespace`].
	pub keys: CacheKeys,
	/// Shared counters for credential lookups.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl<C> Broker<C>
where
	C: ?Sized + PlatformHttpClient,
{
	/// Creates a broker that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn SharedStore>,
		descriptor: PlatformDescriptor,
		config: ComponentConfig,
		options: BrokerOptions,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self> {
		config.validate()?;
		options.validate()?;

		Ok(Self {
			http_client: http_client.into(),
			locks: LockManager::new(store.clone(), options.lock),
			store,
			descriptor,
			keys: CacheKeys::new(options.namespace.clone()),
			config,
			options,
			refresh_metrics: Default::default(),
		})
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient> {
	/// Creates a broker with its own reqwest transport (redirects disabled).
	pub fn new(
		store: Arc<dyn SharedStore>,
		descriptor: PlatformDescriptor,
		config: ComponentConfig,
		options: BrokerOptions,
	) -> Result<Self> {
		Self::with_http_client(store, descriptor, config, options, ReqwestHttpClient::new()?)
	}
}
impl<C> Debug for Broker<C>
where
	C: ?Sized + PlatformHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("config", &self.config)
			.field("options", &self.options)
			.finish()
	}
}
