//! Shared helpers for both credential classes: request state, cache access, locked refresh.

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialClass, TenantId, TokenSecret},
	flows::Broker,
	http::PlatformHttpClient,
	obs,
	store::SharedStore,
};

/// Identifies the credential a lookup is after.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRequest {
	/// Tenant the credential belongs to.
	pub tenant: TenantId,
	/// Platform-level or per-account credential.
	pub class: CredentialClass,
	/// Access value the remote platform already rejected; never served again.
	pub rejected: Option<TokenSecret>,
}
impl CredentialRequest {
	/// Lookup of the platform-level credential of `tenant`.
	pub fn platform(tenant: TenantId) -> Self {
		Self { tenant, class: CredentialClass::Platform, rejected: None }
	}

	/// Lookup of the per-account credential of `tenant`.
	pub fn account(tenant: TenantId) -> Self {
		Self { tenant, class: CredentialClass::Account, rejected: None }
	}

	/// Forces a refresh unless the cached access value differs from `access`.
	///
	/// When several callers see the same value rejected, only the first one to take the lock
	/// refreshes; the rest find a different value in the cache and reuse it.
	pub fn rejecting(mut self, access: TokenSecret) -> Self {
		self.rejected = Some(access);

		self
	}

	/// Returns `true` when `credential` may be handed out at `now`.
	pub fn accepts(&self, credential: &Credential, now: OffsetDateTime) -> bool {
		credential.is_valid_at(now)
			&& self.rejected.as_ref().is_none_or(|rejected| credential.access_token != *rejected)
	}
}

impl<C> Broker<C>
where
	C: ?Sized + PlatformHttpClient,
{
	/// Reads the cached credential for `request`, valid or not.
	pub(crate) async fn read_credential(
		&self,
		request: &CredentialRequest,
	) -> Result<Option<Credential>> {
		let key = self.keys.credential(&request.tenant, request.class);

		Ok(<dyn SharedStore>::get_json(self.store.as_ref(), &key).await?)
	}

	/// Writes `credential` for its remaining buffered lifetime plus
	/// [`BrokerOptions::stale_retention`](crate::platform::BrokerOptions::stale_retention).
	///
	/// Validity is decided by `expires_at`, never by the record's presence. A credential whose
	/// lifetime is already used up by the buffer is not cached.
	pub(crate) async fn write_credential(
		&self,
		request: &CredentialRequest,
		credential: &Credential,
	) -> Result<()> {
		let key = self.keys.credential(&request.tenant, request.class);
		let remaining = credential.remaining_at(OffsetDateTime::now_utc());

		if !remaining.is_positive() {
			obs::note("credential_not_cached", &key);

			return Ok(());
		}

		let ttl = remaining + self.options.stale_retention;

		<dyn SharedStore>::set_json(self.store.as_ref(), &key, credential, Some(ttl)).await?;

		Ok(())
	}

	/// Lock-free fast path. Returns the cached credential when `request` accepts it, and the
	/// stale value otherwise so callers can mine it for a refresh value.
	pub(crate) async fn cached_credential(
		&self,
		request: &CredentialRequest,
	) -> Result<Lookup> {
		self.refresh_metrics.record_attempt();

		match self.read_credential(request).await? {
			Some(credential) if request.accepts(&credential, OffsetDateTime::now_utc()) => {
				self.refresh_metrics.record_cache_hit();
				obs::note("cache_hit", &self.keys.credential(&request.tenant, request.class));

				Ok(Lookup::Fresh(credential))
			},
			stale => Ok(Lookup::Stale(stale)),
		}
	}

	/// Double-checked refresh under the `(tenant, class)` lock.
	///
	/// `refresh` only runs when the cache still holds no acceptable credential after the lock
	/// is taken; it receives whatever stale value the cache holds at that point.
	pub(crate) async fn refresh_locked<F, Fut>(
		&self,
		request: &CredentialRequest,
		refresh: F,
	) -> Result<Credential>
	where
		F: FnOnce(Option<Credential>) -> Fut,
		Fut: Future<Output = Result<Credential>>,
	{
		let lock_key = self.keys.lock(&request.tenant, request.class);

		self.locks
			.with_lock(&lock_key, Some(self.options.refresh_lease), move || async move {
				let current = self.read_credential(request).await?;

				if let Some(credential) =
					current.as_ref().filter(|c| request.accepts(c, OffsetDateTime::now_utc()))
				{
					self.refresh_metrics.record_cache_hit();
					obs::note("refreshed_elsewhere", &self.keys.lock(&request.tenant, request.class));

					return Ok(credential.clone());
				}

				self.refresh_metrics.record_refresh();

				let fresh = refresh(current).await?;

				self.write_credential(request, &fresh).await?;

				Ok(fresh)
			})
			.await
	}

	/// Records the terminal outcome of a lookup in [`Broker::refresh_metrics`].
	pub(crate) fn settle<T>(&self, result: Result<T>) -> Result<T> {
		if result.is_err() {
			self.refresh_metrics.record_failure();
		}

		result
	}
}

/// Outcome of the lock-free cache read.
#[derive(Debug)]
pub(crate) enum Lookup {
	/// Acceptable credential; no refresh needed.
	Fresh(Credential),
	/// Missing, expired, or rejected credential.
	Stale(Option<Credential>),
}
