//! Platform-level credential: ticket storage, cached lookup, and locked refresh.
//!
//! The remote platform pushes a verification ticket every few minutes; [`Broker::save_ticket`]
//! keeps the latest one in the shared store. Refreshing the platform credential needs that
//! ticket, so a missing ticket fails with [`Error::TicketUnavailable`] before any remote call.

// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
	flows::{Broker, CredentialRequest, Lookup},
	http::PlatformHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	remote::{self, ComponentTokenRequest, ComponentTokenResponse},
};

impl<C> Broker<C>
where
	C: ?Sized + PlatformHttpClient,
{
	/// Stores the pushed verification ticket for [`BrokerOptions::ticket_ttl`](crate::platform::BrokerOptions::ticket_ttl).
	pub async fn save_ticket(&self, ticket: &str) -> Result<()> {
		let key = self.keys.ticket(&self.config.app_id);

		self.store.set(&key, ticket.to_owned(), Some(self.options.ticket_ttl)).await?;
		obs::note("ticket_saved", &key);

		Ok(())
	}

	/// Returns a usable platform credential, refreshing it under the platform lock if needed.
	pub async fn component_access_token(&self) -> Result<Credential> {
		self.component_credential(CredentialRequest::platform(self.config.app_id.clone()), "cached")
			.await
	}

	/// Replaces a platform credential the remote platform rejected.
	///
	/// Only the credential whose access value equals `rejected` is discarded, so concurrent
	/// callers reporting the same value trigger one refresh between them.
	pub async fn refresh_component_access_token(&self, rejected: &TokenSecret) -> Result<Credential> {
		let request =
			CredentialRequest::platform(self.config.app_id.clone()).rejecting(rejected.clone());

		self.component_credential(request, "forced").await
	}

	/// Runs `call` with the platform access value, retrying once with a new value when the
	/// platform reports the first one as invalid or expired.
	pub async fn with_component_token<T, F, Fut>(&self, mut call: F) -> Result<T>
	where
		F: FnMut(TokenSecret) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let credential = self.component_access_token().await?;

		match call(credential.access_token.clone()).await {
			Err(e) if e.as_token_invalid().is_some() => {
				obs::note("component_token_rejected", &self.config.app_id);

				let fresh = self.refresh_component_access_token(&credential.access_token).await?;

				call(fresh.access_token).await
			},
			outcome => outcome,
		}
	}

	async fn component_credential(
		&self,
		request: CredentialRequest,
		stage: &'static str,
	) -> Result<Credential> {
		const KIND: FlowKind = FlowKind::ComponentToken;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				if let Lookup::Fresh(credential) = self.cached_credential(&request).await? {
					return Ok(credential);
				}

				self.refresh_locked(&request, |_| self.fetch_component_credential()).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		self.settle(result)
	}

	async fn fetch_component_credential(&self) -> Result<Credential> {
		let app_id = &self.config.app_id;
		let ticket = self
			.store
			.get(&self.keys.ticket(app_id))
			.await?
			.filter(|ticket| !ticket.is_empty())
			.ok_or_else(|| Error::TicketUnavailable { tenant: app_id.clone() })?;
		let issued_at = OffsetDateTime::now_utc();
		let response: ComponentTokenResponse = remote::post(
			self.http_client.as_ref(),
			remote::COMPONENT_TOKEN,
			self.descriptor.endpoints.component_token.clone(),
			&ComponentTokenRequest {
				component_appid: app_id,
				component_appsecret: self.config.app_secret.expose(),
				component_verify_ticket: &ticket,
			},
		)
		.await?;

		obs::note("component_token_issued", app_id);

		Credential::from_remote(
			response.component_access_token,
			response.expires_in,
			self.options.token_buffer,
			issued_at,
		)
	}
}
