//! Per-account credentials, authorization exchange, and account-info lookups.
//!
//! Account credentials are refreshed with the account's refresh value. It is resolved in this
//! order: the value passed by the caller, the value kept in the (stale) cached credential, then
//! the cached account-info lookup. When none yields a value the account has no API permission
//! and the lookup answers `Ok(None)` instead of failing.

// self
use crate::{
	_prelude::*,
	auth::{Credential, TenantId, TokenSecret},
	flows::{Broker, CredentialRequest, Lookup},
	http::PlatformHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	remote::{
		self, AuthorizerInfoRequest, AuthorizerTokenRequest, AuthorizerTokenResponse,
		QueryAuthRequest, QueryAuthResponse,
	},
	store::SharedStore,
};

/// Authorization state of one account as reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationInfo {
	/// Authorized account.
	pub authorizer_appid: TenantId,
	/// Access value; present only while the account grants API permission.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub authorizer_access_token: Option<TokenSecret>,
	/// Lifetime of the access value in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_in: Option<i64>,
	/// Refresh value used to renew the access value.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub authorizer_refresh_token: Option<TokenSecret>,
	/// Permission sets granted to the platform, kept verbatim.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub func_info: Vec<serde_json::Value>,
}
impl AuthorizationInfo {
	/// Builds the buffered account credential carried by this record, if any.
	///
	/// Fails with [`Error::InvalidLifetime`] when the reported lifetime is unusable.
	pub fn credential(
		&self,
		buffer: Duration,
		issued_at: OffsetDateTime,
	) -> Result<Option<Credential>> {
		let (Some(access), Some(expires_in)) = (
			self.authorizer_access_token.as_ref().filter(|t| !t.expose().is_empty()),
			self.expires_in,
		) else {
			return Ok(None);
		};
		let mut credential = Credential::from_remote(access.expose(), expires_in, buffer, issued_at)?;

		credential.refresh_token = self.refresh_token().cloned();

		Ok(Some(credential))
	}

	/// Non-empty refresh value, if any.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		self.authorizer_refresh_token.as_ref().filter(|t| !t.expose().is_empty())
	}
}

/// Account-info lookup result: the account profile plus its authorization state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerDetails {
	/// Account profile (nickname, service type, verification state, ...), kept verbatim.
	#[serde(default)]
	pub authorizer_info: serde_json::Value,
	/// Authorization state.
	pub authorization_info: AuthorizationInfo,
}

impl<C> Broker<C>
where
	C: ?Sized + PlatformHttpClient,
{
	/// Returns a usable credential for `authorizer`, or `Ok(None)` when no refresh value can be
	/// resolved.
	pub async fn authorizer_access_token(
		&self,
		authorizer: &TenantId,
		refresh_token: Option<&str>,
	) -> Result<Option<Credential>> {
		let supplied = refresh_token.filter(|t| !t.is_empty()).map(TokenSecret::new);

		self.authorizer_credential(CredentialRequest::account(authorizer.clone()), supplied, "cached")
			.await
	}

	/// Replaces an account credential the remote platform rejected.
	pub async fn refresh_authorizer_access_token(
		&self,
		authorizer: &TenantId,
		rejected: &TokenSecret,
	) -> Result<Option<Credential>> {
		let request = CredentialRequest::account(authorizer.clone()).rejecting(rejected.clone());

		self.authorizer_credential(request, None, "forced").await
	}

	/// Runs `call` with the account's access value, retrying once with a new value when the
	/// platform reports the first one as invalid or expired.
	///
	/// Answers `Ok(None)` without running `call` when the account has no credential.
	pub async fn with_authorizer_token<T, F, Fut>(
		&self,
		authorizer: &TenantId,
		mut call: F,
	) -> Result<Option<T>>
	where
		F: FnMut(TokenSecret) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let Some(credential) = self.authorizer_access_token(authorizer, None).await? else {
			return Ok(None);
		};

		match call(credential.access_token.clone()).await {
			Err(e) if e.as_token_invalid().is_some() => {
				obs::note("authorizer_token_rejected", authorizer);

				let Some(fresh) =
					self.refresh_authorizer_access_token(authorizer, &credential.access_token).await?
				else {
					return Err(e);
				};

				call(fresh.access_token).await.map(Some)
			},
			outcome => outcome.map(Some),
		}
	}

	/// Returns the account-info lookup for `authorizer`, served from the cache when present.
	pub async fn authorizer_info(&self, authorizer: &TenantId) -> Result<AuthorizerDetails> {
		const KIND: FlowKind = FlowKind::AuthorizerInfo;

		let span = FlowSpan::new(KIND, "authorizer_info");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.cached_authorizer_info(authorizer)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Exchanges an authorization code and caches the account credential it carries.
	///
	/// Accounts that did not grant API permission come back without an access value; nothing is
	/// cached for them.
	pub async fn query_auth(&self, authorization_code: &str) -> Result<AuthorizationInfo> {
		const KIND: FlowKind = FlowKind::QueryAuth;

		let span = FlowSpan::new(KIND, "query_auth");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let app_id = &self.config.app_id;
				let issued_at = OffsetDateTime::now_utc();
				let response: QueryAuthResponse<AuthorizationInfo> = self
					.with_component_token(|access| {
						let url = remote::with_access_token(&self.descriptor.endpoints.query_auth, &access);

						async move {
							remote::post(
								self.http_client.as_ref(),
								remote::QUERY_AUTH,
								url,
								&QueryAuthRequest {
									component_appid: app_id,
									authorization_code,
								},
							)
							.await
						}
					})
					.await?;
				let info = response.authorization_info;

				if let Some(credential) = info.credential(self.options.token_buffer, issued_at)? {
					let request = CredentialRequest::account(info.authorizer_appid.clone());

					self.write_credential(&request, &credential).await?;
				}

				Ok(info)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn authorizer_credential(
		&self,
		request: CredentialRequest,
		supplied: Option<TokenSecret>,
		stage: &'static str,
	) -> Result<Option<Credential>> {
		const KIND: FlowKind = FlowKind::AuthorizerToken;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let stale = match self.cached_credential(&request).await? {
					Lookup::Fresh(credential) => return Ok(Some(credential)),
					Lookup::Stale(stale) => stale,
				};
				let Some(refresh_token) =
					self.resolve_refresh_token(&request.tenant, supplied, stale.as_ref()).await?
				else {
					obs::note("no_refresh_token", &request.tenant);

					return Ok(None);
				};
				let credential = self
					.refresh_locked(&request, |_| {
						self.fetch_authorizer_credential(&request.tenant, &refresh_token)
					})
					.await?;

				Ok(Some(credential))
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		self.settle(result)
	}

	async fn resolve_refresh_token(
		&self,
		authorizer: &TenantId,
		supplied: Option<TokenSecret>,
		stale: Option<&Credential>,
	) -> Result<Option<TokenSecret>> {
		if let Some(token) = supplied {
			return Ok(Some(token));
		}
		if let Some(token) =
			stale.and_then(|c| c.refresh_token.as_ref()).filter(|t| !t.expose().is_empty())
		{
			return Ok(Some(token.clone()));
		}

		let details = self.cached_authorizer_info(authorizer).await?;

		obs::note("refresh_token_from_authorizer_info", authorizer);

		Ok(details.authorization_info.refresh_token().cloned())
	}

	async fn cached_authorizer_info(&self, authorizer: &TenantId) -> Result<AuthorizerDetails> {
		let key = self.keys.authorizer_info(authorizer);

		if let Some(details) =
			<dyn SharedStore>::get_json::<AuthorizerDetails>(self.store.as_ref(), &key).await?
		{
			return Ok(details);
		}

		let app_id = &self.config.app_id;
		let details: AuthorizerDetails = self
			.with_component_token(|access| {
				let url = remote::with_access_token(&self.descriptor.endpoints.authorizer_info, &access);

				async move {
					remote::post(
						self.http_client.as_ref(),
						remote::AUTHORIZER_INFO,
						url,
						&AuthorizerInfoRequest { component_appid: app_id, authorizer_appid: authorizer },
					)
					.await
				}
			})
			.await?;

		<dyn SharedStore>::set_json(
			self.store.as_ref(),
			&key,
			&details,
			Some(self.options.authorizer_info_ttl),
		)
		.await?;

		Ok(details)
	}

	async fn fetch_authorizer_credential(
		&self,
		authorizer: &TenantId,
		refresh_token: &TokenSecret,
	) -> Result<Credential> {
		let app_id = &self.config.app_id;
		let issued_at = OffsetDateTime::now_utc();
		let response: AuthorizerTokenResponse = self
			.with_component_token(|access| {
				let url = remote::with_access_token(&self.descriptor.endpoints.authorizer_token, &access);

				async move {
					remote::post(
						self.http_client.as_ref(),
						remote::AUTHORIZER_TOKEN,
						url,
						&AuthorizerTokenRequest {
							component_appid: app_id,
							authorizer_appid: authorizer,
							authorizer_refresh_token: refresh_token.expose(),
						},
					)
					.await
				}
			})
			.await?;

		obs::note("authorizer_token_issued", authorizer);

		Ok(Credential::from_remote(
			response.authorizer_access_token,
			response.expires_in,
			self.options.token_buffer,
			issued_at,
		)?
		.with_refresh_token(response.authorizer_refresh_token))
	}
}
