//! Transport primitives for calls to the remote platform.
//!
//! The broker only ever issues JSON `POST`s to the token-issuing endpoints. [`PlatformHttpClient`]
//! captures that single capability so deployments can plug in their own stack (proxies, custom
//! TLS, request signing) while the broker keeps ownership of envelope decoding and error
//! classification. Implementations report network failures as [`TransportError`] and hand back
//! every HTTP status untouched; status classification happens in the broker.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{ACCEPT, CONTENT_TYPE};
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`PlatformHttpClient::post_json`].
pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpReply, TransportError>> + 'a + Send>>;

/// Raw response captured from the remote platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl HttpReply {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Abstraction over HTTP transports able to POST a JSON body.
///
/// Implementations must be `Send + Sync + 'static` so one client can be shared by every broker
/// in the process behind an [`Arc`].
pub trait PlatformHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Posts `body` (already-serialized JSON) to `url`.
	fn post_json<'a>(&'a self, url: Url, body: Vec<u8>) -> HttpFuture<'a>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token endpoints answer directly, so [`ReqwestHttpClient::new`] disables redirect following.
/// Configure any custom [`ReqwestClient`] passed to [`ReqwestHttpClient::with_client`] the same
/// way.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client that never follows redirects.
	pub fn new() -> Result<Self, ConfigError> {
		let client =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl PlatformHttpClient for ReqwestHttpClient {
	fn post_json<'a>(&'a self, url: Url, body: Vec<u8>) -> HttpFuture<'a> {
		Box::pin(async move {
			let response = self
				.0
				.post(url)
				.header(CONTENT_TYPE, "application/json")
				.header(ACCEPT, "application/json")
				.body(body)
				.send()
				.await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok(HttpReply { status, body })
		})
	}
}
