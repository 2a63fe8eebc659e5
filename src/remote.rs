//! Wire shapes of the component API plus the shared POST/decode path.
//!
//! Every endpoint answers with JSON. A non-2xx status is a [`TransportError`]; a 2xx body carrying a
//! non-zero `errcode` is a [`RemoteApiError`]; anything else must decode into the endpoint's
//! response type or surface as [`Error::MalformedResponse`].

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, RemoteApiError, TransportError},
	http::PlatformHttpClient,
};

pub(crate) const COMPONENT_TOKEN: &str = "api_component_token";
pub(crate) const AUTHORIZER_TOKEN: &str = "api_authorizer_token";
pub(crate) const AUTHORIZER_INFO: &str = "api_get_authorizer_info";
pub(crate) const QUERY_AUTH: &str = "api_query_auth";

const ACCESS_TOKEN_PARAM: &str = "component_access_token";

#[derive(Serialize)]
pub(crate) struct ComponentTokenRequest<'a> {
	pub(crate) component_appid: &'a str,
	pub(crate) component_appsecret: &'a str,
	pub(crate) component_verify_ticket: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ComponentTokenResponse {
	pub(crate) component_access_token: String,
	pub(crate) expires_in: i64,
}

#[derive(Serialize)]
pub(crate) struct AuthorizerTokenRequest<'a> {
	pub(crate) component_appid: &'a str,
	pub(crate) authorizer_appid: &'a str,
	pub(crate) authorizer_refresh_token: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct AuthorizerTokenResponse {
	pub(crate) authorizer_access_token: String,
	pub(crate) expires_in: i64,
	pub(crate) authorizer_refresh_token: String,
}

#[derive(Serialize)]
pub(crate) struct AuthorizerInfoRequest<'a> {
	pub(crate) component_appid: &'a str,
	pub(crate) authorizer_appid: &'a str,
}

#[derive(Serialize)]
pub(crate) struct QueryAuthRequest<'a> {
	pub(crate) component_appid: &'a str,
	pub(crate) authorization_code: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct QueryAuthResponse<T> {
	pub(crate) authorization_info: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
	#[serde(default)]
	errcode: i64,
	#[serde(default)]
	errmsg: String,
}

/// Appends the platform credential as the `component_access_token` query parameter.
pub(crate) fn with_access_token(endpoint: &Url, access_token: &TokenSecret) -> Url {
	let mut url = endpoint.clone();

	url.query_pairs_mut().append_pair(ACCESS_TOKEN_PARAM, access_token.expose());

	url
}

/// POSTs `body` as JSON and decodes the endpoint's response.
pub(crate) async fn post<C, B, T>(http: &C, endpoint: &'static str, url: Url, body: &B) -> Result<T>
where
	C: ?Sized + PlatformHttpClient,
	B: ?Sized + Serialize,
	T: DeserializeOwned,
{
	let payload = serde_json::to_vec(body).map_err(ConfigError::from)?;
	let reply = http.post_json(url, payload).await?;

	if !reply.is_success() {
		return Err(TransportError::Status { endpoint, status: reply.status }.into());
	}

	decode(endpoint, &reply.body)
}

fn decode<T>(endpoint: &'static str, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let envelope: ErrorEnvelope = parse(endpoint, body)?;

	if envelope.errcode != 0 {
		return Err(RemoteApiError::new(envelope.errcode, envelope.errmsg).into());
	}

	parse(endpoint, body)
}

fn parse<T>(endpoint: &'static str, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::MalformedResponse { endpoint, source })
}
