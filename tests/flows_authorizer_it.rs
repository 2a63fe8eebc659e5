#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use common::*;
use platform_token_broker::{
	auth::{Credential, TokenSecret},
	error::{Error, RemoteApiError},
	flows::ReqwestBroker,
	store::{MemoryStore, SharedStore},
};

const ACCOUNT: &str = "wxaccount";
const COMPONENT_ACCESS: &str = "component-access";

async fn ready_broker<'a>(
	server: &'a MockServer,
	store: &MemoryStore,
) -> (ReqwestBroker, httpmock::Mock<'a>) {
	let broker = build_reqwest_test_broker(server, store);
	let component = server
		.mock_async(|when, then| {
			when.method(POST).path(endpoint_path("api_component_token"));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "component_access_token": COMPONENT_ACCESS, "expires_in": 7200 }));
		})
		.await;

	broker.save_ticket("ticket").await.expect("Ticket should be stored.");

	(broker, component)
}

#[tokio::test]
async fn supplied_refresh_token_renews_account_credential() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let (broker, component) = ready_broker(&server, &store).await;
	let authorizer = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(endpoint_path("api_authorizer_token"))
				.query_param("component_access_token", COMPONENT_ACCESS)
				.json_body(json!({
					"component_appid": COMPONENT_APPID,
					"authorizer_appid": ACCOUNT,
					"authorizer_refresh_token": "refresh-supplied"
				}));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorizer_access_token": "account-access",
				"expires_in": 7200,
				"authorizer_refresh_token": "refresh-rotated"
			}));
		})
		.await;
	let credential = broker
		.authorizer_access_token(&tenant(ACCOUNT), Some("refresh-supplied"))
		.await
		.expect("Account lookup should succeed.")
		.expect("Supplied refresh token should yield a credential.");

	assert_eq!(credential.access_token.expose(), "account-access");
	assert_eq!(credential.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-rotated"));

	let cached = broker
		.authorizer_access_token(&tenant(ACCOUNT), None)
		.await
		.expect("Cached lookup should succeed.")
		.expect("Credential should be cached.");

	assert_eq!(cached, credential);
	assert!(store.ttl("wechat:wxaccount:token").is_some());

	authorizer.assert_calls_async(1).await;
	component.assert_calls_async(1).await;
}

#[tokio::test]
async fn stale_credential_supplies_its_refresh_token() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let (broker, _component) = ready_broker(&server, &store).await;
	let stale = Credential {
		access_token: TokenSecret::new("account-stale"),
		expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
		refresh_token: Some(TokenSecret::new("refresh-cached")),
	};

	<dyn SharedStore>::set_json(&store, "wechat:wxaccount:token", &stale, Some(Duration::minutes(5)))
		.await
		.expect("Stale credential should be seeded.");

	let authorizer = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(endpoint_path("api_authorizer_token"))
				.json_body_includes(r#"{"authorizer_refresh_token":"refresh-cached"}"#);
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorizer_access_token": "account-renewed",
				"expires_in": 7200,
				"authorizer_refresh_token": "refresh-cached"
			}));
		})
		.await;
	let renewed = broker
		.authorizer_access_token(&tenant(ACCOUNT), None)
		.await
		.expect("Stale lookup should renew.")
		.expect("Cached refresh token should be used.");

	assert_eq!(renewed.access_token.expose(), "account-renewed");

	authorizer.assert_calls_async(1).await;
}

#[tokio::test]
async fn authorizer_info_supplies_refresh_token_and_is_cached() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let (broker, _component) = ready_broker(&server, &store).await;
	let info = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(endpoint_path("api_get_authorizer_info"))
				.query_param("component_access_token", COMPONENT_ACCESS)
				.json_body(json!({ "component_appid": COMPONENT_APPID, "authorizer_appid": ACCOUNT }));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorizer_info": { "nick_name": "Account" },
				"authorization_info": {
					"authorizer_appid": ACCOUNT,
					"authorizer_refresh_token": "refresh-from-info",
					"func_info": [{ "funcscope_category": { "id": 1 } }]
				}
			}));
		})
		.await;
	let authorizer = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(endpoint_path("api_authorizer_token"))
				.json_body_includes(r#"{"authorizer_refresh_token":"refresh-from-info"}"#);
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorizer_access_token": "account-from-info",
				"expires_in": 7200,
				"authorizer_refresh_token": "refresh-from-info"
			}));
		})
		.await;
	let credential = broker
		.authorizer_access_token(&tenant(ACCOUNT), None)
		.await
		.expect("Lookup should succeed.")
		.expect("Authorizer info should supply the refresh token.");

	assert_eq!(credential.access_token.expose(), "account-from-info");

	let details = broker.authorizer_info(&tenant(ACCOUNT)).await.expect("Info is cached.");

	assert_eq!(details.authorizer_info["nick_name"], "Account");
	assert!(store.ttl("wechat:wxaccount:authorizer").is_some());

	info.assert_calls_async(1).await;
	authorizer.assert_calls_async(1).await;
}

#[tokio::test]
async fn account_without_refresh_token_answers_none() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let (broker, _component) = ready_broker(&server, &store).await;
	let info = server
		.mock_async(|when, then| {
			when.method(POST).path(endpoint_path("api_get_authorizer_info"));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorizer_info": {},
				"authorization_info": { "authorizer_appid": ACCOUNT, "authorizer_refresh_token": "" }
			}));
		})
		.await;
	let authorizer = server
		.mock_async(|when, then| {
			when.method(POST).path(endpoint_path("api_authorizer_token"));
			then.status(500);
		})
		.await;
	let outcome =
		broker.authorizer_access_token(&tenant(ACCOUNT), None).await.expect("Lookup should not fail.");

	assert!(outcome.is_none());

	let mut ran = false;
	let wrapped = broker
		.with_authorizer_token(&tenant(ACCOUNT), |_| {
			ran = true;

			async { Ok(()) }
		})
		.await
		.expect("Wrapped call should not fail.");

	assert!(wrapped.is_none());
	assert!(!ran);

	info.assert_calls_async(1).await;
	authorizer.assert_calls_async(0).await;
}

#[tokio::test]
async fn query_auth_caches_granted_credential() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let (broker, _component) = ready_broker(&server, &store).await;
	let query = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(endpoint_path("api_query_auth"))
				.query_param("component_access_token", COMPONENT_ACCESS)
				.json_body(json!({ "component_appid": COMPONENT_APPID, "authorization_code": "code-1" }));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorization_info": {
					"authorizer_appid": ACCOUNT,
					"authorizer_access_token": "account-granted",
					"expires_in": 7200,
					"authorizer_refresh_token": "refresh-granted",
					"func_info": []
				}
			}));
		})
		.await;
	let info = broker.query_auth("code-1").await.expect("Code exchange should succeed.");

	assert_eq!(info.authorizer_appid.as_ref(), ACCOUNT);

	let cached = broker
		.authorizer_access_token(&tenant(ACCOUNT), None)
		.await
		.expect("Lookup should succeed.")
		.expect("Exchanged credential should be cached.");

	assert_eq!(cached.access_token.expose(), "account-granted");
	assert_eq!(cached.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-granted"));

	query.assert_calls_async(1).await;
}

#[tokio::test]
async fn with_authorizer_token_retries_once_after_rejection() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let (broker, _component) = ready_broker(&server, &store).await;
	let authorizer = server
		.mock_async(|when, then| {
			when.method(POST).path(endpoint_path("api_authorizer_token"));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorizer_access_token": "account-renewed",
				"expires_in": 7200,
				"authorizer_refresh_token": "refresh"
			}));
		})
		.await;
	let seeded = Credential::issue(
		"account-rejected",
		Duration::seconds(7200),
		Duration::seconds(10),
		OffsetDateTime::now_utc(),
	)
	.with_refresh_token("refresh");

	<dyn SharedStore>::set_json(&store, "wechat:wxaccount:token", &seeded, Some(Duration::hours(1)))
		.await
		.expect("Credential should be seeded.");

	let mut seen = Vec::new();
	let outcome = broker
		.with_authorizer_token(&tenant(ACCOUNT), |access| {
			let rejected = access.expose() == "account-rejected";

			seen.push(access.expose().to_owned());

			async move {
				if rejected {
					Err(RemoteApiError::new(40001, "invalid credential").into())
				} else {
					Ok::<_, Error>("done")
				}
			}
		})
		.await
		.expect("Retry should succeed.");

	assert_eq!(outcome, Some("done"));
	assert_eq!(seen, vec!["account-rejected".to_owned(), "account-renewed".to_owned()]);

	authorizer.assert_calls_async(1).await;
}

#[tokio::test]
async fn expired_account_credential_keeps_its_refresh_token() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let (broker, _component) = ready_broker(&server, &store).await;
	let query = server
		.mock_async(|when, then| {
			when.method(POST).path(endpoint_path("api_query_auth"));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorization_info": {
					"authorizer_appid": ACCOUNT,
					"authorizer_access_token": "account-short",
					"expires_in": 11,
					"authorizer_refresh_token": "refresh-short"
				}
			}));
		})
		.await;
	let authorizer = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(endpoint_path("api_authorizer_token"))
				.json_body_includes(r#"{"authorizer_refresh_token":"refresh-short"}"#);
			then.status(200).header("content-type", "application/json").json_body(json!({
				"authorizer_access_token": "account-long",
				"expires_in": 7200,
				"authorizer_refresh_token": "refresh-short"
			}));
		})
		.await;

	broker.query_auth("code-short").await.expect("Code exchange should succeed.");

	assert!(
		store.ttl("wechat:wxaccount:token").expect("Credential should be cached.")
			> Duration::hours(23)
	);

	tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;

	let renewed = broker
		.authorizer_access_token(&tenant(ACCOUNT), None)
		.await
		.expect("Expired credential should renew.")
		.expect("Retained record should supply the refresh token.");

	assert_eq!(renewed.access_token.expose(), "account-long");

	query.assert_calls_async(1).await;
	authorizer.assert_calls_async(1).await;
}
