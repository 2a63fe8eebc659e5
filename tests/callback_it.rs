#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use common::*;
use platform_token_broker::{
	crypto::{self, SignatureParts},
	error::{AuthenticityError, Error},
	flows::CallbackQuery,
	store::{MemoryStore, SharedStore},
};

const TICKET_PUSH: &str = "<xml><AppId><![CDATA[wxcomponent]]></AppId><CreateTime>1413192605</CreateTime><InfoType><![CDATA[component_verify_ticket]]></InfoType><ComponentVerifyTicket><![CDATA[ticket@@@pushed]]></ComponentVerifyTicket></xml>";

fn signed_push(plaintext: &str, broker: &platform_token_broker::flows::ReqwestBroker) -> (CallbackQuery, String) {
	let codec = broker.config.codec().expect("Test config carries callback crypto.");
	let ciphertext = codec.encrypt(plaintext).expect("Push should encrypt.");
	let mut query = CallbackQuery {
		timestamp: "1413192605".into(),
		nonce: "1320562132".into(),
		encrypt_type: Some("aes".into()),
		..Default::default()
	};
	let parts =
		SignatureParts::new(MESSAGE_TOKEN, &query.timestamp, &query.nonce).with_encrypt(&ciphertext);

	query.msg_signature = Some(crypto::sign(&parts));

	let body = format!(
		"<xml><AppId><![CDATA[{COMPONENT_APPID}]]></AppId><Encrypt><![CDATA[{ciphertext}]]></Encrypt></xml>"
	);

	(query, body)
}

#[tokio::test]
async fn ticket_push_enables_component_token() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let broker = build_reqwest_test_broker(&server, &store);
	let component = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(endpoint_path("api_component_token"))
				.json_body_includes(r#"{"component_verify_ticket":"ticket@@@pushed"}"#);
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "component_access_token": "component-pushed", "expires_in": 7200 }));
		})
		.await;
	let (query, body) = signed_push(TICKET_PUSH, &broker);
	let event = broker.handle_ticket_push(&query, &body).await.expect("Signed push should open.");

	assert!(event.is_verify_ticket());
	assert_eq!(event.create_time, 1_413_192_605);
	assert_eq!(
		store.get("wechat:component:wxcomponent:ticket").await.expect("Read.").as_deref(),
		Some("ticket@@@pushed")
	);

	let credential = broker.component_access_token().await.expect("Ticket should allow refresh.");

	assert_eq!(credential.access_token.expose(), "component-pushed");

	component.assert_calls_async(1).await;
}

#[tokio::test]
async fn tampered_signature_stores_nothing() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let broker = build_reqwest_test_broker(&server, &store);
	let (mut query, body) = signed_push(TICKET_PUSH, &broker);

	query.nonce.push('0');

	let err = broker.handle_ticket_push(&query, &body).await.expect_err("Tampered push must fail.");

	assert!(matches!(err, Error::Authenticity(AuthenticityError::SignatureMismatch)));
	assert!(store.is_empty());
}

#[tokio::test]
async fn authorization_events_are_returned_without_saving() {
	let server = MockServer::start_async().await;
	let store = MemoryStore::default();
	let broker = build_reqwest_test_broker(&server, &store);
	let (query, body) = signed_push(
		"<xml><AppId>wxcomponent</AppId><CreateTime>1</CreateTime><InfoType>authorized</InfoType><AuthorizerAppid>wxaccount</AuthorizerAppid><AuthorizationCode>code-1</AuthorizationCode></xml>",
		&broker,
	);
	let event = broker.handle_ticket_push(&query, &body).await.expect("Signed push should open.");

	assert!(!event.is_verify_ticket());
	assert_eq!(event.authorizer_appid.as_deref(), Some("wxaccount"));
	assert_eq!(event.authorization_code.as_deref(), Some("code-1"));
	assert!(store.is_empty());
}
