//! Helpers shared by the reqwest-backed integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::MockServer;
// self
use platform_token_broker::{
	auth::TenantId,
	flows::ReqwestBroker,
	http::ReqwestHttpClient,
	platform::{BrokerOptions, ComponentConfig, PlatformDescriptor},
	reqwest::Client as ReqwestClient,
	store::{MemoryStore, SharedStore},
};

pub const COMPONENT_APPID: &str = "wxcomponent";
pub const COMPONENT_SECRET: &str = "component-secret";
pub const MESSAGE_TOKEN: &str = "message-token";
pub const ENCODING_AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
pub const API_PREFIX: &str = "/cgi-bin/component/";

/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
/// `httpmock` during tests.
pub fn test_reqwest_http_client() -> ReqwestHttpClient {
	let client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}

pub fn tenant(value: &str) -> TenantId {
	TenantId::new(value).expect("Tenant fixture should be valid.")
}

pub fn endpoint_path(endpoint: &str) -> String {
	format!("{API_PREFIX}{endpoint}")
}

pub fn descriptor(server: &MockServer) -> PlatformDescriptor {
	PlatformDescriptor::builder("mock-open-platform")
		.base_url(&server.url(API_PREFIX))
		.expect("Mock base URL should parse.")
		.build()
		.expect("Mock descriptor should build.")
}

pub fn component_config() -> ComponentConfig {
	ComponentConfig::new(tenant(COMPONENT_APPID), COMPONENT_SECRET)
		.with_callback_crypto(MESSAGE_TOKEN, ENCODING_AES_KEY)
}

/// Constructs a broker over `store`; brokers sharing one store behave like separate processes
/// sharing one cache backend.
pub fn build_reqwest_test_broker(server: &MockServer, store: &MemoryStore) -> ReqwestBroker {
	let store: Arc<dyn SharedStore> = Arc::new(store.clone());

	ReqwestBroker::with_http_client(
		store,
		descriptor(server),
		component_config(),
		BrokerOptions::default(),
		test_reqwest_http_client(),
	)
	.expect("Test broker should build.")
}
