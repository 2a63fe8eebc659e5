// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenSecret},
	crypto::{EncodingAesKey, MessageCodec},
	error::ConfigError,
};

/// Credentials provisioned for the platform tenant.
///
/// `message_token` and `encoding_aes_key` are only needed for inbound callbacks; a broker that
/// never handles pushes can leave them unset.
#[derive(Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
	/// Platform application id.
	pub app_id: TenantId,
	/// Platform application secret.
	pub app_secret: TokenSecret,
	/// Shared token used by callback signatures.
	#[serde(default)]
	pub message_token: Option<TokenSecret>,
	/// 43-character callback encryption key.
	#[serde(default)]
	pub encoding_aes_key: Option<TokenSecret>,
}
impl ComponentConfig {
	/// Creates a config without callback crypto material.
	pub fn new(app_id: TenantId, app_secret: impl Into<String>) -> Self {
		Self {
			app_id,
			app_secret: TokenSecret::new(app_secret),
			message_token: None,
			encoding_aes_key: None,
		}
	}

	/// Adds the callback signature token and encryption key.
	pub fn with_callback_crypto(
		mut self,
		message_token: impl Into<String>,
		encoding_aes_key: impl Into<String>,
	) -> Self {
		self.message_token = Some(TokenSecret::new(message_token));
		self.encoding_aes_key = Some(TokenSecret::new(encoding_aes_key));

		self
	}

	/// Checks that required secrets are present and the key (when set) decodes.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.app_secret.expose().is_empty() {
			return Err(ConfigError::MissingField { field: "app_secret" });
		}
		if self.message_token.as_ref().is_some_and(|token| token.expose().is_empty()) {
			return Err(ConfigError::MissingField { field: "message_token" });
		}
		if let Some(key) = self.encoding_aes_key.as_ref() {
			EncodingAesKey::new(key.expose())?;
		}

		Ok(())
	}

	/// Callback signature token.
	pub fn message_token(&self) -> Result<&str, ConfigError> {
		self.message_token
			.as_ref()
			.map(TokenSecret::expose)
			.ok_or(ConfigError::MissingField { field: "message_token" })
	}

	/// Builds the envelope codec bound to this platform tenant.
	pub fn codec(&self) -> Result<MessageCodec, ConfigError> {
		let key = self.encoding_aes_key.as_ref().ok_or(ConfigError::MissingEncodingAesKey)?;

		Ok(MessageCodec::new(self.app_id.clone(), EncodingAesKey::new(key.expose())?))
	}
}
impl Debug for ComponentConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ComponentConfig")
			.field("app_id", &self.app_id)
			.field("app_secret", &"<redacted>")
			.field("message_token", &self.message_token.as_ref().map(|_| "<redacted>"))
			.field("encoding_aes_key", &self.encoding_aes_key.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}
