//! Inbound callback handling: signature check, envelope decryption, ticket push parsing.
//!
//! Nothing in a callback is trusted before [`open_callback`] has verified `msg_signature` over
//! the ciphertext and the envelope has been decrypted for the expected tenant.

// self
use crate::{
	_prelude::*,
	crypto::{self, MessageCodec, SignatureParts},
	error::AuthenticityError,
	flows::Broker,
	http::PlatformHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// `InfoType` of the periodic verification ticket push.
pub const INFO_TYPE_VERIFY_TICKET: &str = "component_verify_ticket";

/// Query parameters the platform appends to every callback URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
	/// Signature over `(token, timestamp, nonce)`.
	#[serde(default)]
	pub signature: Option<String>,
	/// Callback timestamp.
	pub timestamp: String,
	/// Callback nonce.
	pub nonce: String,
	/// Signature over `(token, timestamp, nonce, ciphertext)`.
	#[serde(default)]
	pub msg_signature: Option<String>,
	/// `aes` for encrypted payloads.
	#[serde(default)]
	pub encrypt_type: Option<String>,
	/// Echo value of a URL verification request.
	#[serde(default)]
	pub echostr: Option<String>,
}
impl CallbackQuery {
	/// Verifies the plain `signature` used when the platform validates the callback URL.
	pub fn verify_url(&self, message_token: &str) -> Result<(), AuthenticityError> {
		let parts = SignatureParts::new(message_token, &self.timestamp, &self.nonce);

		match self.signature.as_deref() {
			Some(candidate) if crypto::verify(candidate, &parts) => Ok(()),
			_ => Err(AuthenticityError::SignatureMismatch),
		}
	}

	/// Verifies `msg_signature` over `ciphertext`.
	pub fn verify_message(
		&self,
		message_token: &str,
		ciphertext: &str,
	) -> Result<(), AuthenticityError> {
		let parts = SignatureParts::new(message_token, &self.timestamp, &self.nonce)
			.with_encrypt(ciphertext);

		match self.msg_signature.as_deref() {
			Some(candidate) if crypto::verify(candidate, &parts) => Ok(()),
			_ => Err(AuthenticityError::SignatureMismatch),
		}
	}
}

/// Decrypted push notification sent to the platform's authorization-event URL.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
	/// Platform tenant the push is addressed to.
	#[serde(rename = "AppId")]
	pub app_id: String,
	/// Unix timestamp of the push.
	#[serde(rename = "CreateTime", default)]
	pub create_time: i64,
	/// Event discriminator.
	#[serde(rename = "InfoType")]
	pub info_type: String,
	/// Verification ticket (`component_verify_ticket` pushes).
	#[serde(rename = "ComponentVerifyTicket", default)]
	pub component_verify_ticket: Option<String>,
	/// Account concerned by an authorization event.
	#[serde(rename = "AuthorizerAppid", default)]
	pub authorizer_appid: Option<String>,
	/// Authorization code carried by `authorized`/`updateauthorized` events.
	#[serde(rename = "AuthorizationCode", default)]
	pub authorization_code: Option<String>,
}
impl PushEvent {
	/// Returns `true` for the periodic verification ticket push.
	pub fn is_verify_ticket(&self) -> bool {
		self.info_type == INFO_TYPE_VERIFY_TICKET
	}
}

#[derive(Deserialize)]
struct EncryptedBody {
	#[serde(rename = "Encrypt")]
	encrypt: String,
}

/// Authenticates and decrypts a callback body.
///
/// `body` is the raw XML the platform posted (`<xml><Encrypt>...</Encrypt></xml>`). The
/// signature is checked before any decryption is attempted.
pub fn open_callback(
	codec: &MessageCodec,
	message_token: &str,
	query: &CallbackQuery,
	body: &str,
) -> Result<String> {
	let envelope: EncryptedBody =
		quick_xml::de::from_str(body).map_err(|source| Error::MalformedPush { source })?;

	query.verify_message(message_token, &envelope.encrypt)?;

	codec.decrypt_str(&envelope.encrypt)
}

impl<C> Broker<C>
where
	C: ?Sized + PlatformHttpClient,
{
	/// Handles a push to the authorization-event URL.
	///
	/// Verification tickets are stored with [`Broker::save_ticket`]; every decrypted event,
	/// ticket or not, is returned so the caller can act on authorization changes.
	pub async fn handle_ticket_push(&self, query: &CallbackQuery, body: &str) -> Result<PushEvent> {
		const KIND: FlowKind = FlowKind::Callback;

		let span = FlowSpan::new(KIND, "handle_ticket_push");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let codec = self.config.codec()?;
				let plaintext = open_callback(&codec, self.config.message_token()?, query, body)?;
				let event: PushEvent = quick_xml::de::from_str(&plaintext)
					.map_err(|source| Error::MalformedPush { source })?;

				if event.is_verify_ticket() {
					match event.component_verify_ticket.as_deref().filter(|t| !t.is_empty()) {
						Some(ticket) => self.save_ticket(ticket).await?,
						None => obs::note("empty_verify_ticket", &self.config.app_id),
					}
				}

				Ok(event)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
