//! Broker-level error types shared across flows, locks, stores, and the callback codec.

// self
use crate::{_prelude::*, auth::TenantId};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Shared-store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (network, TLS, non-2xx status).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Remote platform answered with a non-zero `errcode`.
	#[error(transparent)]
	RemoteApi(#[from] RemoteApiError),
	/// Inbound payload failed signature or tenant verification.
	#[error(transparent)]
	Authenticity(#[from] AuthenticityError),

	/// Remote endpoint answered 2xx with a body that does not match the expected shape.
	#[error("The {endpoint} endpoint returned a malformed body.")]
	MalformedResponse {
		/// Endpoint label.
		endpoint: &'static str,
		/// Structured parsing failure including the failing field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Remote platform reported a lifetime that is not usable after buffering.
	#[error("Remote lifetime of {expires_in}s does not outlive the expiry buffer or is out of range.")]
	InvalidLifetime {
		/// Lifetime in seconds as reported.
		expires_in: i64,
	},
	/// Decrypted callback payload is not a well-formed push message.
	#[error("Callback payload is not a well-formed push message.")]
	MalformedPush {
		/// XML decoding failure.
		#[source]
		source: quick_xml::DeError,
	},
	/// Distributed lock could not be acquired within the bounded retries.
	#[error("Failed to acquire lock `{key}`.")]
	LockUnavailable {
		/// Lock key that stayed contended.
		key: String,
	},
	/// Outbound plaintext does not fit the envelope's 32-bit length prefix.
	#[error("Payload of {len} bytes exceeds the envelope length prefix.")]
	PayloadTooLarge {
		/// Plaintext length in bytes.
		len: usize,
	},
	/// Platform verification ticket has not been pushed (or has expired).
	#[error("Verification ticket for `{tenant}` is not available.")]
	TicketUnavailable {
		/// Platform tenant whose ticket is missing.
		tenant: TenantId,
	},
}
impl Error {
	/// Returns the remote error when the platform rejected the presented access token.
	pub fn as_token_invalid(&self) -> Option<&RemoteApiError> {
		match self {
			Self::RemoteApi(err) if err.is_token_invalid() => Some(err),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Encoding AES key does not decode to 32 bytes.
	#[error("Encoding AES key must be 43 base64 characters decoding to 32 bytes.")]
	InvalidEncodingAesKey,
	/// Platform descriptor failed validation.
	#[error(transparent)]
	InvalidDescriptor(#[from] crate::platform::PlatformDescriptorError),
	/// A configuration field is empty or out of range.
	#[error("Configuration field `{field}` is missing or invalid.")]
	MissingField {
		/// Name of the offending field.
		field: &'static str,
	},
	/// Lock lease must be a positive duration.
	#[error("Lock lease must be positive.")]
	NonPositiveLease,
	/// Callback crypto requires an encoding AES key.
	#[error("Component configuration has no encoding AES key.")]
	MissingEncodingAesKey,
	/// Outbound request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, non-2xx status). Never retried by the broker.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the remote platform.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Remote endpoint answered with a non-2xx status.
	#[error("The {endpoint} endpoint answered with HTTP {status}.")]
	Status {
		/// Endpoint label.
		endpoint: &'static str,
		/// HTTP status code.
		status: u16,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote platform.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Application-level error reported in a 2xx body through a non-zero `errcode`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("Remote platform returned error {code}: {message}.")]
pub struct RemoteApiError {
	/// Original `errcode`.
	pub code: i64,
	/// Original `errmsg`.
	pub message: String,
}
impl RemoteApiError {
	/// `errcode` for an invalid credential or secret.
	pub const INVALID_CREDENTIAL: i64 = 40001;
	/// `errcode` for an invalid access token.
	pub const INVALID_ACCESS_TOKEN: i64 = 40014;
	/// `errcode` for an expired access token.
	pub const ACCESS_TOKEN_EXPIRED: i64 = 42001;

	/// Creates a new error from the raw envelope fields.
	pub fn new(code: i64, message: impl Into<String>) -> Self {
		Self { code, message: message.into() }
	}

	/// Returns `true` when the code means the presented access token must be refreshed.
	pub fn is_token_invalid(&self) -> bool {
		matches!(
			self.code,
			Self::INVALID_CREDENTIAL | Self::INVALID_ACCESS_TOKEN | Self::ACCESS_TOKEN_EXPIRED
		)
	}
}

/// Failures that mark an inbound callback as untrusted.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthenticityError {
	/// Recomputed signature differs from the presented one.
	#[error("Callback signature does not match.")]
	SignatureMismatch,
	/// Decrypted envelope names a different tenant.
	#[error("Envelope tenant mismatch: expected `{expected}`, found `{found}`.")]
	TenantMismatch {
		/// Tenant the codec was configured for.
		expected: String,
		/// Tenant embedded in the envelope.
		found: String,
	},
	/// Ciphertext could not be decoded into a well-formed envelope.
	#[error("Ciphertext is malformed: {reason}.")]
	MalformedCiphertext {
		/// Short description of the defect.
		reason: &'static str,
	},
}
