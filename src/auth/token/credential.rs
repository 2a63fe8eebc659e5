//! Cached credential records, validity predicates, and expiry buffering.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Margin subtracted from every server-reported lifetime before a credential is cached.
pub const TOKEN_BUFFER: Duration = Duration::seconds(10);
/// Longest lifetime accepted from the remote platform.
pub const MAX_REMOTE_LIFETIME: Duration = Duration::days(366);

/// Which access token a credential represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialClass {
	/// Platform-level token, refreshed with the pushed verification ticket.
	Platform,
	/// Per-account token, refreshed with the account's refresh token.
	Account,
}
impl CredentialClass {
	/// Returns a stable label suitable for span fields and cache keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Platform => "component",
			Self::Account => "authorizer",
		}
	}
}
impl Display for CredentialClass {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Access token plus its buffered expiry, as stored in the shared cache.
///
/// `expires_at` always holds `issued + expires_in - buffer`, never the raw server lifetime.
/// The JSON shape (`accessToken`, `expireTime` in Unix milliseconds, optional `refreshToken`) is
/// shared with every other process reading the same cache.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CredentialWire", from = "CredentialWire")]
pub struct Credential {
	/// Bearer value presented to the remote platform.
	pub access_token: TokenSecret,
	/// Buffered instant after which the credential is treated as expired.
	pub expires_at: OffsetDateTime,
	/// Refresh value; present for per-account credentials only.
	pub refresh_token: Option<TokenSecret>,
}
impl Credential {
	/// Builds a credential from a freshly issued lifetime, applying `buffer`.
	pub fn issue(
		access_token: impl Into<String>,
		expires_in: Duration,
		buffer: Duration,
		issued_at: OffsetDateTime,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			expires_at: buffered_expiry(issued_at, expires_in, buffer),
			refresh_token: None,
		}
	}

	/// Builds a credential from the `expires_in` seconds reported by the remote platform.
	///
	/// The lifetime must outlive `buffer` and stay within [`MAX_REMOTE_LIFETIME`], so the result
	/// is valid at `issued_at`.
	pub fn from_remote(
		access_token: impl Into<String>,
		expires_in: i64,
		buffer: Duration,
		issued_at: OffsetDateTime,
	) -> Result<Self> {
		let lifetime = Duration::seconds(expires_in);

		if lifetime <= buffer || lifetime > MAX_REMOTE_LIFETIME {
			return Err(Error::InvalidLifetime { expires_in });
		}

		Ok(Self::issue(access_token, lifetime, buffer, issued_at))
	}

	/// Attaches the refresh value for per-account credentials.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(refresh_token));

		self
	}

	/// Returns `true` while `instant` is strictly before the buffered expiry.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}

	/// Convenience helper that checks validity against the current UTC clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Time left before the buffered expiry; zero once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialWire {
	access_token: TokenSecret,
	expire_time: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_token: Option<TokenSecret>,
}
impl From<Credential> for CredentialWire {
	fn from(value: Credential) -> Self {
		let millis = value.expires_at.unix_timestamp_nanos() / 1_000_000;

		Self {
			access_token: value.access_token,
			expire_time: i64::try_from(millis).unwrap_or(i64::MAX),
			refresh_token: value.refresh_token,
		}
	}
}
impl From<CredentialWire> for Credential {
	fn from(value: CredentialWire) -> Self {
		// Out-of-range timestamps degrade to "already expired" so the record gets refreshed.
		let expires_at =
			OffsetDateTime::from_unix_timestamp_nanos(i128::from(value.expire_time) * 1_000_000)
				.unwrap_or(OffsetDateTime::UNIX_EPOCH);

		Self { access_token: value.access_token, expires_at, refresh_token: value.refresh_token }
	}
}

/// Computes `issued_at + expires_in - buffer`, rounded up to the millisecond precision of the
/// cached wire format.
pub fn buffered_expiry(
	issued_at: OffsetDateTime,
	expires_in: Duration,
	buffer: Duration,
) -> OffsetDateTime {
	let expiry = issued_at + expires_in - buffer;

	match expiry.nanosecond() % 1_000_000 {
		0 => expiry,
		sub_millis => expiry + Duration::nanoseconds(i64::from(1_000_000 - sub_millis)),
	}
}
