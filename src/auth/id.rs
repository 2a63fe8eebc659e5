//! Strongly typed tenant identifiers used in cache keys and envelopes.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;

/// Application identifier of a tenant: the platform itself or an authorized account.
///
/// Identifiers are embedded verbatim in `:`-separated cache keys and in encrypted envelopes,
/// so they must be non-empty, whitespace-free, and must not contain `:`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);
impl TenantId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Returns the identifier as raw bytes (the envelope's trailing tenant field).
	pub fn as_bytes(&self) -> &[u8] {
		self.0.as_bytes()
	}
}
impl Deref for TenantId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for TenantId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<TenantId> for String {
	fn from(value: TenantId) -> Self {
		value.0
	}
}
impl TryFrom<String> for TenantId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl Borrow<str> for TenantId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for TenantId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Tenant({})", self.0)
	}
}
impl Display for TenantId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for TenantId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("Tenant identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Tenant identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier contains the cache-key separator.
	#[error("Tenant identifier contains the key separator `:`.")]
	ContainsSeparator,
	/// The identifier exceeded the allowed character count.
	#[error("Tenant identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if view.contains(':') {
		return Err(IdentifierError::ContainsSeparator);
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
