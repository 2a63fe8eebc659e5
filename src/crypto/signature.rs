//! SHA-1 signature over the sorted concatenation of callback parameters.

// crates.io
use sha1::{Digest, Sha1};

/// Inputs of a callback signature.
///
/// The parts are sorted in ascending byte order and concatenated without a separator before
/// hashing; the ordering is part of the wire contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureParts<'a> {
	/// Shared message token configured on both sides.
	pub token: &'a str,
	/// Timestamp query parameter.
	pub timestamp: &'a str,
	/// Nonce query parameter.
	pub nonce: &'a str,
	/// Ciphertext, present for encrypted payloads.
	pub encrypt: Option<&'a str>,
}
impl<'a> SignatureParts<'a> {
	/// Creates parts without ciphertext (plain URL verification).
	pub fn new(token: &'a str, timestamp: &'a str, nonce: &'a str) -> Self {
		Self { token, timestamp, nonce, encrypt: None }
	}

	/// Adds the ciphertext to the signed set.
	pub fn with_encrypt(mut self, encrypt: &'a str) -> Self {
		self.encrypt = Some(encrypt);

		self
	}
}

/// Computes the 40-character lowercase hex digest for `parts`.
pub fn sign(parts: &SignatureParts) -> String {
	let mut ordered = vec![parts.token, parts.timestamp, parts.nonce];

	ordered.extend(parts.encrypt);
	ordered.sort_unstable();

	let mut hasher = Sha1::new();

	for part in ordered {
		hasher.update(part.as_bytes());
	}

	hex::encode(hasher.finalize())
}

/// Recomputes the digest and compares it with `candidate` for exact equality.
///
/// The comparison is not constant-time.
pub fn verify(candidate: &str, parts: &SignatureParts) -> bool {
	sign(parts) == candidate
}
