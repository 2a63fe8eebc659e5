//! AES-256-CBC envelope codec for payloads exchanged with the remote platform.
//!
//! Plaintext envelope layout, in order:
//!
//! | bytes      | content                               |
//! |------------|---------------------------------------|
//! | 16         | random prefix                         |
//! | 4          | payload length, big-endian `u32`      |
//! | `len`      | payload                               |
//! | remainder  | tenant identifier (raw bytes)         |
//!
//! The envelope is PKCS#7-padded to a 32-byte boundary by hand, then encrypted with the cipher's
//! own padding disabled. The initialization vector is the first 16 bytes of the key itself. That
//! reuse is what the remote platform does on its side, so it has to stay exactly as is for
//! ciphertexts to interoperate.

// crates.io
use base64::{
	Engine,
	alphabet,
	engine::{GeneralPurpose, GeneralPurposeConfig, general_purpose::STANDARD},
};
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
// self
use crate::{
	_prelude::*,
	auth::TenantId,
	error::{AuthenticityError, ConfigError},
};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_TEXT_LEN: usize = 43;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const RANDOM_PREFIX_LEN: usize = 16;
const HEADER_LEN: usize = RANDOM_PREFIX_LEN + 4;
const PAD_BLOCK: usize = 32;

// Provisioned keys are random text, so the 2 spare bits of the final character are rarely zero.
const KEY_ENGINE: GeneralPurpose =
	GeneralPurpose::new(&alphabet::STANDARD, GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true));

/// 32-byte key decoded from the 43-character provisioned text.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodingAesKey([u8; KEY_LEN]);
impl EncodingAesKey {
	/// Decodes the provisioned text (43 base64 characters, trailing `=` implied).
	pub fn new(text: &str) -> Result<Self, ConfigError> {
		if text.len() != KEY_TEXT_LEN {
			return Err(ConfigError::InvalidEncodingAesKey);
		}

		let bytes =
			KEY_ENGINE.decode(format!("{text}=")).map_err(|_| ConfigError::InvalidEncodingAesKey)?;
		let key = <[u8; KEY_LEN]>::try_from(bytes.as_slice())
			.map_err(|_| ConfigError::InvalidEncodingAesKey)?;

		Ok(Self(key))
	}

	/// Raw key bytes.
	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.0
	}

	/// Initialization vector: the first 16 key bytes.
	pub fn iv(&self) -> &[u8] {
		&self.0[..IV_LEN]
	}
}
impl Debug for EncodingAesKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("EncodingAesKey(<redacted>)")
	}
}
impl FromStr for EncodingAesKey {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

/// Encrypts and decrypts envelopes bound to one tenant.
#[derive(Clone, Debug)]
pub struct MessageCodec {
	tenant: TenantId,
	key: EncodingAesKey,
}
impl MessageCodec {
	/// Creates a codec for `tenant` using `key`.
	pub fn new(tenant: TenantId, key: EncodingAesKey) -> Self {
		Self { tenant, key }
	}

	/// Tenant embedded in (and expected from) every envelope.
	pub fn tenant(&self) -> &TenantId {
		&self.tenant
	}

	/// Seals `plaintext` into a base64 ciphertext with a fresh random prefix.
	pub fn encrypt(&self, plaintext: impl AsRef<[u8]>) -> Result<String> {
		let envelope = self.envelope(plaintext.as_ref())?;

		self.seal(envelope)
	}

	/// Opens a base64 ciphertext and returns the payload bytes.
	///
	/// Fails with [`AuthenticityError::TenantMismatch`] when the envelope names another tenant and
	/// with [`AuthenticityError::MalformedCiphertext`] for anything that is not a well-formed
	/// envelope (bad base64, bad padding, truncated header, out-of-range length).
	pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
		let envelope = self.open(ciphertext)?;

		if envelope.len() < HEADER_LEN {
			return Err(malformed("envelope is shorter than its header"));
		}

		let mut len = [0_u8; 4];

		len.copy_from_slice(&envelope[RANDOM_PREFIX_LEN..HEADER_LEN]);

		let payload_end = usize::try_from(u32::from_be_bytes(len))
			.ok()
			.and_then(|len| HEADER_LEN.checked_add(len))
			.filter(|end| *end <= envelope.len())
			.ok_or_else(|| malformed("declared length exceeds the envelope"))?;
		let found = &envelope[payload_end..];

		if found != self.tenant.as_bytes() {
			return Err(AuthenticityError::TenantMismatch {
				expected: self.tenant.to_string(),
				found: String::from_utf8_lossy(found).into_owned(),
			}
			.into());
		}

		Ok(envelope[HEADER_LEN..payload_end].to_vec())
	}

	/// Same as [`MessageCodec::decrypt`] but requires a UTF-8 payload.
	pub fn decrypt_str(&self, ciphertext: &str) -> Result<String> {
		String::from_utf8(self.decrypt(ciphertext)?)
			.map_err(|_| malformed("payload is not valid UTF-8"))
	}

	fn envelope(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let len = u32::try_from(plaintext.len())
			.map_err(|_| Error::PayloadTooLarge { len: plaintext.len() })?;
		let tenant = self.tenant.as_bytes();
		let mut envelope =
			Vec::with_capacity(HEADER_LEN + plaintext.len() + tenant.len() + PAD_BLOCK);

		envelope.extend_from_slice(&rand::random::<[u8; RANDOM_PREFIX_LEN]>());
		envelope.extend_from_slice(&len.to_be_bytes());
		envelope.extend_from_slice(plaintext);
		envelope.extend_from_slice(tenant);

		Ok(envelope)
	}

	fn seal(&self, mut buf: Vec<u8>) -> Result<String> {
		let pad = PAD_BLOCK - buf.len() % PAD_BLOCK;

		// `pad` is in 1..=32.
		buf.resize(buf.len() + pad, pad as u8);

		let len = buf.len();
		let cipher = Aes256CbcEnc::new_from_slices(self.key.as_bytes(), self.key.iv())
			.map_err(|_| ConfigError::InvalidEncodingAesKey)?;
		let sealed = cipher
			.encrypt_padded_mut::<NoPadding>(&mut buf, len)
			.map_err(|_| malformed("padded envelope is not block aligned"))?;

		Ok(STANDARD.encode(sealed))
	}

	fn open(&self, ciphertext: &str) -> Result<Vec<u8>> {
		let mut buf = STANDARD.decode(ciphertext.trim()).map_err(|_| malformed("invalid base64"))?;

		if buf.is_empty() || buf.len() % IV_LEN != 0 {
			return Err(malformed("length is not a multiple of the cipher block"));
		}

		let cipher = Aes256CbcDec::new_from_slices(self.key.as_bytes(), self.key.iv())
			.map_err(|_| ConfigError::InvalidEncodingAesKey)?;
		let plain_len = cipher
			.decrypt_padded_mut::<NoPadding>(&mut buf)
			.map_err(|_| malformed("cipher rejected the block layout"))?
			.len();

		buf.truncate(plain_len);

		let pad = usize::from(buf[buf.len() - 1]);

		if pad == 0 || pad > PAD_BLOCK || pad > buf.len() {
			return Err(malformed("invalid padding"));
		}

		buf.truncate(buf.len() - pad);

		Ok(buf)
	}
}

fn malformed(reason: &'static str) -> Error {
	AuthenticityError::MalformedCiphertext { reason }.into()
}
