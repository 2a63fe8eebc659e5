//! Callback message crypto: envelope encryption plus the sorted-hash signature.
//!
//! Inbound callbacks are authenticated with [`signature::verify`] before their ciphertext is
//! handed to [`codec::MessageCodec::decrypt`]; the two never run in the opposite order.

pub mod codec;
pub mod signature;

pub use codec::*;
pub use signature::*;
