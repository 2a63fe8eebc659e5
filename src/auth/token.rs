//! Credential value objects and secret wrappers.

pub mod credential;
pub mod secret;
