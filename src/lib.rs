//! Multi-tenant access-token broker for third-party platform services—fleet-safe refreshes over
//! a shared cache, distributed locks, and callback message crypto in one crate.
//!
//! The [`flows::Broker`] answers "give me a usable credential" for the platform itself and for
//! every authorized account. Cached credentials are served without locking; stale ones are
//! refreshed by exactly one holder of a [`lock::LockManager`] lease at a time across every
//! process that shares the same [`store::SharedStore`]. [`crypto`] authenticates and decrypts
//! the payloads the platform pushes back to the service.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod http;
pub mod lock;
pub mod obs;
pub mod platform;
pub mod store;

mod remote;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
