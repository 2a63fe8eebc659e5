//! Optional observability helpers for broker flows and lock traffic.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `platform_token_broker.flow` with the `flow`
//!   and `stage` fields, plus `debug` events for cache hits, lock contention, and remote refreshes.
//! - Enable `metrics` to increment the `platform_token_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Broker operations observed by the instrumentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Platform-level credential lookup/refresh.
	ComponentToken,
	/// Per-account credential lookup/refresh.
	AuthorizerToken,
	/// Account-info lookup.
	AuthorizerInfo,
	/// Authorization-code exchange.
	QueryAuth,
	/// Inbound callback verification and decryption.
	Callback,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::ComponentToken => "component_token",
			FlowKind::AuthorizerToken => "authorizer_token",
			FlowKind::AuthorizerInfo => "authorizer_info",
			FlowKind::QueryAuth => "query_auth",
			FlowKind::Callback => "callback",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
