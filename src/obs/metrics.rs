//! Broker flow counter.

// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter incremented for every broker flow event, labeled by `flow` and `outcome`.
pub const FLOW_COUNTER: &str = "platform_token_broker_flow_total";

/// Bumps [`FLOW_COUNTER`] for `kind`.
///
/// Each public broker operation records one `attempt` on entry and one `success` or `failure`
/// when it returns, so `attempt - success - failure` is the number of operations in flight.
/// Without the `metrics` feature this compiles to nothing.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(FLOW_COUNTER, "flow" => kind.as_str(), "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	const KINDS: [FlowKind; 5] = [
		FlowKind::ComponentToken,
		FlowKind::AuthorizerToken,
		FlowKind::AuthorizerInfo,
		FlowKind::QueryAuth,
		FlowKind::Callback,
	];

	#[test]
	fn every_flow_has_a_distinct_label() {
		let labels = KINDS.iter().map(|kind| kind.as_str()).collect::<HashSet<_>>();

		assert_eq!(labels.len(), KINDS.len());
		assert!(FLOW_COUNTER.starts_with("platform_token_broker_"));
	}

	#[test]
	fn recording_without_a_recorder_is_harmless() {
		for kind in KINDS {
			for outcome in [FlowOutcome::Attempt, FlowOutcome::Success, FlowOutcome::Failure] {
				record_flow_outcome(kind, outcome);
			}
		}
	}
}
