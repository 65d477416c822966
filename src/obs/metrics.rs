// std
use std::time::Duration as StdDuration;
// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counts one flow outcome as `bearer_session_flow_total{flow, outcome}`.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_session_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how long a finished flow ran as `bearer_session_flow_seconds{flow}`.
pub fn record_flow_duration(kind: FlowKind, elapsed: StdDuration) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("bearer_session_flow_seconds", "flow" => kind.as_str())
			.record(elapsed.as_secs_f64());
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, elapsed);
	}
}
