//! Observability helpers for session flows.
//!
//! Every flow runs inside a `tracing` span named `bearer_session.flow` carrying `flow`, `stage`,
//! the session `epoch`, and, once finished, `outcome`. With the `metrics` feature the same events
//! feed `bearer_session_flow_total{flow, outcome}` and `bearer_session_flow_seconds{flow}`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Session flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Remote renewal through the refresh coordinator.
	Renewal,
	/// Authorized request through the pipeline.
	Request,
	/// Expiration monitor check.
	Monitor,
	/// Escalation after an unrecoverable renewal failure.
	Escalation,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Renewal => "renewal",
			FlowKind::Request => "request",
			FlowKind::Monitor => "monitor",
			FlowKind::Escalation => "escalation",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// The caller joined work already in progress instead of starting new work.
	Joined,
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
			FlowOutcome::Joined => "joined",
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
