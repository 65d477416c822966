// std
use std::time::Instant;
// crates.io
use tracing::{Span, field, instrument::Instrumented, span::EnteredSpan};
// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
};

/// One run of a session flow, tagged with the session epoch it served.
///
/// [`FlowSpan::start`] counts the attempt; [`FlowSpan::finish`] stamps the outcome on the span and
/// reports it together with the elapsed time.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	kind: FlowKind,
	span: Span,
	started: Instant,
}
impl FlowSpan {
	/// Opens a `bearer_session.flow` span for `kind` at `stage`.
	pub fn start(kind: FlowKind, stage: &'static str, epoch: u64) -> Self {
		let span = tracing::info_span!(
			"bearer_session.flow",
			flow = kind.as_str(),
			stage,
			epoch,
			outcome = field::Empty
		);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		Self { kind, span, started: Instant::now() }
	}

	/// Enters the span for a synchronous section.
	pub fn entered(&self) -> EnteredSpan {
		self.span.clone().entered()
	}

	/// Runs `fut` inside the span.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		tracing::Instrument::instrument(fut, self.span.clone())
	}

	/// Closes the flow with `outcome`.
	pub fn finish(self, outcome: FlowOutcome) {
		self.span.record("outcome", outcome.as_str());

		obs::record_flow_outcome(self.kind, outcome);
		obs::record_flow_duration(self.kind, self.started.elapsed());
	}
}
