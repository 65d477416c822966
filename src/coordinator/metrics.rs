// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for renewal coordination.
#[derive(Debug, Default)]
pub struct RenewalMetrics {
	attempts: AtomicU64,
	joins: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RenewalMetrics {
	/// Returns the number of remote renewal calls started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of callers that joined an attempt already in flight.
	pub fn joins(&self) -> u64 {
		self.joins.load(Ordering::Relaxed)
	}

	/// Returns the number of attempts that installed a new credential.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of attempts that resolved to a failure.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joins.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
