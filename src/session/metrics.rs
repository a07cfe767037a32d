// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing session activity.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	exchanges: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	discarded: AtomicU64,
	queued: AtomicU64,
	replayed: AtomicU64,
}
impl SessionMetrics {
	/// Transport exchanges started.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Exchanges that installed a token.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Exchanges that failed, including timeouts.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Exchange results thrown away because a logout happened first.
	pub fn discarded(&self) -> u64 {
		self.discarded.load(Ordering::Relaxed)
	}

	/// Operations parked waiting for a token.
	pub fn queued(&self) -> u64 {
		self.queued.load(Ordering::Relaxed)
	}

	/// Parked operations that were handed a token and invoked.
	pub fn replayed(&self) -> u64 {
		self.replayed.load(Ordering::Relaxed)
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_discarded(&self) {
		self.discarded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_queued(&self) {
		self.queued.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_replayed(&self, count: usize) {
		self.replayed.fetch_add(count as u64, Ordering::Relaxed);
	}
}
