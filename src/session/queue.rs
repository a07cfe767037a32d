//! Operations parked until a token becomes available.

// std
use std::collections::VecDeque;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, auth::AccessToken};

/// Future produced by an operation once it has been handed a token.
pub(crate) type OperationFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
/// Receiving half held by the caller of a parked operation.
pub(crate) type Completion<T> = oneshot::Receiver<Result<OperationFuture<T>>>;

type Resolver = Box<dyn FnOnce(Result<AccessToken>) -> bool + Send>;

/// One parked operation.
///
/// Being in the queue means the operation has not been invoked yet. Resolving it either invokes
/// the operation with the new token and hands the resulting future to the waiting caller, or
/// hands the caller the failure.
pub(crate) struct PendingOperation {
	enqueued_at: OffsetDateTime,
	resolve: Resolver,
}
impl PendingOperation {
	pub(crate) fn new<F, Fut, T>(op: F) -> (Self, Completion<T>)
	where
		F: 'static + Send + FnOnce(AccessToken) -> Fut,
		Fut: 'static + Send + Future<Output = T>,
		T: 'static + Send,
	{
		let (tx, rx) = oneshot::channel();
		let resolve: Resolver = Box::new(move |outcome| {
			if tx.is_closed() {
				return false;
			}

			let outcome = outcome.map(|token| Box::pin(op(token)) as OperationFuture<T>);

			tx.send(outcome).is_ok()
		});

		(Self { enqueued_at: OffsetDateTime::now_utc(), resolve }, rx)
	}

	/// Resolves the operation; returns `false` when its caller has gone away.
	pub(crate) fn resolve(self, outcome: Result<AccessToken>) -> bool {
		(self.resolve)(outcome)
	}

	pub(crate) fn enqueued_at(&self) -> OffsetDateTime {
		self.enqueued_at
	}
}
impl Debug for PendingOperation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingOperation").field("enqueued_at", &self.enqueued_at).finish()
	}
}

/// FIFO of parked operations.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue(VecDeque<PendingOperation>);
impl PendingQueue {
	pub(crate) fn push(&mut self, op: PendingOperation) {
		self.0.push_back(op);
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub(crate) fn len(&self) -> usize {
		self.0.len()
	}

	/// Empties the queue, keeping arrival order.
	pub(crate) fn take(&mut self) -> Drained {
		Drained(std::mem::take(&mut self.0))
	}
}

/// Operations removed from the queue in one step, resolved outside the state lock.
#[derive(Debug, Default)]
#[must_use]
pub(crate) struct Drained(VecDeque<PendingOperation>);
impl Drained {
	/// Resolves every operation in arrival order with clones of `outcome`; returns how many
	/// callers were still waiting.
	pub(crate) fn resolve_all(self, outcome: &Result<AccessToken>) -> usize {
		let now = OffsetDateTime::now_utc();
		let mut delivered = 0;

		for op in self.0 {
			let waited = now - op.enqueued_at();

			if op.resolve(outcome.clone()) {
				delivered += 1;
			}

			crate::obs::debug_transition("queue.resolve", &waited);
		}

		delivered
	}
}
