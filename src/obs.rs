//! Optional observability helpers for session flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `oauth2_session.flow` with the `flow` (grant) and
//!   `stage` (call site) fields, plus `warn`/`debug` events for store failures and discarded
//!   exchange results.
//! - Enable `metrics` to increment the `oauth2_session_flow_total` counter for every
//!   attempt/success/failure/discard, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization code exchange after a login redirect.
	AuthorizationCode,
	/// Refresh token exchange.
	Refresh,
	/// Client credentials exchange.
	ClientCredentials,
	/// Server-side token revocation on logout.
	Revoke,
	/// One-time code issuance.
	OneTimeCode,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::Refresh => "refresh",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::Revoke => "revoke",
			FlowKind::OneTimeCode => "one_time_code",
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
	/// A transport call was started.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the callers.
	Failure,
	/// The result arrived after a logout and was thrown away.
	Discarded,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Discarded => "discarded",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
