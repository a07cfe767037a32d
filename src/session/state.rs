//! Coordination state guarded by the session lock.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKind, TokenSecret},
	session::queue::PendingQueue,
	transport::ExchangeRequest,
};

/// Externally visible lifecycle state, derived from the token and the flight phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
	/// No token is held.
	Unauthorized,
	/// A token is held and usable.
	Authorized,
	/// A token is held but reached `expires_at - expiry_margin`.
	Expired,
	/// An exchange is in flight.
	Refreshing,
}
impl LifecycleState {
	/// Stable label for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unauthorized => "unauthorized",
			Self::Authorized => "authorized",
			Self::Expired => "expired",
			Self::Refreshing => "refreshing",
		}
	}
}
impl Display for LifecycleState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Identity of a flight, deciding which waiters may share its outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FlightKey {
	/// Refresh or client credentials; shares any outcome.
	Acquire,
	/// Authorization code exchange; only shares with callers holding the same code.
	Code(TokenSecret),
	/// Logout; every waiter observes it.
	Cancelled,
}
impl FlightKey {
	/// Whether a caller wanting `wanted` may adopt the outcome of a flight keyed `self`.
	pub(crate) fn satisfies(&self, wanted: &FlightKey) -> bool {
		match (self, wanted) {
			(Self::Cancelled, _) | (_, Self::Acquire) => true,
			(Self::Code(settled), Self::Code(wanted)) => settled == wanted,
			_ => false,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum Phase {
	#[default]
	Idle,
	Refreshing { episode: u64 },
}

/// Last finished flight, so waiters that queued behind it can adopt its result.
#[derive(Clone, Debug)]
pub(crate) struct Settled {
	pub(crate) key: FlightKey,
	pub(crate) outcome: Result<AccessToken>,
}

/// Refresh value kept aside after a transient failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RetryCredential {
	pub(crate) refresh_token: TokenSecret,
	pub(crate) kind: TokenKind,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
	pub(crate) token: Option<AccessToken>,
	pub(crate) retry: Option<RetryCredential>,
	pub(crate) phase: Phase,
	pub(crate) queue: PendingQueue,
	pub(crate) generation: u64,
	pub(crate) episodes: u64,
	pub(crate) settled_seq: u64,
	pub(crate) settled: Option<Settled>,
}
impl SessionState {
	pub(crate) fn lifecycle(&self, now: OffsetDateTime, margin: Duration) -> LifecycleState {
		match (&self.phase, &self.token) {
			(Phase::Refreshing { .. }, _) => LifecycleState::Refreshing,
			(Phase::Idle, None) => LifecycleState::Unauthorized,
			(Phase::Idle, Some(token)) if token.is_expired_at(now, margin) =>
				LifecycleState::Expired,
			(Phase::Idle, Some(_)) => LifecycleState::Authorized,
		}
	}

	/// Token usable right now, provided nothing is waiting ahead of a new caller.
	pub(crate) fn ready_token(&self, now: OffsetDateTime, margin: Duration) -> Option<AccessToken> {
		self.token.as_ref().filter(|token| !token.is_expired_at(now, margin)).cloned()
	}

	/// Exchange that would yield a token without user interaction.
	pub(crate) fn silent_grant(&self, client_credentials_fallback: bool) -> Option<ExchangeRequest> {
		let refresh = self
			.token
			.as_ref()
			.and_then(|token| token.refresh_token.clone())
			.or_else(|| self.retry.as_ref().map(|retry| retry.refresh_token.clone()));

		match refresh {
			Some(refresh_token) => Some(ExchangeRequest::Refresh { refresh_token }),
			None if client_credentials_fallback => Some(ExchangeRequest::ClientCredentials),
			None => None,
		}
	}

	/// Kind to carry over when a refresh response does not identify the user.
	pub(crate) fn prior_kind(&self) -> Option<TokenKind> {
		self.token
			.as_ref()
			.map(|token| token.kind.clone())
			.or_else(|| self.retry.as_ref().map(|retry| retry.kind.clone()))
	}

	/// Refresh value worth keeping when the current token has to go after a transient failure.
	pub(crate) fn retry_credential(&self) -> Option<RetryCredential> {
		match &self.token {
			Some(AccessToken { refresh_token: Some(refresh_token), kind, .. }) =>
				Some(RetryCredential { refresh_token: refresh_token.clone(), kind: kind.clone() }),
			_ => self.retry.clone(),
		}
	}

	pub(crate) fn is_refreshing(&self) -> bool {
		matches!(self.phase, Phase::Refreshing { .. })
	}

	pub(crate) fn begin_episode(&mut self) -> u64 {
		self.episodes += 1;
		self.phase = Phase::Refreshing { episode: self.episodes };

		self.episodes
	}

	pub(crate) fn end_episode(&mut self, episode: u64) {
		if self.phase == (Phase::Refreshing { episode }) {
			self.phase = Phase::Idle;
		}
	}

	pub(crate) fn settle(&mut self, key: FlightKey, outcome: Result<AccessToken>) {
		self.settled_seq += 1;
		self.settled = Some(Settled { key, outcome });
	}

	/// Outcome of a flight settled after `seen` that a caller wanting `wanted` may adopt.
	pub(crate) fn adoptable(&self, seen: u64, wanted: &FlightKey) -> Option<Result<AccessToken>> {
		if self.settled_seq <= seen {
			return None;
		}

		self.settled
			.as_ref()
			.filter(|settled| settled.key.satisfies(wanted))
			.map(|settled| settled.outcome.clone())
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::UserId;

	fn token(refresh: Option<&str>) -> AccessToken {
		AccessToken::builder(TokenKind::User {
			id: UserId::new("u42").expect("User fixture should be valid."),
		})
		.access_token("tok1")
		.refresh_secret(refresh.map(TokenSecret::new))
		.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
		.expires_in(Duration::hours(1))
		.build()
		.expect("Token fixture should build.")
	}

	#[test]
	fn lifecycle_follows_token_and_phase() {
		let margin = Duration::seconds(60);
		let early = macros::datetime!(2025-01-01 00:10 UTC);
		let late = macros::datetime!(2025-01-01 00:59:30 UTC);
		let mut state = SessionState::default();

		assert_eq!(state.lifecycle(early, margin), LifecycleState::Unauthorized);

		state.token = Some(token(None));

		assert_eq!(state.lifecycle(early, margin), LifecycleState::Authorized);
		assert_eq!(state.lifecycle(late, margin), LifecycleState::Expired);
		assert!(state.ready_token(late, margin).is_none());

		let episode = state.begin_episode();

		assert_eq!(state.lifecycle(early, margin), LifecycleState::Refreshing);

		state.end_episode(episode + 1);

		assert!(state.is_refreshing());

		state.end_episode(episode);

		assert!(!state.is_refreshing());
	}

	#[test]
	fn silent_grant_prefers_refresh_then_fallback() {
		let mut state = SessionState::default();

		assert_eq!(state.silent_grant(false), None);
		assert_eq!(state.silent_grant(true), Some(ExchangeRequest::ClientCredentials));

		state.retry = Some(RetryCredential {
			refresh_token: TokenSecret::new("kept"),
			kind: TokenKind::Client,
		});

		assert_eq!(
			state.silent_grant(false),
			Some(ExchangeRequest::Refresh { refresh_token: TokenSecret::new("kept") }),
		);
		assert_eq!(state.prior_kind(), Some(TokenKind::Client));

		state.token = Some(token(Some("ref1")));

		assert_eq!(
			state.silent_grant(true),
			Some(ExchangeRequest::Refresh { refresh_token: TokenSecret::new("ref1") }),
		);
	}

	#[test]
	fn adoption_respects_flight_keys() {
		let mut state = SessionState::default();
		let code = FlightKey::Code(TokenSecret::new("authcode123"));

		state.settle(FlightKey::Acquire, Err(Error::NotAuthorized));

		assert!(state.adoptable(1, &FlightKey::Acquire).is_none());
		assert!(state.adoptable(0, &FlightKey::Acquire).is_some());
		assert!(state.adoptable(0, &code).is_none());

		state.settle(code.clone(), Err(Error::NotAuthorized));

		assert!(state.adoptable(1, &code).is_some());
		assert!(state.adoptable(1, &FlightKey::Code(TokenSecret::new("other"))).is_none());

		state.settle(FlightKey::Cancelled, Err(Error::LoggedOut));

		assert_eq!(state.adoptable(2, &code), Some(Err(Error::LoggedOut)));
	}
}
