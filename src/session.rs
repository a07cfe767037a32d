//! Token lifecycle manager and request queue coordinator.
//!
//! A [`Session`] owns the current [`AccessToken`] and serializes every transition behind one
//! coordination lock. Token exchanges are single-flight: callers that arrive while an exchange
//! is running wait on the flight guard and then adopt its outcome instead of starting a second
//! transport call. Operations submitted through [`Session::run_authorized`] run immediately
//! when a usable token is held; otherwise they are parked in FIFO order and replayed with the
//! next installed token, or all resolved with the same failure.
//!
//! Logout bumps a generation counter. An exchange that settles under an older generation is
//! discarded, and store writes go through a persistence gate so logout's removal always lands
//! last.

mod metrics;
mod queue;
mod state;

pub use metrics::SessionMetrics;
pub use state::LifecycleState;

// std
use std::sync::Weak;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKind, TokenSecret, UserId},
	config::{ClientConfig, RefreshPolicy},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::{
		queue::PendingOperation,
		state::{FlightKey, SessionState},
	},
	store::SecureStore,
	transport::{
		self, AuthorizationTransport, ExchangeRequest, FailureKind, TokenGrant, TransportFailure,
	},
	urls::{RedirectPath, UrlBuilder},
};

/// Token lifecycle manager shared by every clone of a [`Client`](crate::client::Client).
pub struct Session {
	config: ClientConfig,
	transport: Arc<dyn AuthorizationTransport>,
	store: Arc<dyn SecureStore>,
	state: Mutex<SessionState>,
	dispatch: Mutex<()>,
	flight: AsyncMutex<()>,
	persist: AsyncMutex<()>,
	metrics: SessionMetrics,
	this: Weak<Session>,
}
impl Session {
	/// Creates an unauthorized session.
	pub fn new(
		config: ClientConfig,
		transport: Arc<dyn AuthorizationTransport>,
		store: Arc<dyn SecureStore>,
	) -> Arc<Self> {
		Arc::new_cyclic(|this| Self {
			config,
			transport,
			store,
			state: Mutex::new(SessionState::default()),
			dispatch: Mutex::new(()),
			flight: AsyncMutex::new(()),
			persist: AsyncMutex::new(()),
			metrics: SessionMetrics::default(),
			this: this.clone(),
		})
	}

	/// Configuration the session was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Activity counters.
	pub fn metrics(&self) -> &SessionMetrics {
		&self.metrics
	}

	/// Transport used for exchanges, revocation, and one-time codes.
	pub fn transport(&self) -> &dyn AuthorizationTransport {
		self.transport.as_ref()
	}

	/// Loads the persisted token once. Does nothing when persistence is disabled or a token is
	/// already held.
	pub async fn restore(&self) -> Option<AccessToken> {
		if !self.config.save_to_store {
			return None;
		}

		let generation = self.state.lock().generation;
		let loaded = {
			let _persist = self.persist.lock().await;

			self.store.load(&self.config.store_key).await
		};
		let token = match loaded {
			Ok(token) => token?,
			Err(e) => {
				obs::warn_ignored("store.load", &e);

				return None;
			},
		};
		let installed = {
			let mut state = self.state.lock();

			if state.generation == generation && state.token.is_none() && !state.is_refreshing() {
				state.token = Some(token.clone());

				true
			} else {
				false
			}
		};

		if !installed {
			return None;
		}

		obs::debug_transition("restore", &self.lifecycle());
		self.schedule_refresh(&token, generation);

		Some(token)
	}

	/// Current lifecycle state.
	pub fn lifecycle(&self) -> LifecycleState {
		self.state.lock().lifecycle(OffsetDateTime::now_utc(), self.config.expiry_margin)
	}

	/// Returns `true` when a token is held that is unexpired or can be renewed silently.
	pub fn is_authorized(&self) -> bool {
		let margin = self.config.expiry_margin;
		let fallback = self.config.client_credentials_fallback;

		self.state.lock().token.as_ref().is_some_and(|token| {
			!token.is_expired(margin)
				|| token.can_refresh()
				|| (token.is_client_token() && fallback)
		})
	}

	/// Returns `true` when no token is held or `now >= expires_at - expiry_margin`.
	pub fn has_expired(&self) -> bool {
		self.state
			.lock()
			.token
			.as_ref()
			.is_none_or(|token| token.is_expired(self.config.expiry_margin))
	}

	/// Held token, whether or not it is expired.
	pub fn current_token(&self) -> Result<AccessToken> {
		self.state.lock().token.clone().ok_or(Error::NotAuthorized)
	}

	/// User the held token belongs to.
	pub fn current_user_id(&self) -> Option<UserId> {
		self.state.lock().token.as_ref().and_then(|token| token.user_id().cloned())
	}

	/// Number of operations waiting for a token.
	pub fn pending_operations(&self) -> usize {
		self.state.lock().queue.len()
	}

	/// Runs `op` with a valid token, waiting for (and if needed triggering) an exchange first.
	///
	/// Operations that cannot run immediately are invoked in arrival order once a token is
	/// installed. When the exchange fails, every waiting operation receives the same error.
	/// With no way to obtain a token at all, the call fails with [`Error::NotAuthorized`]
	/// without waiting.
	pub async fn run_authorized<F, Fut, T>(&self, op: F) -> Result<T>
	where
		F: 'static + Send + FnOnce(AccessToken) -> Fut,
		Fut: 'static + Send + Future<Output = T>,
		T: 'static + Send,
	{
		let (pending, completion) = PendingOperation::new(op);
		let parked = {
			let _dispatch = self.dispatch.lock();
			let mut state = self.state.lock();
			let ready = state
				.ready_token(OffsetDateTime::now_utc(), self.config.expiry_margin)
				.filter(|_| state.queue.is_empty());

			match ready {
				Some(token) => {
					drop(state);
					pending.resolve(Ok(token));

					None
				},
				None if state.is_refreshing()
					|| state.silent_grant(self.config.client_credentials_fallback).is_some() =>
				{
					state.queue.push(pending);

					Some(state.settled_seq)
				},
				None => return Err(Error::NotAuthorized),
			}
		};

		if let Some(seen) = parked {
			self.metrics.record_queued();

			// The outcome reaches this caller through `completion`.
			let _ = self.acquire(Want::Silent, Some(seen)).await;
		}

		match completion.await {
			Ok(Ok(fut)) => Ok(fut.await),
			Ok(Err(e)) => Err(e),
			Err(_) => Err(Error::NotAuthorized),
		}
	}

	/// Exchanges an authorization code from the login redirect.
	///
	/// A code is single-use, so this call never adopts the outcome of a refresh or client
	/// credentials exchange that is already running. It waits for that flight to settle and
	/// then makes its own transport call. Callers submitting the same code while its exchange
	/// is in flight share that one call.
	pub async fn exchange_authorization_code(&self, code: impl Into<String>) -> Result<AccessToken> {
		self.exchange_authorization_code_at(code, RedirectPath::Login).await
	}

	/// Exchanges an authorization code that was delivered to the `redirect` target.
	pub async fn exchange_authorization_code_at(
		&self,
		code: impl Into<String>,
		redirect: RedirectPath,
	) -> Result<AccessToken> {
		self.acquire(Want::Code(TokenSecret::new(code), redirect), None).await
	}

	/// Renews the token with the refresh value, or the client credentials grant when the
	/// fallback is enabled, joining an exchange that is already running.
	pub async fn refresh(&self) -> Result<AccessToken> {
		self.acquire(Want::Silent, None).await
	}

	/// Obtains an application-level token, joining an exchange that is already running.
	pub async fn exchange_client_credentials(&self) -> Result<AccessToken> {
		self.acquire(Want::ClientCredentials, None).await
	}

	/// Drops the token, fails every waiting operation with [`Error::LoggedOut`], and removes
	/// the persisted record. Any exchange still in flight is discarded when it settles.
	pub async fn invalidate(&self) -> Option<AccessToken> {
		let (previous, drained) = {
			let mut state = self.state.lock();

			state.generation += 1;
			state.retry = None;
			state.phase = Default::default();
			state.settle(FlightKey::Cancelled, Err(Error::LoggedOut));

			(state.token.take(), state.queue.take())
		};

		drained.resolve_all(&Err(Error::LoggedOut));
		obs::debug_transition("logout", &LifecycleState::Unauthorized);

		let _persist = self.persist.lock().await;

		if let Err(e) = self.store.remove(&self.config.store_key).await {
			obs::warn_ignored("store.remove", &e);
		}

		previous
	}

	async fn acquire(&self, want: Want, queued: Option<u64>) -> Result<AccessToken> {
		let key = want.flight_key();
		let redirect_uri = match &want {
			Want::Code(_, redirect) =>
				Some(UrlBuilder::new(&self.config).redirect_uri(*redirect)?),
			_ => None,
		};
		let seen = match queued {
			Some(seen) => seen,
			None => self.state.lock().settled_seq,
		};
		let _flight = self.flight.lock().await;
		let (request, episode, generation, prior_kind) = {
			let mut state = self.state.lock();

			if let Some(outcome) = state.adoptable(seen, &key) {
				return outcome;
			}
			if queued.is_some() && state.queue.is_empty() {
				return state.token.clone().ok_or(Error::NotAuthorized);
			}

			let request = match (want, redirect_uri) {
				(Want::Code(code, _), Some(redirect_uri)) =>
					ExchangeRequest::AuthorizationCode { code, redirect_uri },
				(Want::ClientCredentials, _) => ExchangeRequest::ClientCredentials,
				_ => match state.silent_grant(self.config.client_credentials_fallback) {
					Some(request) => request,
					None => {
						let drained = state.queue.take();

						drop(state);
						drained.resolve_all(&Err(Error::NotAuthorized));

						return Err(Error::NotAuthorized);
					},
				},
			};
			let episode = state.begin_episode();

			(request, episode, state.generation, state.prior_kind())
		};
		let _episode = EpisodeGuard { state: &self.state, episode };
		let flow = request.flow_kind();
		let span = FlowSpan::new(flow, "session.exchange");

		obs::record_flow_outcome(flow, FlowOutcome::Attempt);
		self.metrics.record_exchange();

		let exchanged = span
			.instrument(transport::bounded(
				self.config.exchange_timeout,
				self.transport.exchange(request.clone()),
			))
			.await;
		let settle = Settle { key, episode, generation, flow };

		match exchanged.and_then(|grant| mint_token(&request, grant, prior_kind)) {
			Ok(token) => self.settle_success(settle, token).await,
			Err(failure) => self.settle_failure(settle, failure).await,
		}
	}

	async fn settle_success(&self, settle: Settle, token: AccessToken) -> Result<AccessToken> {
		let _persist = self.persist.lock().await;

		{
			let _dispatch = self.dispatch.lock();
			let drained = {
				let mut state = self.state.lock();

				if state.generation != settle.generation {
					drop(state);

					return Err(self.discard(settle.flow));
				}

				state.token = Some(token.clone());
				state.retry = None;
				state.end_episode(settle.episode);
				state.settle(settle.key, Ok(token.clone()));
				state.queue.take()
			};
			let delivered = drained.resolve_all(&Ok(token.clone()));

			self.metrics.record_replayed(delivered);
		}

		self.metrics.record_success();
		obs::record_flow_outcome(settle.flow, FlowOutcome::Success);
		obs::debug_transition("install", &LifecycleState::Authorized);

		if self.config.save_to_store
			&& let Err(e) = self.store.save(&self.config.store_key, token.clone()).await
		{
			obs::warn_ignored("store.save", &e);
		}

		self.schedule_refresh(&token, settle.generation);

		Ok(token)
	}

	async fn settle_failure(
		&self,
		settle: Settle,
		failure: TransportFailure,
	) -> Result<AccessToken> {
		let rejected = !failure.is_transient();
		let error = Error::RefreshFailed(failure);
		let _persist = self.persist.lock().await;
		let drained = {
			let mut state = self.state.lock();

			if state.generation != settle.generation {
				drop(state);

				return Err(self.discard(settle.flow));
			}

			state.retry = if rejected { None } else { state.retry_credential() };
			state.token = None;
			state.end_episode(settle.episode);
			state.settle(settle.key, Err(error.clone()));
			state.queue.take()
		};

		drained.resolve_all(&Err(error.clone()));
		self.metrics.record_failure();
		obs::record_flow_outcome(settle.flow, FlowOutcome::Failure);
		obs::debug_transition("failure", &error);

		if rejected && let Err(e) = self.store.remove(&self.config.store_key).await {
			obs::warn_ignored("store.remove", &e);
		}

		Err(error)
	}

	fn discard(&self, flow: FlowKind) -> Error {
		self.metrics.record_discarded();
		obs::record_flow_outcome(flow, FlowOutcome::Discarded);
		obs::debug_transition("discard", &flow);

		Error::LoggedOut
	}

	fn schedule_refresh(&self, token: &AccessToken, generation: u64) {
		if self.config.refresh_policy != RefreshPolicy::Eager
			|| !(token.can_refresh() || self.config.client_credentials_fallback)
		{
			return;
		}

		let Some(due) = token
			.expires_at
			.checked_sub(self.config.expiry_margin)
			.map(|at| at - OffsetDateTime::now_utc())
			.filter(|due| due.is_positive())
		else {
			return;
		};

		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			return;
		};
		let this = self.this.clone();
		let expected = token.access_token.clone();

		runtime.spawn(async move {
			tokio::time::sleep(due.unsigned_abs()).await;

			let Some(session) = this.upgrade() else {
				return;
			};
			let current = {
				let state = session.state.lock();

				state.generation == generation
					&& state.token.as_ref().is_some_and(|token| token.access_token == expected)
			};

			if current && let Err(e) = session.refresh().await {
				obs::warn_ignored("refresh.eager", &e);
			}
		});
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("Session")
			.field("state", &state.lifecycle(OffsetDateTime::now_utc(), self.config.expiry_margin))
			.field("generation", &state.generation)
			.field("pending", &state.queue.len())
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}

enum Want {
	Silent,
	ClientCredentials,
	Code(TokenSecret, RedirectPath),
}
impl Want {
	fn flight_key(&self) -> FlightKey {
		match self {
			Self::Code(code, _) => FlightKey::Code(code.clone()),
			Self::Silent | Self::ClientCredentials => FlightKey::Acquire,
		}
	}
}

struct Settle {
	key: FlightKey,
	episode: u64,
	generation: u64,
	flow: FlowKind,
}

/// Returns the session to idle if the flight is dropped before it settles.
struct EpisodeGuard<'a> {
	state: &'a Mutex<SessionState>,
	episode: u64,
}
impl Drop for EpisodeGuard<'_> {
	fn drop(&mut self) {
		self.state.lock().end_episode(self.episode);
	}
}

fn mint_token(
	request: &ExchangeRequest,
	grant: TokenGrant,
	prior_kind: Option<TokenKind>,
) -> Result<AccessToken, TransportFailure> {
	let TokenGrant { access_token, refresh_token, expires_in, user_id } = grant;
	let kind = match (request, user_id) {
		(ExchangeRequest::ClientCredentials, _) => TokenKind::Client,
		(_, Some(id)) => TokenKind::User { id },
		(ExchangeRequest::Refresh { .. }, None) => prior_kind.ok_or_else(|| {
			TransportFailure::new(FailureKind::Rejected, "refreshed token has no owner")
		})?,
		(ExchangeRequest::AuthorizationCode { .. }, None) =>
			return Err(TransportFailure::new(
				FailureKind::Rejected,
				"token response does not identify the user",
			)),
	};
	let refresh_token = refresh_token.or_else(|| match request {
		ExchangeRequest::Refresh { refresh_token } => Some(refresh_token.clone()),
		_ => None,
	});

	AccessToken::builder(kind)
		.access_token(access_token.expose())
		.refresh_secret(refresh_token)
		.expires_in(expires_in)
		.build()
		.map_err(|e| TransportFailure::new(FailureKind::Rejected, e.to_string()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn user(id: &str) -> UserId {
		UserId::new(id).expect("User fixture should be valid.")
	}

	#[test]
	fn code_grants_need_a_user() {
		let request = ExchangeRequest::AuthorizationCode {
			code: TokenSecret::new("authcode123"),
			redirect_uri: Url::parse("myapp://spid/login").expect("Redirect should parse."),
		};
		let token = mint_token(
			&request,
			TokenGrant::new("tok1", Duration::hours(1)).with_user_id(user("u42")),
			None,
		)
		.expect("User grant should mint.");

		assert_eq!(token.user_id(), Some(&user("u42")));
		assert_eq!(
			mint_token(&request, TokenGrant::new("tok1", Duration::hours(1)), None)
				.map_err(|e| e.kind),
			Err(FailureKind::Rejected),
		);
	}

	#[test]
	fn refresh_keeps_owner_and_refresh_value() {
		let request = ExchangeRequest::Refresh { refresh_token: TokenSecret::new("ref1") };
		let token = mint_token(
			&request,
			TokenGrant::new("tok2", Duration::hours(1)),
			Some(TokenKind::User { id: user("u42") }),
		)
		.expect("Refresh grant should mint.");

		assert_eq!(token.access_token.expose(), "tok2");
		assert_eq!(token.refresh_token, Some(TokenSecret::new("ref1")));
		assert_eq!(token.user_id(), Some(&user("u42")));

		let rotated = mint_token(
			&request,
			TokenGrant::new("tok3", Duration::hours(1)).with_refresh_token("ref2"),
			Some(TokenKind::Client),
		)
		.expect("Rotated grant should mint.");

		assert_eq!(rotated.refresh_token, Some(TokenSecret::new("ref2")));
		assert!(rotated.is_client_token());
	}

	#[test]
	fn unrepresentable_lifetimes_are_rejected() {
		let failure = mint_token(
			&ExchangeRequest::ClientCredentials,
			TokenGrant::new("app", Duration::seconds(1_000_000_000_000)),
			None,
		)
		.expect_err("Lifetime past the calendar should not mint.");

		assert_eq!(failure.kind, FailureKind::Rejected);
		assert!(!failure.is_transient());
	}

	#[test]
	fn client_credentials_ignore_user_ids() {
		let token = mint_token(
			&ExchangeRequest::ClientCredentials,
			TokenGrant::new("app", Duration::minutes(5)).with_user_id(user("0")),
			None,
		)
		.expect("Client grant should mint.");

		assert!(token.is_client_token());
	}
}
