//! Application-facing facade over a shared [`Session`].

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, UserId},
	config::ClientConfig,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	redirect::{self, RedirectEvent, RedirectOutcome},
	session::{LifecycleState, Session, SessionMetrics},
	store::SecureStore,
	transport::{self, AuthorizationTransport},
	urls::{Audience, RedirectPath, UrlBuilder},
};
#[cfg(feature = "reqwest")] use crate::transport::OAuthTransport;

/// Cloneable handle to one signed-in identity.
///
/// Every clone shares the same [`Session`], so token state, the pending queue, and the
/// single-flight guard are common to all of them.
#[derive(Clone, Debug)]
pub struct Client {
	session: Arc<Session>,
}
impl Client {
	/// Creates a client without touching the store.
	pub fn new(
		config: ClientConfig,
		transport: Arc<dyn AuthorizationTransport>,
		store: Arc<dyn SecureStore>,
	) -> Self {
		Self { session: Session::new(config, transport, store) }
	}

	/// Creates a client and restores the persisted token, if any.
	pub async fn open(
		config: ClientConfig,
		transport: Arc<dyn AuthorizationTransport>,
		store: Arc<dyn SecureStore>,
	) -> Self {
		let client = Self::new(config, transport, store);

		client.session.restore().await;

		client
	}

	/// Creates a client over the bundled reqwest transport and restores the persisted token.
	#[cfg(feature = "reqwest")]
	pub async fn with_reqwest(config: ClientConfig, store: Arc<dyn SecureStore>) -> Result<Self> {
		let transport = Arc::new(OAuthTransport::from_config(&config)?);

		Ok(Self::open(config, transport, store).await)
	}

	/// Underlying session.
	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	/// Configuration the client was built with.
	pub fn config(&self) -> &ClientConfig {
		self.session.config()
	}

	/// Activity counters.
	pub fn metrics(&self) -> &SessionMetrics {
		self.session.metrics()
	}

	/// Runs `op` with a valid token; see [`Session::run_authorized`].
	pub async fn run_authorized<F, Fut, T>(&self, op: F) -> Result<T>
	where
		F: 'static + Send + FnOnce(AccessToken) -> Fut,
		Fut: 'static + Send + Future<Output = T>,
		T: 'static + Send,
	{
		self.session.run_authorized(op).await
	}

	/// Held token, whether or not it is expired.
	pub fn current_token(&self) -> Result<AccessToken> {
		self.session.current_token()
	}

	/// Returns `true` when the held token is usable or silently renewable.
	pub fn is_authorized(&self) -> bool {
		self.session.is_authorized()
	}

	/// Returns `true` when no token is held or it is within the expiry margin.
	pub fn has_expired(&self) -> bool {
		self.session.has_expired()
	}

	/// Absolute expiry of the held token.
	pub fn token_expires_at(&self) -> Option<OffsetDateTime> {
		self.session.current_token().ok().map(|token| token.expires_at)
	}

	/// User the held token belongs to.
	pub fn current_user_id(&self) -> Option<UserId> {
		self.session.current_user_id()
	}

	/// Returns `true` when the held token is an application-level token.
	pub fn is_client_token(&self) -> bool {
		self.session.current_token().is_ok_and(|token| token.is_client_token())
	}

	/// Current lifecycle state.
	pub fn state(&self) -> LifecycleState {
		self.session.lifecycle()
	}

	/// Exchanges the authorization code delivered to the login redirect.
	///
	/// See [`Session::exchange_authorization_code`] for how this joins a running exchange.
	pub async fn login(&self, code: impl Into<String>) -> Result<AccessToken> {
		self.session.exchange_authorization_code(code).await
	}

	/// Renews the held token.
	pub async fn refresh(&self) -> Result<AccessToken> {
		self.session.refresh().await
	}

	/// Obtains an application-level token through the client credentials grant.
	pub async fn client_credentials(&self) -> Result<AccessToken> {
		self.session.exchange_client_credentials().await
	}

	/// Clears the session and, when configured, revokes the dropped token server-side.
	///
	/// Revocation is best effort: its failure is logged and the local logout stands. Returns
	/// the token that was held.
	pub async fn logout(&self) -> Option<AccessToken> {
		let previous = self.session.invalidate().await?;

		if self.config().revoke_on_logout {
			self.revoke(&previous).await;
		}

		Some(previous)
	}

	/// Requests a one-time code the application server can exchange for its own user token.
	///
	/// Runs through [`Client::run_authorized`], so it waits for a pending refresh like any other
	/// authorized call. Fails with [`Error::UserTokenRequired`] while a client token is held.
	pub async fn one_time_code(&self) -> Result<String> {
		if self.is_client_token() {
			return Err(Error::UserTokenRequired);
		}

		let session = self.session.clone();

		self.session
			.run_authorized(move |token: AccessToken| async move {
				if token.is_client_token() {
					return Err(Error::UserTokenRequired);
				}

				let flow = FlowKind::OneTimeCode;
				let span = FlowSpan::new(flow, "client.one_time_code");

				obs::record_flow_outcome(flow, FlowOutcome::Attempt);

				let issued = span
					.instrument(transport::bounded(
						session.config().exchange_timeout,
						session.transport().one_time_code(&token.access_token),
					))
					.await;

				match issued {
					Ok(code) => {
						obs::record_flow_outcome(flow, FlowOutcome::Success);

						Ok(code)
					},
					Err(failure) => {
						obs::record_flow_outcome(flow, FlowOutcome::Failure);

						Err(Error::OneTimeCode(failure))
					},
				}
			})
			.await?
	}

	/// Acts on a redirect captured by the application's URL scheme handler.
	///
	/// Login and signup codes are exchanged; a logout redirect clears the session without a
	/// second revocation, since the server already ended it.
	pub async fn handle_redirect(&self, url: &Url) -> RedirectOutcome {
		let base = match self.config().redirect_base() {
			Ok(base) => base,
			Err(e) => return RedirectOutcome::Failed(e.into()),
		};
		let Some(event) = redirect::parse_redirect(url, &base) else {
			return RedirectOutcome::Unhandled;
		};

		match event {
			RedirectEvent::Login { code } => match self.login(code).await {
				Ok(token) => RedirectOutcome::Authorized(token),
				Err(e) => RedirectOutcome::Failed(e),
			},
			RedirectEvent::Signup { code: Some(code) } => {
				match self.session.exchange_authorization_code_at(code, RedirectPath::Signup).await {
					Ok(token) => RedirectOutcome::SignedUp(Some(token)),
					Err(e) => RedirectOutcome::Failed(e),
				}
			},
			RedirectEvent::Signup { code: None } => RedirectOutcome::SignedUp(None),
			RedirectEvent::Logout => {
				self.session.invalidate().await;

				RedirectOutcome::LoggedOut
			},
			RedirectEvent::LoginFailed { error } =>
				RedirectOutcome::Failed(Error::LoginFailed { error }),
			RedirectEvent::LogoutFailed { error } =>
				RedirectOutcome::Failed(Error::LogoutFailed { error }),
		}
	}

	/// Web login page URL.
	pub fn authorization_url(&self) -> Result<Url> {
		Ok(self.urls().authorization_url()?)
	}

	/// Web login page URL issued for the server client identifier.
	pub fn server_authorization_url(&self) -> Result<Url> {
		Ok(self.urls().authorization_url_for(Audience::Server)?)
	}

	/// Web signup page URL.
	pub fn signup_url(&self) -> Result<Url> {
		Ok(self.urls().signup_url()?)
	}

	/// Web forgot password page URL.
	pub fn forgot_password_url(&self) -> Result<Url> {
		Ok(self.urls().forgot_password_url()?)
	}

	/// Web logout page URL for the held token; open it before calling [`Client::logout`].
	pub fn logout_url(&self) -> Result<Url> {
		let token = self.current_token()?;

		Ok(self.urls().logout_url(&token)?)
	}

	/// OAuth token endpoint.
	pub fn token_url(&self) -> Result<Url> {
		Ok(self.urls().token_url()?)
	}

	fn urls(&self) -> UrlBuilder<'_> {
		UrlBuilder::new(self.config())
	}

	async fn revoke(&self, token: &AccessToken) {
		let flow = FlowKind::Revoke;
		let span = FlowSpan::new(flow, "client.logout");

		obs::record_flow_outcome(flow, FlowOutcome::Attempt);

		let revoked = span
			.instrument(transport::bounded(
				self.config().exchange_timeout,
				self.session.transport().revoke(&token.access_token),
			))
			.await;

		match revoked {
			Ok(()) => obs::record_flow_outcome(flow, FlowOutcome::Success),
			Err(e) => {
				obs::record_flow_outcome(flow, FlowOutcome::Failure);
				obs::warn_ignored("logout.revoke", &e);
			},
		}
	}
}
