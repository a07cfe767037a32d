//! Authorization transport boundary.
//!
//! The session never speaks HTTP. It hands an [`ExchangeRequest`] to an
//! [`AuthorizationTransport`] and receives either a [`TokenGrant`] or a [`TransportFailure`]
//! whose [`FailureKind`] drives the lifecycle decision (keep the refresh value for a later
//! retry, or discard it and require a new login). The `reqwest` feature ships
//! [`OAuthTransport`], an `oauth2`-crate backed implementation.

pub mod classify;
#[cfg(feature = "reqwest")] pub mod oauth;

pub use classify::*;
#[cfg(feature = "reqwest")] pub use oauth::*;

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserId},
	obs::FlowKind,
};

/// Boxed future returned by [`AuthorizationTransport`] methods.
pub type TransportFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TransportFailure>> + 'a + Send>>;

/// Executes token exchanges, revocations, and one-time code requests.
///
/// Implementations must be `Send + Sync` because a single transport is shared by every clone of
/// a [`Client`](crate::client::Client). Timeouts are enforced by the session, so transports may
/// simply await their I/O.
pub trait AuthorizationTransport
where
	Self: Send + Sync,
{
	/// Exchanges a grant (authorization code, refresh value, or client credentials) for a token.
	fn exchange(&self, request: ExchangeRequest) -> TransportFuture<'_, TokenGrant>;

	/// Revokes an access token server-side.
	fn revoke<'a>(&'a self, access_token: &'a TokenSecret) -> TransportFuture<'a, ()>;

	/// Requests a one-time code the application server can exchange for its own token.
	fn one_time_code<'a>(&'a self, access_token: &'a TokenSecret) -> TransportFuture<'a, String>;
}

/// Grant submitted to the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeRequest {
	/// Authorization code delivered through the login redirect.
	AuthorizationCode {
		/// Code from the redirect query string.
		code: TokenSecret,
		/// Redirect URI the code was issued for.
		redirect_uri: Url,
	},
	/// Refresh of a previously issued token.
	Refresh {
		/// Refresh value from the current token.
		refresh_token: TokenSecret,
	},
	/// Application-level token via the client credentials grant.
	ClientCredentials,
}
impl ExchangeRequest {
	/// OAuth `grant_type` value for this request.
	pub const fn grant_type(&self) -> &'static str {
		match self {
			Self::AuthorizationCode { .. } => "authorization_code",
			Self::Refresh { .. } => "refresh_token",
			Self::ClientCredentials => "client_credentials",
		}
	}

	/// Observability label for this request.
	pub const fn flow_kind(&self) -> FlowKind {
		match self {
			Self::AuthorizationCode { .. } => FlowKind::AuthorizationCode,
			Self::Refresh { .. } => FlowKind::Refresh,
			Self::ClientCredentials => FlowKind::ClientCredentials,
		}
	}
}

/// Successful token endpoint response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Newly issued access token.
	pub access_token: TokenSecret,
	/// Refresh value, if the server issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime relative to the moment the grant is installed.
	pub expires_in: Duration,
	/// User the token was issued for; absent for client credentials.
	pub user_id: Option<UserId>,
}
impl TokenGrant {
	/// Creates a grant with no refresh value and no user.
	pub fn new(access_token: impl Into<String>, expires_in: Duration) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: None,
			expires_in,
			user_id: None,
		}
	}

	/// Attaches a refresh value.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(refresh_token));

		self
	}

	/// Attaches the user identifier.
	pub fn with_user_id(mut self, user_id: UserId) -> Self {
		self.user_id = Some(user_id);

		self
	}
}

/// Failure category reported by a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
	/// The server could not be reached.
	Network,
	/// The call did not complete in time.
	Timeout,
	/// The server answered but is temporarily unable to serve the request.
	Unavailable,
	/// The grant or client credentials were refused.
	InvalidCredential,
	/// The server rejected the request for any other non-retryable reason.
	Rejected,
}
impl FailureKind {
	/// Returns `true` for kinds where the same request may succeed later.
	pub const fn is_transient(self) -> bool {
		matches!(self, Self::Network | Self::Timeout | Self::Unavailable)
	}

	/// Stable label for logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Network => "network",
			Self::Timeout => "timeout",
			Self::Unavailable => "unavailable",
			Self::InvalidCredential => "invalid_credential",
			Self::Rejected => "rejected",
		}
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Classified transport failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportFailure {
	/// Failure category.
	pub kind: FailureKind,
	/// Human-readable detail; never contains secrets.
	pub detail: String,
	/// HTTP status code, when the server answered.
	pub status: Option<u16>,
	/// Retry-After hint, when the server supplied one.
	pub retry_after: Option<Duration>,
}
impl TransportFailure {
	/// Creates a failure with no HTTP metadata.
	pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
		Self { kind, detail: detail.into(), status: None, retry_after: None }
	}

	/// Failure used when the session's exchange timeout elapses.
	pub fn timeout(limit: Duration) -> Self {
		Self::new(
			FailureKind::Timeout,
			format!("exchange did not complete within {}s", limit.whole_seconds()),
		)
	}

	/// Adds the HTTP status code.
	pub fn with_status(mut self, status: Option<u16>) -> Self {
		self.status = status;

		self
	}

	/// Adds the Retry-After hint.
	pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
		self.retry_after = retry_after;

		self
	}

	/// Returns `true` when the failure is temporary.
	pub fn is_transient(&self) -> bool {
		self.kind.is_transient()
	}
}
impl Display for TransportFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} failure", self.kind)?;

		if let Some(status) = self.status {
			write!(f, " (HTTP {status})")?;
		}

		write!(f, ": {}.", self.detail.trim_end_matches('.'))
	}
}
impl StdError for TransportFailure {}

/// Awaits a transport call, failing with [`FailureKind::Timeout`] once `limit` elapses.
pub(crate) async fn bounded<T>(
	limit: Duration,
	call: TransportFuture<'_, T>,
) -> Result<T, TransportFailure> {
	match tokio::time::timeout(limit.unsigned_abs(), call).await {
		Ok(result) => result,
		Err(_) => Err(TransportFailure::timeout(limit)),
	}
}
