//! Session-level error types shared by the lifecycle manager, queue, transports, and stores.

// self
use crate::{_prelude::*, transport::TransportFailure};

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical session error exposed by public APIs.
///
/// Every variant is cheap to clone so one failure can be fanned out to all operations that
/// were queued behind the same exchange.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
	/// Local configuration problem detected at first use.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// No token is held and there is no way to obtain one without a fresh login.
	#[error("Session is not authorized.")]
	NotAuthorized,
	/// The token exchange (code, refresh, or client credentials) failed.
	#[error("Token exchange failed: {0}")]
	RefreshFailed(TransportFailure),
	/// The session was logged out while the operation was waiting for a token.
	#[error("Session was logged out before the operation could run.")]
	LoggedOut,
	/// The operation requires a user-scoped token but a client token is held.
	#[error("Operation requires a user token.")]
	UserTokenRequired,
	/// The one-time code request failed.
	#[error("One-time code request failed: {0}")]
	OneTimeCode(TransportFailure),
	/// The authorization server redirected back with a login error.
	#[error("Login failed: {}.", error.as_deref().unwrap_or("unknown error"))]
	LoginFailed {
		/// Error code supplied by the redirect, if any.
		error: Option<String>,
	},
	/// The authorization server redirected back with a logout error.
	#[error("Logout failed: {}.", error.as_deref().unwrap_or("unknown error"))]
	LogoutFailed {
		/// Error code supplied by the redirect, if any.
		error: Option<String>,
	},
}
impl Error {
	/// Returns `true` when the failure is temporary and the whole flow may be retried later.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::RefreshFailed(failure) | Self::OneTimeCode(failure) => failure.is_transient(),
			_ => false,
		}
	}

	/// Returns `true` when the server rejected the credential and a fresh login is needed.
	pub fn requires_login(&self) -> bool {
		match self {
			Self::NotAuthorized | Self::LoggedOut => true,
			Self::RefreshFailed(failure) => !failure.is_transient(),
			_ => false,
		}
	}
}

/// Configuration and validation failures raised by the session.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// A required configuration value was not supplied.
	#[error("Configuration is missing `{field}`.")]
	MissingField {
		/// Name of the missing field.
		field: &'static str,
	},
	/// A configured URL could not be parsed or joined.
	#[error("Configuration contains an invalid `{field}` URL.")]
	InvalidUrl {
		/// Name of the offending field.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The application URL scheme is not a valid scheme.
	#[error("App URL scheme `{scheme}` is invalid.")]
	InvalidScheme {
		/// Scheme that failed validation.
		scheme: String,
	},
	/// The client identifier failed validation.
	#[error("Client identifier is invalid.")]
	InvalidClientId(#[from] crate::auth::IdentifierError),
	/// The signing secret could not key the signature.
	#[error("Signing secret is unusable: {reason}.")]
	InvalidSignSecret {
		/// Human-readable reason.
		reason: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed: {reason}.")]
	HttpClientBuild {
		/// Human-readable reason.
		reason: String,
	},
	/// Token builder validation failed.
	#[error("Unable to build access token.")]
	TokenBuild(#[from] crate::auth::AccessTokenBuilderError),
}
impl ConfigError {
	/// Wraps a transport builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl Display) -> Self {
		Self::HttpClientBuild { reason: src.to_string() }
	}

	pub(crate) fn invalid_url(field: &'static str) -> impl FnOnce(url::ParseError) -> Self {
		move |source| Self::InvalidUrl { field, source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::transport::FailureKind;

	#[test]
	fn transient_classification_follows_failure_kind() {
		let timeout = Error::RefreshFailed(TransportFailure::new(FailureKind::Timeout, "slow"));
		let revoked =
			Error::RefreshFailed(TransportFailure::new(FailureKind::InvalidCredential, "revoked"));

		assert!(timeout.is_transient());
		assert!(!timeout.requires_login());
		assert!(!revoked.is_transient());
		assert!(revoked.requires_login());
		assert!(Error::NotAuthorized.requires_login());
	}

	#[test]
	fn login_failure_message_falls_back_when_error_is_missing() {
		let err = Error::LoginFailed { error: None };

		assert_eq!(err.to_string(), "Login failed: unknown error.");

		let err = Error::LogoutFailed { error: Some("access_denied".into()) };

		assert_eq!(err.to_string(), "Logout failed: access_denied.");
	}
}
