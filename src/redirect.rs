//! Recognition of browser redirects captured by the application's URL scheme handler.

// self
use crate::{_prelude::*, auth::AccessToken, urls::RedirectPath};

/// Redirect recognized under the configured redirect base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectEvent {
	/// Login succeeded and delivered an authorization code.
	Login {
		/// Authorization code to exchange.
		code: String,
	},
	/// Login was cancelled or failed.
	LoginFailed {
		/// Error code reported by the server, if any.
		error: Option<String>,
	},
	/// Logout page completed.
	Logout,
	/// Logout page reported an error.
	LogoutFailed {
		/// Error code reported by the server.
		error: Option<String>,
	},
	/// Signup page completed.
	Signup {
		/// Authorization code, when the server signed the new user in directly.
		code: Option<String>,
	},
}

/// What [`Client::handle_redirect`](crate::client::Client::handle_redirect) did with a URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectOutcome {
	/// The URL does not belong to this client.
	Unhandled,
	/// Login completed and a user token is installed.
	Authorized(AccessToken),
	/// Signup completed; carries the token when the redirect also logged the user in.
	SignedUp(Option<AccessToken>),
	/// Logout completed and the session is cleared.
	LoggedOut,
	/// The redirect reported, or led to, a failure.
	Failed(Error),
}
impl RedirectOutcome {
	/// Returns `true` for every outcome except [`RedirectOutcome::Unhandled`].
	pub fn is_handled(&self) -> bool {
		!matches!(self, Self::Unhandled)
	}
}

/// Parses `url` against `base`, returning [`None`] for URLs that are not ours.
pub fn parse_redirect(url: &Url, base: &Url) -> Option<RedirectEvent> {
	if url.scheme() != base.scheme()
		|| url.port_or_known_default() != base.port_or_known_default()
		|| !url.host_str().unwrap_or_default().eq_ignore_ascii_case(base.host_str().unwrap_or_default())
	{
		return None;
	}

	let suffix = url.path().strip_prefix(base.path())?.trim_matches('/');
	let param = |name: &str| {
		url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
	};

	let event = match RedirectPath::from_suffix(suffix)? {
		RedirectPath::Login => match param("code").filter(|code| !code.is_empty()) {
			Some(code) => RedirectEvent::Login { code },
			None => RedirectEvent::LoginFailed { error: param("error") },
		},
		RedirectPath::Failure => RedirectEvent::LoginFailed { error: param("error") },
		RedirectPath::Logout => match param("error") {
			Some(error) => RedirectEvent::LogoutFailed { error: Some(error) },
			None => RedirectEvent::Logout,
		},
		RedirectPath::Signup =>
			RedirectEvent::Signup { code: param("code").filter(|code| !code.is_empty()) },
	};

	Some(event)
}
