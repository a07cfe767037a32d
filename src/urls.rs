//! Browser and token endpoint URL construction.
//!
//! Everything here is a pure function of [`ClientConfig`] plus call inputs: no network access
//! and no session state. When a signing secret is configured, browser URLs carry a `sig`
//! parameter the server recomputes, so parameter values and ordering are deterministic.

mod signature;

pub use signature::*;

// self
use crate::{_prelude::*, auth::AccessToken, config::ClientConfig, error::ConfigError};

/// Redirect targets appended to the redirect base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RedirectPath {
	/// Successful (or failed) login carrying `code` or `error`.
	Login,
	/// Cancelled or failed login.
	Failure,
	/// Completed (or failed) logout.
	Logout,
	/// Completed signup, optionally carrying `code`.
	Signup,
}
impl RedirectPath {
	/// Path suffix under the redirect base.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Login => "login",
			Self::Failure => "failure",
			Self::Logout => "logout",
			Self::Signup => "signup",
		}
	}

	/// Parses a path suffix.
	pub fn from_suffix(suffix: &str) -> Option<Self> {
		match suffix {
			"login" => Some(Self::Login),
			"failure" => Some(Self::Failure),
			"logout" => Some(Self::Logout),
			"signup" => Some(Self::Signup),
			_ => None,
		}
	}
}
impl Display for RedirectPath {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Which client identifier a browser flow is issued for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Audience {
	/// The application's own client identifier.
	#[default]
	App,
	/// The server client identifier used for one-time codes.
	Server,
}

/// Builds the URLs a browser-redirect layer opens.
#[derive(Clone, Copy, Debug)]
pub struct UrlBuilder<'a> {
	config: &'a ClientConfig,
}
impl<'a> UrlBuilder<'a> {
	/// Wraps a configuration.
	pub fn new(config: &'a ClientConfig) -> Self {
		Self { config }
	}

	/// Redirect URI for a target, e.g. `myapp://spid/login`.
	pub fn redirect_uri(&self, path: RedirectPath) -> Result<Url, ConfigError> {
		self.config
			.redirect_base()?
			.join(path.as_str())
			.map_err(ConfigError::invalid_url("redirect_uri"))
	}

	/// Web login page for the app's client identifier.
	pub fn authorization_url(&self) -> Result<Url, ConfigError> {
		self.authorization_url_for(Audience::App)
	}

	/// Web login page issued for the given audience.
	pub fn authorization_url_for(&self, audience: Audience) -> Result<Url, ConfigError> {
		let endpoint = self.config.endpoints()?.authorization;

		self.browser_url(endpoint, audience, RedirectPath::Login)
	}

	/// Web signup page.
	pub fn signup_url(&self) -> Result<Url, ConfigError> {
		let endpoint = self.config.endpoints()?.signup;

		self.browser_url(endpoint, Audience::App, RedirectPath::Signup)
	}

	/// Web forgot password page; completing it lands on the login redirect.
	pub fn forgot_password_url(&self) -> Result<Url, ConfigError> {
		let endpoint = self.config.endpoints()?.forgot_password;

		self.browser_url(endpoint, Audience::App, RedirectPath::Login)
	}

	/// Web logout page for the given token.
	pub fn logout_url(&self, token: &AccessToken) -> Result<Url, ConfigError> {
		let endpoint = self.config.endpoints()?.logout;
		let mut params = BTreeMap::new();

		params.insert("client_id", self.client_id(Audience::App)?);
		params.insert("redirect_uri", self.redirect_uri(RedirectPath::Logout)?.to_string());
		params.insert("oauth_token", token.access_token.expose().to_owned());

		self.finish(endpoint, params)
	}

	/// OAuth token endpoint.
	pub fn token_url(&self) -> Result<Url, ConfigError> {
		Ok(self.config.endpoints()?.token)
	}

	fn browser_url(
		&self,
		endpoint: Url,
		audience: Audience,
		redirect: RedirectPath,
	) -> Result<Url, ConfigError> {
		let mut params = BTreeMap::new();

		params.insert("client_id", self.client_id(audience)?);
		params.insert("redirect_uri", self.redirect_uri(redirect)?.to_string());
		params.insert("response_type", "code".to_owned());

		if self.config.use_mobile_web {
			params.insert("platform", "mobile".to_owned());
		}

		self.finish(endpoint, params)
	}

	fn client_id(&self, audience: Audience) -> Result<String, ConfigError> {
		let id = match audience {
			Audience::App => self.config.require_client_id()?,
			Audience::Server => self.config.require_server_client_id()?,
		};

		Ok(id.into())
	}

	fn finish(
		&self,
		mut endpoint: Url,
		params: BTreeMap<&'static str, String>,
	) -> Result<Url, ConfigError> {
		let sig = match self.config.sign_secret.as_deref() {
			Some(secret) => Some(sign_params(&params, secret)?),
			None => None,
		};
		let mut pairs = endpoint.query_pairs_mut();

		for (key, value) in &params {
			pairs.append_pair(key, value);
		}
		if let Some(sig) = &sig {
			pairs.append_pair(SIGNATURE_PARAM, sig);
		}

		drop(pairs);

		Ok(endpoint)
	}
}
