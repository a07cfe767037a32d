//! Client configuration: identifiers, server endpoints, redirect scheme, and session policy.
//!
//! [`ClientConfig`] is a plain data struct that can be deserialized from JSON (every field
//! has a default) or assembled with the `with_*` setters. Nothing is validated up front;
//! required values are checked by [`ClientConfig::endpoints`] and friends at the point of first
//! use, which surfaces [`ConfigError`] through the operation that needed them.

// self
use crate::{_prelude::*, auth::ClientId, error::ConfigError};

/// Default store identifier for the persisted token record.
pub const DEFAULT_STORE_KEY: &str = "AccessToken";
/// Default API version used by the one-time code and revoke endpoints.
pub const DEFAULT_API_VERSION: &str = "2";
/// Host used when deriving the redirect URI from the app URL scheme.
pub const REDIRECT_HOST: &str = "spid";

/// How an expired token is renewed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
	/// Refresh when the next authorized operation finds the token expired.
	#[default]
	OnDemand,
	/// Schedule a refresh at `expires_at - expiry_margin` after every install.
	Eager,
}

/// Where client credentials travel on token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// Form body parameters for `client_id`/`client_secret`.
	#[default]
	RequestBody,
	/// HTTP Basic with `client_id`/`client_secret`.
	BasicAuth,
}

/// Session configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Client identifier issued by the authorization server.
	pub client_id: Option<String>,
	/// Client identifier used for server-side one-time codes. Defaults to `client_id`.
	pub server_client_id: Option<String>,
	/// Client secret for token endpoint calls.
	pub client_secret: Option<String>,
	/// Secret used to sign browser URLs.
	pub sign_secret: Option<String>,
	/// Application URL scheme used to derive the redirect URI (e.g. `myapp` or `myapp://`).
	pub app_url_scheme: Option<String>,
	/// Explicit redirect base. Defaults to `<app_url_scheme>://spid/`.
	pub redirect_uri: Option<Url>,
	/// Authorization server base URL.
	pub server_url: Option<Url>,
	/// Override for the web login URL (`<server>/auth/login`).
	pub authorization_url: Option<Url>,
	/// Override for the web signup URL (`<server>/auth/signup`).
	pub signup_url: Option<Url>,
	/// Override for the forgot password URL (`<server>/auth/forgotpassword`).
	pub forgot_password_url: Option<Url>,
	/// Override for the web logout URL (`<server>/logout`).
	pub logout_url: Option<Url>,
	/// Override for the token endpoint (`<server>/oauth/token`).
	pub token_url: Option<Url>,
	/// Override for the token revocation endpoint (`<server>/api/<v>/logout`).
	pub revoke_url: Option<Url>,
	/// Override for the one-time code endpoint (`<server>/api/<v>/oauth/exchange`).
	pub one_time_code_url: Option<Url>,
	/// API version segment for API endpoints.
	pub api_version: String,
	/// Adds `platform=mobile` to browser URLs.
	pub use_mobile_web: bool,
	/// Persists tokens through the secure store.
	pub save_to_store: bool,
	/// Identifier of the persisted token record.
	pub store_key: String,
	/// Tokens count as expired this long before their declared expiry.
	#[serde(with = "seconds")]
	pub expiry_margin: Duration,
	/// Upper bound on a single token exchange.
	#[serde(with = "seconds")]
	pub exchange_timeout: Duration,
	/// Refresh trigger policy.
	pub refresh_policy: RefreshPolicy,
	/// Falls back to the client credentials grant when no user token can be refreshed.
	pub client_credentials_fallback: bool,
	/// Revokes the token server-side on logout (best effort).
	pub revoke_on_logout: bool,
	/// Client authentication method for token endpoint calls.
	pub client_auth: ClientAuthMethod,
}
impl ClientConfig {
	const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::seconds(30);
	const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(60);

	/// Creates a configuration with the four values every client needs.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		app_url_scheme: impl Into<String>,
		server_url: Url,
	) -> Self {
		Self::default()
			.with_client_id(client_id)
			.with_client_secret(client_secret)
			.with_app_url_scheme(app_url_scheme)
			.with_server_url(server_url)
	}

	/// Sets the client identifier.
	pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the client identifier used for one-time codes.
	pub fn with_server_client_id(mut self, client_id: impl Into<String>) -> Self {
		self.server_client_id = Some(client_id.into());

		self
	}

	/// Sets the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Sets the URL signing secret.
	pub fn with_sign_secret(mut self, secret: impl Into<String>) -> Self {
		self.sign_secret = Some(secret.into());

		self
	}

	/// Sets the app URL scheme.
	pub fn with_app_url_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.app_url_scheme = Some(scheme.into());

		self
	}

	/// Overrides the derived redirect base.
	pub fn with_redirect_uri(mut self, uri: Url) -> Self {
		self.redirect_uri = Some(uri);

		self
	}

	/// Sets the authorization server URL.
	pub fn with_server_url(mut self, url: Url) -> Self {
		self.server_url = Some(url);

		self
	}

	/// Overrides the token endpoint.
	pub fn with_token_url(mut self, url: Url) -> Self {
		self.token_url = Some(url);

		self
	}

	/// Sets the clock-skew margin (negative values clamp to zero).
	pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
		self.expiry_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Sets the exchange timeout.
	pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
		self.exchange_timeout = timeout;

		self
	}

	/// Sets the refresh policy.
	pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
		self.refresh_policy = policy;

		self
	}

	/// Enables or disables the client credentials fallback.
	pub fn with_client_credentials_fallback(mut self, enabled: bool) -> Self {
		self.client_credentials_fallback = enabled;

		self
	}

	/// Enables or disables token persistence.
	pub fn with_save_to_store(mut self, enabled: bool) -> Self {
		self.save_to_store = enabled;

		self
	}

	/// Enables or disables server-side revocation on logout.
	pub fn with_revoke_on_logout(mut self, enabled: bool) -> Self {
		self.revoke_on_logout = enabled;

		self
	}

	/// Toggles the mobile web flavor of browser pages.
	pub fn with_mobile_web(mut self, enabled: bool) -> Self {
		self.use_mobile_web = enabled;

		self
	}

	/// Returns the validated client identifier.
	pub fn require_client_id(&self) -> Result<ClientId, ConfigError> {
		let raw = self.client_id.as_deref().ok_or(ConfigError::MissingField { field: "client_id" })?;

		Ok(ClientId::new(raw)?)
	}

	/// Returns the client identifier for one-time codes, falling back to `client_id`.
	pub fn require_server_client_id(&self) -> Result<ClientId, ConfigError> {
		match self.server_client_id.as_deref() {
			Some(raw) => Ok(ClientId::new(raw)?),
			None => self.require_client_id(),
		}
	}

	/// Returns the server base URL.
	pub fn require_server_url(&self) -> Result<&Url, ConfigError> {
		self.server_url.as_ref().ok_or(ConfigError::MissingField { field: "server_url" })
	}

	/// Resolves the redirect base, deriving it from the app URL scheme when not set.
	pub fn redirect_base(&self) -> Result<Url, ConfigError> {
		if let Some(uri) = &self.redirect_uri {
			return Ok(with_trailing_slash(uri.clone()));
		}

		let raw = self
			.app_url_scheme
			.as_deref()
			.ok_or(ConfigError::MissingField { field: "app_url_scheme" })?;
		let scheme = normalize_scheme(raw)?;

		Url::parse(&format!("{scheme}://{REDIRECT_HOST}/"))
			.map_err(ConfigError::invalid_url("redirect_uri"))
	}

	/// Resolves every endpoint, applying overrides over the server URL defaults.
	pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
		let resolve = |over: &Option<Url>, field: &'static str, path: &str| match over {
			Some(url) => Ok(url.clone()),
			None => with_trailing_slash(self.require_server_url()?.clone())
				.join(path)
				.map_err(ConfigError::invalid_url(field)),
		};
		let version = self.api_version.trim_matches('/');

		Ok(Endpoints {
			authorization: resolve(&self.authorization_url, "authorization_url", "auth/login")?,
			signup: resolve(&self.signup_url, "signup_url", "auth/signup")?,
			forgot_password: resolve(
				&self.forgot_password_url,
				"forgot_password_url",
				"auth/forgotpassword",
			)?,
			logout: resolve(&self.logout_url, "logout_url", "logout")?,
			token: resolve(&self.token_url, "token_url", "oauth/token")?,
			revoke: resolve(&self.revoke_url, "revoke_url", &format!("api/{version}/logout"))?,
			one_time_code: resolve(
				&self.one_time_code_url,
				"one_time_code_url",
				&format!("api/{version}/oauth/exchange"),
			)?,
		})
	}
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			client_id: None,
			server_client_id: None,
			client_secret: None,
			sign_secret: None,
			app_url_scheme: None,
			redirect_uri: None,
			server_url: None,
			authorization_url: None,
			signup_url: None,
			forgot_password_url: None,
			logout_url: None,
			token_url: None,
			revoke_url: None,
			one_time_code_url: None,
			api_version: DEFAULT_API_VERSION.into(),
			use_mobile_web: true,
			save_to_store: true,
			store_key: DEFAULT_STORE_KEY.into(),
			expiry_margin: Self::DEFAULT_EXPIRY_MARGIN,
			exchange_timeout: Self::DEFAULT_EXCHANGE_TIMEOUT,
			refresh_policy: RefreshPolicy::default(),
			client_credentials_fallback: false,
			revoke_on_logout: true,
			client_auth: ClientAuthMethod::default(),
		}
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("client_id", &self.client_id)
			.field("server_client_id", &self.server_client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("sign_secret_set", &self.sign_secret.is_some())
			.field("app_url_scheme", &self.app_url_scheme)
			.field("server_url", &self.server_url.as_ref().map(Url::as_str))
			.field("api_version", &self.api_version)
			.field("save_to_store", &self.save_to_store)
			.field("expiry_margin", &self.expiry_margin)
			.field("exchange_timeout", &self.exchange_timeout)
			.field("refresh_policy", &self.refresh_policy)
			.finish_non_exhaustive()
	}
}

/// Fully resolved endpoint set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
	/// Web login page.
	pub authorization: Url,
	/// Web signup page.
	pub signup: Url,
	/// Web forgot password page.
	pub forgot_password: Url,
	/// Web logout page.
	pub logout: Url,
	/// OAuth token endpoint.
	pub token: Url,
	/// Token revocation endpoint.
	pub revoke: Url,
	/// One-time code endpoint.
	pub one_time_code: Url,
}

fn normalize_scheme(raw: &str) -> Result<String, ConfigError> {
	let scheme = raw.trim().trim_end_matches('/').trim_end_matches(':').to_ascii_lowercase();
	let mut chars = scheme.chars();
	let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
		&& chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

	if valid { Ok(scheme) } else { Err(ConfigError::InvalidScheme { scheme: raw.to_owned() }) }
}

fn with_trailing_slash(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url
}

mod seconds {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = i64::deserialize(deserializer)?;

		Ok(Duration::seconds(secs.max(0)))
	}
}
