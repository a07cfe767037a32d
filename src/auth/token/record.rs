//! Immutable access token record, expiry helpers, and builder.

// self
use crate::{
	_prelude::*,
	auth::{
		UserId,
		token::{kind::TokenKind, secret::TokenSecret},
	},
};

/// Validity of a token relative to an instant and a clock-skew margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token can be attached to requests.
	Active,
	/// Token reached `expires_at - margin` and must be refreshed before use.
	Expired,
}

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AccessTokenBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when `issued_at + expires_in` leaves the representable date range.
	#[error("Expiry is out of range.")]
	ExpiryOutOfRange,
}

/// Access token held by the session.
///
/// Tokens are never edited in place: a refresh produces a new value that replaces the old one
/// wholesale.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the server issued one.
	pub refresh_token: Option<TokenSecret>,
	/// User or client flavor of the token.
	pub kind: TokenKind,
	/// Instant the token was installed.
	pub issued_at: OffsetDateTime,
	/// Absolute expiry declared by the server.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Returns a builder for a token of the given flavor.
	pub fn builder(kind: TokenKind) -> AccessTokenBuilder {
		AccessTokenBuilder::new(kind)
	}

	/// Computes the status at `instant`, treating the token as expired `margin` early.
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> TokenStatus {
		let expired = match self.expires_at.checked_sub(margin) {
			Some(threshold) => instant >= threshold,
			None => margin.is_positive(),
		};

		if expired { TokenStatus::Expired } else { TokenStatus::Active }
	}

	/// Returns `true` if the token is expired at `instant` given `margin`.
	pub fn is_expired_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		matches!(self.status_at(instant, margin), TokenStatus::Expired)
	}

	/// Returns `true` if the token is expired relative to the current clock.
	pub fn is_expired(&self, margin: Duration) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc(), margin)
	}

	/// User the token was issued for, if it is user-scoped.
	pub fn user_id(&self) -> Option<&UserId> {
		self.kind.user_id()
	}

	/// Returns `true` for application-level tokens.
	pub fn is_client_token(&self) -> bool {
		self.kind.is_client()
	}

	/// Returns `true` if a refresh secret is available.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.is_some()
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("kind", &self.kind)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug)]
pub struct AccessTokenBuilder {
	kind: TokenKind,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl AccessTokenBuilder {
	fn new(kind: TokenKind) -> Self {
		Self {
			kind,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an already wrapped refresh secret, if any.
	pub fn refresh_secret(mut self, secret: Option<TokenSecret>) -> Self {
		self.refresh_token = secret;

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let access_token = self.access_token.ok_or(AccessTokenBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(AccessTokenBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};

		Ok(AccessToken {
			access_token,
			refresh_token: self.refresh_token,
			kind: self.kind,
			issued_at,
			expires_at,
		})
	}
}
