//! `oauth2`-crate backed [`AuthorizationTransport`].

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthorizationCode, ClientId as OAuthClientId, ClientSecret,
	EndpointNotSet, EndpointSet, ExtraTokenFields, HttpClientError, HttpResponse, RedirectUrl,
	RefreshToken, RequestTokenError, StandardRevocableToken, StandardTokenResponse,
	TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserId},
	config::{ClientAuthMethod, ClientConfig},
	error::ConfigError,
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	transport::{
		AuthorizationTransport, DefaultFailureClassifier, ExchangeRequest, FailureClassifier,
		FailureContext, FailureKind, TokenGrant, TransportFailure, TransportFuture,
	},
};

type SessionTokenResponse = StandardTokenResponse<SessionTokenFields, BasicTokenType>;
type SessionOAuthClient = oauth2::Client<
	BasicErrorResponse,
	SessionTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type SessionRequestError<E> = RequestTokenError<HttpClientError<E>, BasicErrorResponse>;

/// Non-standard fields of the token response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionTokenFields {
	/// User the token was issued for; servers send it as a string or a number.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<serde_json::Value>,
}
impl SessionTokenFields {
	fn user_id(&self) -> Result<Option<UserId>, TransportFailure> {
		let raw = match &self.user_id {
			None | Some(serde_json::Value::Null) => return Ok(None),
			Some(serde_json::Value::String(value)) => value.clone(),
			Some(serde_json::Value::Number(value)) => value.to_string(),
			Some(other) =>
				return Err(rejected(format!("token response has a non-scalar user_id: {other}"))),
		};

		UserId::new(raw)
			.map(Some)
			.map_err(|e| rejected(format!("token response has an unusable user_id: {e}")))
	}
}
impl ExtraTokenFields for SessionTokenFields {}

/// Transport speaking OAuth 2.0 to the configured token endpoint plus the revoke and
/// one-time code API endpoints.
pub struct OAuthTransport<C = ReqwestHttpClient>
where
	C: TokenHttpClient,
{
	oauth_client: SessionOAuthClient,
	http_client: Arc<C>,
	classifier: Arc<dyn FailureClassifier>,
	revoke_url: Url,
	one_time_code_url: Url,
	server_client_id: String,
}
impl OAuthTransport<ReqwestHttpClient> {
	/// Builds a transport over a reqwest client honoring `config.exchange_timeout`.
	pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
		Self::with_http_client(config, ReqwestHttpClient::new(config.exchange_timeout)?)
	}
}
impl<C> OAuthTransport<C>
where
	C: TokenHttpClient,
{
	/// Builds a transport over a caller-supplied HTTP client.
	pub fn with_http_client(
		config: &ClientConfig,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self, ConfigError> {
		let endpoints = config.endpoints()?;
		let client_id = config.require_client_id()?;
		let token_url = TokenUrl::new(endpoints.token.to_string())
			.map_err(ConfigError::invalid_url("token_url"))?;
		let mut oauth_client: SessionOAuthClient =
			oauth2::Client::new(OAuthClientId::new(client_id.into())).set_token_uri(token_url);

		if let Some(secret) = &config.client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.clone()));
		}
		if matches!(config.client_auth, ClientAuthMethod::RequestBody) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			classifier: Arc::new(DefaultFailureClassifier),
			revoke_url: endpoints.revoke,
			one_time_code_url: endpoints.one_time_code,
			server_client_id: config.require_server_client_id()?.into(),
		})
	}

	/// Replaces the failure classifier.
	pub fn with_classifier(mut self, classifier: impl 'static + FailureClassifier) -> Self {
		self.classifier = Arc::new(classifier);

		self
	}

	async fn post_form(
		&self,
		endpoint: &'static str,
		url: &Url,
		form: &[(&str, &str)],
	) -> Result<HttpResponse, TransportFailure> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(form).finish();
		let request = Request::builder()
			.method(Method::POST)
			.uri(url.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.body(body.into_bytes())
			.map_err(|e| rejected(format!("{endpoint} request could not be built: {e}")))?;
		let response = handle
			.call(request)
			.await
			.map_err(|e| self.map_http_error(endpoint, slot.take().as_ref(), e))?;
		let status = response.status();

		if status.is_success() {
			return Ok(response);
		}

		let ctx = api_error_context(endpoint, status.as_u16(), response.body());

		Err(TransportFailure::new(self.classifier.classify(&ctx), ctx.detail())
			.with_status(ctx.http_status)
			.with_retry_after(slot.take().and_then(|meta| meta.retry_after)))
	}

	fn map_request_error(
		&self,
		grant: &'static str,
		meta: Option<ResponseMetadata>,
		err: SessionRequestError<C::TransportError>,
	) -> TransportFailure {
		let meta = meta.as_ref();
		let status = meta.and_then(|value| value.status);
		let ctx = match err {
			RequestTokenError::ServerResponse(response) => {
				let mut ctx = FailureContext::new(grant)
					.with_http_status(status)
					.with_oauth_error(response.error().as_ref());

				if let Some(description) = response.error_description() {
					ctx = ctx.with_error_description(description.clone());
				}

				ctx
			},
			RequestTokenError::Request(err) => return self.map_http_error(grant, meta, err),
			RequestTokenError::Parse(err, body) => {
				if status.is_some_and(|code| (200..300).contains(&code)) {
					return rejected(format!("{grant} response could not be parsed: {err}"))
						.with_status(status);
				}

				FailureContext::new(grant)
					.with_http_status(status)
					.with_body_preview(String::from_utf8_lossy(&body))
			},
			RequestTokenError::Other(message) =>
				FailureContext::new(grant).with_http_status(status).with_body_preview(message),
		};

		TransportFailure::new(self.classifier.classify(&ctx), ctx.detail())
			.with_status(status)
			.with_retry_after(meta.and_then(|value| value.retry_after))
	}

	fn map_http_error(
		&self,
		grant: &'static str,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<C::TransportError>,
	) -> TransportFailure {
		let ctx = match &err {
			HttpClientError::Reqwest(inner) => FailureContext::new(grant)
				.with_network_error(true)
				.with_timed_out(C::is_timeout(inner)),
			HttpClientError::Http(_) =>
				return rejected(format!("{grant} request could not be built: {err}")),
			_ => FailureContext::new(grant).with_network_error(true),
		};

		TransportFailure::new(self.classifier.classify(&ctx), format!("{grant} request failed: {err}"))
			.with_status(meta.and_then(|value| value.status))
	}
}
impl<C> AuthorizationTransport for OAuthTransport<C>
where
	C: TokenHttpClient,
{
	fn exchange(&self, request: ExchangeRequest) -> TransportFuture<'_, TokenGrant> {
		Box::pin(async move {
			let slot = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(slot.clone());
			let grant = request.grant_type();
			let response = match &request {
				ExchangeRequest::AuthorizationCode { code, redirect_uri } => {
					let redirect = RedirectUrl::new(redirect_uri.to_string())
						.map_err(|e| rejected(format!("redirect URI is invalid: {e}")))?;

					self.oauth_client
						.exchange_code(AuthorizationCode::new(code.expose().to_owned()))
						.set_redirect_uri(Cow::Owned(redirect))
						.request_async(&handle)
						.await
				},
				ExchangeRequest::Refresh { refresh_token } => {
					let secret = RefreshToken::new(refresh_token.expose().to_owned());

					self.oauth_client.exchange_refresh_token(&secret).request_async(&handle).await
				},
				ExchangeRequest::ClientCredentials =>
					self.oauth_client.exchange_client_credentials().request_async(&handle).await,
			}
			.map_err(|e| self.map_request_error(grant, slot.take(), e))?;

			map_token_response(response)
		})
	}

	fn revoke<'a>(&'a self, access_token: &'a TokenSecret) -> TransportFuture<'a, ()> {
		Box::pin(async move {
			self.post_form("revoke", &self.revoke_url, &[("oauth_token", access_token.expose())])
				.await
				.map(|_| ())
		})
	}

	fn one_time_code<'a>(&'a self, access_token: &'a TokenSecret) -> TransportFuture<'a, String> {
		Box::pin(async move {
			let response = self
				.post_form(
					"one_time_code",
					&self.one_time_code_url,
					&[
						("clientId", self.server_client_id.as_str()),
						("type", "code"),
						("oauth_token", access_token.expose()),
					],
				)
				.await?;
			let envelope: OneTimeCodeEnvelope = serde_path_to_error::deserialize(
				&mut serde_json::Deserializer::from_slice(response.body()),
			)
			.map_err(|e| {
				rejected(format!(
					"one-time code response is malformed at `{}`: {}",
					e.path(),
					e.inner()
				))
			})?;

			Ok(envelope.data.code)
		})
	}
}
impl<C> Debug for OAuthTransport<C>
where
	C: TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthTransport")
			.field("revoke_url", &self.revoke_url.as_str())
			.field("one_time_code_url", &self.one_time_code_url.as_str())
			.field("server_client_id", &self.server_client_id)
			.finish_non_exhaustive()
	}
}

#[derive(Deserialize)]
struct OneTimeCodeEnvelope {
	data: OneTimeCodeData,
}

#[derive(Deserialize)]
struct OneTimeCodeData {
	code: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
	error: ApiErrorField,
	#[serde(default)]
	error_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiErrorField {
	Code(String),
	Detailed {
		#[serde(default, rename = "type")]
		kind: Option<String>,
		#[serde(default)]
		description: Option<String>,
	},
}

fn rejected(detail: impl Into<String>) -> TransportFailure {
	TransportFailure::new(FailureKind::Rejected, detail)
}

fn map_token_response(response: SessionTokenResponse) -> Result<TokenGrant, TransportFailure> {
	let expires_in = response
		.expires_in()
		.ok_or_else(|| rejected("token response is missing expires_in"))?
		.as_secs();
	let expires_in = i64::try_from(expires_in)
		.ok()
		.filter(|secs| *secs > 0)
		.ok_or_else(|| rejected("token response carries an unusable expires_in"))?;
	let mut grant =
		TokenGrant::new(response.access_token().secret().to_owned(), Duration::seconds(expires_in));

	if let Some(refresh) = response.refresh_token() {
		grant = grant.with_refresh_token(refresh.secret().to_owned());
	}
	if let Some(user_id) = response.extra_fields().user_id()? {
		grant = grant.with_user_id(user_id);
	}

	Ok(grant)
}

fn api_error_context(endpoint: &'static str, status: u16, body: &[u8]) -> FailureContext {
	let ctx = FailureContext::new(endpoint).with_http_status(Some(status));

	match serde_json::from_slice::<ApiErrorBody>(body) {
		Ok(ApiErrorBody { error: ApiErrorField::Code(code), error_description }) => {
			let ctx = ctx.with_oauth_error(code);

			match error_description {
				Some(description) => ctx.with_error_description(description),
				None => ctx,
			}
		},
		Ok(ApiErrorBody { error: ApiErrorField::Detailed { kind, description }, .. }) => {
			let mut ctx = ctx;

			if let Some(kind) = kind {
				ctx = ctx.with_oauth_error(kind);
			}
			if let Some(description) = description {
				ctx = ctx.with_error_description(description);
			}

			ctx
		},
		Err(_) if body.is_empty() => ctx,
		Err(_) => ctx.with_body_preview(String::from_utf8_lossy(body)),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config() -> ClientConfig {
		ClientConfig::new(
			"c1",
			"s1",
			"myapp",
			Url::parse("https://id.example.com").expect("Server URL fixture should parse."),
		)
	}

	#[test]
	fn builds_for_both_client_auth_methods() {
		let body = OAuthTransport::from_config(&config()).expect("Body auth should build.");

		assert_eq!(body.revoke_url.as_str(), "https://id.example.com/api/2/logout");
		assert_eq!(body.server_client_id, "c1");

		let mut basic = config().with_server_client_id("server-c1");

		basic.client_auth = ClientAuthMethod::BasicAuth;

		let basic = OAuthTransport::from_config(&basic).expect("Basic auth should build.");

		assert_eq!(basic.server_client_id, "server-c1");
	}

	#[test]
	fn missing_client_id_is_a_config_error() {
		let mut config = config();

		config.client_id = None;

		assert_eq!(
			OAuthTransport::from_config(&config).map(|_| ()),
			Err(ConfigError::MissingField { field: "client_id" }),
		);
	}

	#[test]
	fn user_ids_accept_strings_and_numbers() {
		let fields: SessionTokenFields =
			serde_json::from_str(r#"{"user_id":42}"#).expect("Numeric user id should parse.");

		assert_eq!(
			fields.user_id().expect("User id should convert.").map(String::from),
			Some("42".into()),
		);

		let fields: SessionTokenFields =
			serde_json::from_str(r#"{"user_id":"u42"}"#).expect("String user id should parse.");

		assert_eq!(
			fields.user_id().expect("User id should convert.").map(String::from),
			Some("u42".into()),
		);
		assert_eq!(SessionTokenFields::default().user_id(), Ok(None));

		let fields: SessionTokenFields =
			serde_json::from_str(r#"{"user_id":[1]}"#).expect("Array user id should parse.");

		assert_eq!(fields.user_id().map_err(|e| e.kind), Err(FailureKind::Rejected));
	}

	#[test]
	fn api_errors_understand_both_shapes() {
		let flat = api_error_context(
			"revoke",
			401,
			br#"{"error":"invalid_token","error_description":"Token expired"}"#,
		);

		assert_eq!(flat.oauth_error.as_deref(), Some("invalid_token"));
		assert_eq!(flat.error_description.as_deref(), Some("Token expired"));

		let nested = api_error_context(
			"one_time_code",
			403,
			br#"{"error":{"code":403,"type":"ApiException","description":"Forbidden"}}"#,
		);

		assert_eq!(nested.oauth_error.as_deref(), Some("ApiException"));
		assert_eq!(
			DefaultFailureClassifier.classify(&nested),
			FailureKind::Rejected,
		);

		let html = api_error_context("revoke", 502, b"<html>Bad gateway</html>");

		assert_eq!(html.body_preview.as_deref(), Some("<html>Bad gateway</html>"));
		assert_eq!(DefaultFailureClassifier.classify(&html), FailureKind::Unavailable);
	}
}
