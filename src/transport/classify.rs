//! Failure classification hooks for token endpoint errors.
//!
//! Classifiers work on plain data (status codes, OAuth fields, a body preview) so custom
//! transports can reuse them without depending on any HTTP client.

// self
use crate::{_prelude::*, transport::FailureKind};

/// Maps raw token endpoint failures onto [`FailureKind`].
///
/// Override it when an authorization server reports credential problems in a non-standard way.
pub trait FailureClassifier
where
	Self: Send + Sync,
{
	/// Classifies a failed call.
	fn classify(&self, ctx: &FailureContext) -> FailureKind;
}

/// Everything known about a failed call at classification time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureContext {
	/// OAuth `grant_type` of the failing request, or the endpoint name for non-token calls.
	pub grant: &'static str,
	/// HTTP status code returned by the server, when available.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of a non-JSON response body.
	pub body_preview: Option<String>,
	/// The request never produced a response.
	pub network_error: bool,
	/// The HTTP client gave up waiting.
	pub timed_out: bool,
}
impl FailureContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context for `grant`.
	pub fn new(grant: &'static str) -> Self {
		Self { grant, ..Default::default() }
	}

	/// Marks the failure as a network-level error.
	pub fn with_network_error(mut self, network_error: bool) -> Self {
		self.network_error = network_error;

		self
	}

	/// Marks the failure as a client-side timeout.
	pub fn with_timed_out(mut self, timed_out: bool) -> Self {
		self.timed_out = timed_out;

		self
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: Option<u16>) -> Self {
		self.http_status = status;

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a truncated body preview.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Short description assembled from the most specific field available.
	pub fn detail(&self) -> String {
		let source = self
			.error_description
			.as_deref()
			.or(self.oauth_error.as_deref())
			.or(self.body_preview.as_deref());

		match source {
			Some(text) => format!("{} request failed: {text}", self.grant),
			None => format!("{} request failed", self.grant),
		}
	}
}

/// Classifier applying OAuth 2.0 error codes first, then body hints, then the status code.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFailureClassifier;
impl FailureClassifier for DefaultFailureClassifier {
	fn classify(&self, ctx: &FailureContext) -> FailureKind {
		if ctx.timed_out {
			return FailureKind::Timeout;
		}
		if ctx.network_error {
			return FailureKind::Network;
		}
		if let Some(kind) = ctx
			.oauth_error
			.as_deref()
			.and_then(match_error_code)
			.or_else(|| ctx.error_description.as_deref().and_then(match_error_code))
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= FailureContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(FailureContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn match_error_code(value: &str) -> Option<FailureKind> {
	let value = value.trim().to_ascii_lowercase();

	match value.as_str() {
		"invalid_grant" | "access_denied" | "invalid_client" | "unauthorized_client"
		| "invalid_token" | "expired_token" => Some(FailureKind::InvalidCredential),
		"invalid_request" | "invalid_scope" | "unsupported_grant_type"
		| "unsupported_response_type" => Some(FailureKind::Rejected),
		"temporarily_unavailable" | "server_error" => Some(FailureKind::Unavailable),
		_ => None,
	}
}

fn classify_body(body: Option<&str>) -> Option<FailureKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("invalid_client") =>
			Some(FailureKind::InvalidCredential),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(FailureKind::Unavailable),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> FailureKind {
	match status {
		Some(401) => FailureKind::InvalidCredential,
		Some(408 | 429) => FailureKind::Unavailable,
		Some(code) if code >= 500 => FailureKind::Unavailable,
		Some(code) if (400..500).contains(&code) => FailureKind::Rejected,
		_ => FailureKind::Unavailable,
	}
}
