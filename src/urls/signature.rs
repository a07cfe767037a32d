// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
// self
use crate::{_prelude::*, error::ConfigError};

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the URL signature.
pub const SIGNATURE_PARAM: &str = "sig";
/// Parameters covered by the signature when present.
pub const SIGNED_PARAMS: [&str; 3] = ["client_id", "redirect_uri", "response_type"];

/// Canonical signing input: signed parameters sorted by key, joined as `k=v` with `&`.
pub fn signing_input<K, V>(params: &BTreeMap<K, V>) -> String
where
	K: AsRef<str> + Ord,
	V: AsRef<str>,
{
	let mut buf = String::new();

	for (key, value) in params.iter().filter(|(key, _)| SIGNED_PARAMS.contains(&key.as_ref())) {
		if !buf.is_empty() {
			buf.push('&');
		}

		buf.push_str(key.as_ref());
		buf.push('=');
		buf.push_str(value.as_ref());
	}

	buf
}

/// HMAC-SHA256 of [`signing_input`] keyed by `secret`, URL-safe base64 without padding.
pub fn sign_params<K, V>(params: &BTreeMap<K, V>, secret: &str) -> Result<String, ConfigError>
where
	K: AsRef<str> + Ord,
	V: AsRef<str>,
{
	let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
		.map_err(|e| ConfigError::InvalidSignSecret { reason: e.to_string() })?;

	mac.update(signing_input(params).as_bytes());

	Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}
