//! Secret handling utilities.
//!
//! Re-exports secrecy types and builds the bearer header value without
//! ever formatting the token through `Debug`.

pub use secrecy::{ExposeSecret, SecretString};

use reqwest::header::HeaderValue;

/// `Authorization` header value for a bearer token, marked sensitive so
/// reqwest redacts it from its own debug output.
pub(crate) fn bearer_header(token: &SecretString) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Copy a secret without exposing it anywhere but the new box.
pub(crate) fn duplicate(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}
