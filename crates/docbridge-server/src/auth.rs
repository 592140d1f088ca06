//! Inbound authentication and profile selection.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use docbridge_core::Credential;
use http::{header, HeaderMap};

use crate::error::ApiError;

/// Header naming the service account a request runs as.
pub const PROFILE_HEADER: &str = "onbase-profile";

/// Checks inbound basic credentials when configured.
#[derive(Debug, Clone, Default)]
pub struct BasicAuth {
    expected: Option<Credential>,
}

impl BasicAuth {
    /// Require `credential` on every API request; `None` disables the check.
    pub fn new(expected: Option<Credential>) -> Self {
        Self { expected }
    }

    /// Whether requests must authenticate.
    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// Accept or challenge a request.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = &self.expected else {
            return Ok(());
        };
        match parse_basic(headers) {
            Some(given) if given == *expected => Ok(()),
            _ => Err(ApiError::basic_challenge()),
        }
    }
}

fn parse_basic(headers: &HeaderMap) -> Option<Credential> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credential::new(username, password))
}

/// The single `OnBase-Profile` value of a request, if it names a known
/// profile.
pub fn profile_header<'a>(
    headers: &'a HeaderMap,
    is_known: impl Fn(&str) -> bool,
) -> Result<&'a str, ApiError> {
    let mut values = headers.get_all(PROFILE_HEADER).iter();
    let (Some(value), None) = (values.next(), values.next()) else {
        return Err(ApiError::unauthorized(
            "exactly one OnBase-Profile header is required",
        ));
    };
    let profile = value
        .to_str()
        .map_err(|_| ApiError::unauthorized("Unrecognized OnBase profile"))?
        .trim();
    if profile.is_empty() || !is_known(profile) {
        return Err(ApiError::unauthorized("Unrecognized OnBase profile"));
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};

    fn basic(user: &str, pass: &str) -> HeaderValue {
        let encoded = STANDARD.encode(format!("{user}:{pass}"));
        HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
    }

    #[test]
    fn test_basic_auth_disabled() {
        let auth = BasicAuth::default();
        assert!(!auth.is_enabled());
        assert!(auth.check(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_basic_auth() {
        let auth = BasicAuth::new(Some(Credential::new("gateway", "gw:pass")));

        let mut headers = HeaderMap::new();
        assert_eq!(auth.check(&headers).unwrap_err().status(), StatusCode::UNAUTHORIZED);

        headers.insert(header::AUTHORIZATION, basic("gateway", "gw:pass"));
        tokio_test::assert_ok!(auth.check(&headers));

        headers.insert(header::AUTHORIZATION, basic("gateway", "wrong"));
        assert!(auth.check(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(auth.check(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic %%%"));
        assert!(auth.check(&headers).is_err());
    }

    #[test]
    fn test_profile_header() {
        let known = |name: &str| name == "ops";

        let mut headers = HeaderMap::new();
        assert!(profile_header(&headers, known).is_err());

        headers.insert("OnBase-Profile", HeaderValue::from_static("ops"));
        assert_eq!(profile_header(&headers, known).unwrap(), "ops");

        headers.insert("OnBase-Profile", HeaderValue::from_static("finance"));
        let err = profile_header(&headers, known).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.detail(), "Unrecognized OnBase profile");
    }

    #[test]
    fn test_profile_header_must_be_single() {
        let mut headers = HeaderMap::new();
        headers.append("OnBase-Profile", HeaderValue::from_static("ops"));
        headers.append("OnBase-Profile", HeaderValue::from_static("ops"));
        assert!(profile_header(&headers, |_| true).is_err());
    }
}
