//! Load-balancer affinity cookie handling.

use docbridge_core::StickyToken;
use http::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};

/// Pull the affinity cookie out of a response, if the backend set one.
pub(crate) fn from_response(headers: &HeaderMap, cookie_name: &str) -> StickyToken {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| cookie_value(value, cookie_name))
        .map_or_else(StickyToken::none, StickyToken::new)
}

/// Build the `Cookie` header for a request. Empty tokens send nothing.
pub(crate) fn request_header(sticky: &StickyToken, cookie_name: &str) -> Option<(http::HeaderName, HeaderValue)> {
    if sticky.is_empty() {
        return None;
    }
    HeaderValue::from_str(&format!("{cookie_name}={}", sticky.as_str()))
        .ok()
        .map(|value| (COOKIE, value))
}

fn cookie_value(set_cookie: &str, cookie_name: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.trim() != cookie_name {
        return None;
    }
    let value = value.trim().trim_matches('"');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("session=abc; Path=/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("FB_LB=node-7; Path=/; HttpOnly"),
        );

        let sticky = from_response(&headers, "FB_LB");
        assert_eq!(sticky.as_str(), "node-7");
    }

    #[test]
    fn test_missing_cookie_is_empty() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("FB_LB=; Path=/"));
        assert!(from_response(&headers, "FB_LB").is_empty());
        assert!(from_response(&HeaderMap::new(), "FB_LB").is_empty());
    }

    #[test]
    fn test_request_header() {
        assert!(request_header(&StickyToken::none(), "FB_LB").is_none());

        let (name, value) = request_header(&StickyToken::new("node-7"), "FB_LB").unwrap();
        assert_eq!(name, COOKIE);
        assert_eq!(value, "FB_LB=node-7");
    }
}
