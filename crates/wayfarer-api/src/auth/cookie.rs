//! Access token cookie
//!
//! Browser clients receive the access token as an HttpOnly cookie in
//! addition to the JSON body; the auth pipeline reads it back when no
//! bearer header is present.

use axum::http::{header, HeaderMap, HeaderValue};
use axum::http::header::InvalidHeaderValue;
use wayfarer_core::CookieConfig;

/// Value written over the token on logout
pub const LOGGED_OUT: &str = "loggedout";

fn render(config: &CookieConfig, value: &str, max_age_secs: u64) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={value}; HttpOnly; Path=/; Max-Age={max_age_secs}; SameSite=Lax",
        config.name
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// `Set-Cookie` value carrying an access token
pub fn token_cookie(config: &CookieConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    render(config, token, config.max_age_days.saturating_mul(24 * 60 * 60))
}

/// `Set-Cookie` value that overwrites the token with an expired placeholder
pub fn cleared_cookie(config: &CookieConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    render(config, LOGGED_OUT, 0)
}

/// Read the named cookie from the request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cookie() {
        let config = CookieConfig::default();
        let cookie = token_cookie(&config, "abc.def.ghi").unwrap();

        assert_eq!(
            cookie.to_str().unwrap(),
            "jwt=abc.def.ghi; HttpOnly; Path=/; Max-Age=7776000; SameSite=Lax"
        );
    }

    #[test]
    fn test_secure_flag() {
        let config = CookieConfig {
            secure: true,
            ..Default::default()
        };
        let cookie = token_cookie(&config, "t").unwrap();
        assert!(cookie.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn test_cleared_cookie() {
        let cookie = cleared_cookie(&CookieConfig::default()).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("jwt=loggedout;"));
        assert!(value.contains("Max-Age=0"));
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; jwt=abc.def; lang=en".parse().unwrap());

        assert_eq!(read_cookie(&headers, "jwt"), Some("abc.def".to_string()));
        assert_eq!(read_cookie(&headers, "lang"), Some("en".to_string()));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_empty_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "jwt=".parse().unwrap());
        assert_eq!(read_cookie(&headers, "jwt"), None);
    }
}
