//! HTTP basic auth for the internal routes.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Check the `Authorization: Basic ...` header against the configured
/// usage-stats credentials. The password is compared by BLAKE3 digest so the
/// plaintext never has to live in configuration.
pub fn verify_basic_auth(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let (Some(expected_user), Some(expected_hash)) = (
        config.usage_stats_user.as_deref(),
        config.usage_stats_password_hash.as_deref(),
    ) else {
        return Err(ServerError::Unauthorized);
    };

    let (user, password) = basic_credentials(headers).ok_or(ServerError::Unauthorized)?;
    let password_hash = blake3::hash(password.as_bytes()).to_hex();

    // Evaluate both comparisons before branching.
    let user_ok = constant_time_eq(user.as_bytes(), expected_user.as_bytes());
    let password_ok = constant_time_eq(password_hash.as_bytes(), expected_hash.as_bytes());
    if user_ok & password_ok {
        Ok(())
    } else {
        Err(ServerError::Unauthorized)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::HeaderValue;

    pub(crate) fn basic_header(user: &str, password: &str) -> HeaderValue {
        let encoded = STANDARD.encode(format!("{user}:{password}"));
        HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
    }

    pub(crate) fn config_with_credentials(user: &str, password: &str) -> ServerConfig {
        ServerConfig {
            usage_stats_user: Some(user.to_string()),
            usage_stats_password_hash: Some(blake3::hash(password.as_bytes()).to_hex().to_string()),
            ..ServerConfig::default()
        }
    }

    fn headers(value: HeaderValue) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", value);
        headers
    }

    #[test]
    fn accepts_matching_credentials() {
        let config = config_with_credentials("ops", "hunter2");
        assert!(verify_basic_auth(&headers(basic_header("ops", "hunter2")), &config).is_ok());
    }

    #[test]
    fn rejects_wrong_password_or_user() {
        let config = config_with_credentials("ops", "hunter2");
        assert!(verify_basic_auth(&headers(basic_header("ops", "hunter3")), &config).is_err());
        assert!(verify_basic_auth(&headers(basic_header("root", "hunter2")), &config).is_err());
        assert!(verify_basic_auth(&HeaderMap::new(), &config).is_err());
        assert!(verify_basic_auth(
            &headers(HeaderValue::from_static("Bearer hunter2")),
            &config
        )
        .is_err());
    }

    #[test]
    fn disabled_without_configuration() {
        let config = ServerConfig::default();
        assert!(verify_basic_auth(&headers(basic_header("ops", "hunter2")), &config).is_err());
    }
}
