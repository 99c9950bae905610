//! API client module for the game backend

pub mod client;

use serde::{Deserialize, Serialize};

pub use client::{ApiClient, ApiError, Bearer};

pub const LOGIN_ENDPOINT: &str = "auth/login";
pub const REGISTER_ENDPOINT: &str = "auth/register";
pub const VERIFY_ENDPOINT: &str = "auth/verify";
pub const LOGOUT_ENDPOINT: &str = "auth/logout";

/// Body of a login request.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of a registration request.
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub username: &'a str,
}

/// Successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    /// Absolute expiry in Unix seconds, 0 if the server did not say.
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub expires_in: i64,
}

/// Server's view of the current token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub is_expired: bool,
}

impl TokenInfo {
    /// Valid when not flagged expired and either no expiry is given or it
    /// lies after `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.is_expired && (self.expires_at == 0 || now < self.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_info_validity() {
        let now = 1_700_000_000;
        let info = |expires_at, is_expired| TokenInfo {
            expires_at,
            is_expired,
        };
        assert!(info(0, false).is_valid_at(now));
        assert!(info(now + 1, false).is_valid_at(now));
        assert!(!info(now, false).is_valid_at(now));
        assert!(!info(0, true).is_valid_at(now));
        assert!(!info(now + 100, true).is_valid_at(now));
    }

    #[test]
    fn test_auth_response_defaults() {
        let resp: AuthResponse = serde_json::from_str(r#"{"token":"A.B.C"}"#).unwrap();
        assert_eq!(resp.expires_at, 0);
        assert_eq!(resp.expires_in, 0);
    }
}
