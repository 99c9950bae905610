//! Login, registration, verification and logout
//!
//! Each flow talks to the backend through [`ApiClient`], records the outcome
//! in the [`TokenManager`] and announces it on [`AuthEvents`]. Failures are
//! logged and reported as `None`/`false`; user-facing messages are the
//! caller's business.

use std::sync::Arc;

use serde::de::IgnoredAny;

use super::events::AuthEvents;
use super::session::TokenManager;
use super::tokens::unix_now;
use crate::api::{
    ApiClient, ApiError, AuthResponse, Bearer, LoginRequest, RegisterRequest, TokenInfo,
    LOGIN_ENDPOINT, LOGOUT_ENDPOINT, REGISTER_ENDPOINT, VERIFY_ENDPOINT,
};
use crate::storage::PrefsFile;

/// Preference key for the last successfully authenticated email.
pub const REMEMBERED_EMAIL_KEY: &str = "remembered_email";

pub struct AuthService {
    api: Arc<ApiClient>,
    session: Arc<TokenManager>,
    events: Arc<AuthEvents>,
    prefs: Arc<PrefsFile>,
}

impl AuthService {
    pub fn new(
        api: Arc<ApiClient>,
        session: Arc<TokenManager>,
        events: Arc<AuthEvents>,
        prefs: Arc<PrefsFile>,
    ) -> Self {
        Self {
            api,
            session,
            events,
            prefs,
        }
    }

    /// Log in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Option<AuthResponse> {
        tracing::info!("Logging in as {}", email);
        let result = self
            .api
            .post_json(LOGIN_ENDPOINT, &LoginRequest { email, password }, Bearer::None)
            .await;
        self.complete(email, result)
    }

    /// Create an account; a successful registration is also a login.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Option<AuthResponse> {
        tracing::info!("Registering {}", email);
        let body = RegisterRequest {
            email,
            password,
            username,
        };
        let result = self
            .api
            .post_json(REGISTER_ENDPOINT, &body, Bearer::None)
            .await;
        self.complete(email, result)
    }

    fn complete(
        &self,
        email: &str,
        result: Result<AuthResponse, ApiError>,
    ) -> Option<AuthResponse> {
        let resp = match result {
            Ok(resp) if !resp.token.is_empty() => resp,
            Ok(_) => {
                tracing::warn!("Authentication response carried no token");
                return None;
            }
            Err(e) => {
                tracing::warn!("Authentication failed: {}", e);
                return None;
            }
        };

        if resp.expires_at > 0 {
            self.session
                .set_token_with_expiry(&resp.token, resp.expires_at, resp.expires_in);
        } else {
            self.session.set_token(&resp.token);
        }
        self.remember_email(email);

        let delivered = self.events.authenticated.trigger();
        tracing::info!("Authenticated; notified {} subscribers", delivered);
        Some(resp)
    }

    /// Ask the backend whether the current token is still good.
    ///
    /// A token the server rejects is cleared locally. Transport failures
    /// leave the session alone. Never fires `authenticated`.
    pub async fn verify(&self) -> bool {
        if !self.session.has_valid_token() {
            return false;
        }

        let info: TokenInfo = match self.api.get_json(VERIFY_ENDPOINT, Bearer::Session).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Token verification unavailable: {}", e);
                return false;
            }
        };

        if info.is_valid_at(unix_now()) {
            tracing::info!("Token verified");
            true
        } else {
            tracing::info!(
                "Server reports token invalid (expires_at={}, is_expired={})",
                info.expires_at,
                info.is_expired
            );
            self.session.clear_token();
            self.events.signed_out.trigger();
            false
        }
    }

    /// Clear the local session, then tell the backend.
    ///
    /// The local clear happens first and does not wait on the network.
    pub async fn logout(&self) {
        let token = self.session.get_token();
        self.session.clear_token();
        self.events.signed_out.trigger();

        let Some(token) = token else {
            return;
        };
        let result: Result<IgnoredAny, _> = self
            .api
            .post_json(LOGOUT_ENDPOINT, &serde_json::json!({}), Bearer::Explicit(&token))
            .await;
        if let Err(e) = result {
            tracing::debug!("Logout notification failed (ignored): {}", e);
        }
    }

    pub fn remembered_email(&self) -> Option<String> {
        match self.prefs.get(REMEMBERED_EMAIL_KEY) {
            Ok(email) => email.filter(|e| !e.is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read remembered email: {}", e);
                None
            }
        }
    }

    fn remember_email(&self, email: &str) {
        if email.is_empty() {
            return;
        }
        if let Err(e) = self.prefs.set(REMEMBERED_EMAIL_KEY, email) {
            tracing::warn!("Failed to remember email: {}", e);
        }
    }

    /// Drop the remembered email. Only ever done on explicit request.
    pub fn forget_email(&self) {
        if let Err(e) = self.prefs.delete(REMEMBERED_EMAIL_KEY) {
            tracing::warn!("Failed to forget email: {}", e);
        }
    }
}
