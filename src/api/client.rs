//! Authenticated HTTP client for the game backend
//!
//! Wraps reqwest::Client with base-URL resolution and bearer token injection.
//! Transport errors, non-2xx statuses and undecodable bodies all collapse into
//! a single [`ApiError`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::auth::TokenManager;

/// Opaque request failure. The fields are for logging only.
#[derive(Debug, thiserror::Error)]
#[error("{method} {endpoint} failed: {reason}")]
pub struct ApiError {
    pub method: &'static str,
    pub endpoint: String,
    pub reason: String,
}

impl ApiError {
    fn new(method: &'static str, endpoint: &str, reason: impl ToString) -> Self {
        Self {
            method,
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Which bearer token, if any, to attach to a request.
#[derive(Debug, Clone, Copy)]
pub enum Bearer<'a> {
    /// Whatever the session currently holds, if anything.
    Session,
    /// A specific token, e.g. the one being logged out.
    Explicit(&'a str),
    None,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<TokenManager>,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Arc<TokenManager>) -> anyhow::Result<Self> {
        // Endpoints are relative; a trailing slash keeps the last path segment.
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, method: &'static str, endpoint: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| ApiError::new(method, endpoint, e))
    }

    fn authorize(
        &self,
        req: reqwest::RequestBuilder,
        bearer: Bearer<'_>,
    ) -> reqwest::RequestBuilder {
        let token = match bearer {
            Bearer::Session => self.session.get_token(),
            Bearer::Explicit(t) if !t.is_empty() => Some(t.to_string()),
            Bearer::Explicit(_) | Bearer::None => None,
        };
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<B, R>(
        &self,
        endpoint: &str,
        body: &B,
        bearer: Bearer<'_>,
    ) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.resolve("POST", endpoint)?;
        tracing::debug!("POST {}", url);

        let req = self.authorize(self.http.post(url).json(body), bearer);
        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::new("POST", endpoint, e))?;
        decode_response("POST", endpoint, resp).await
    }

    /// GET and decode a JSON response.
    pub async fn get_json<R>(&self, endpoint: &str, bearer: Bearer<'_>) -> Result<R, ApiError>
    where
        R: DeserializeOwned,
    {
        let url = self.resolve("GET", endpoint)?;
        tracing::debug!("GET {}", url);

        let req = self.authorize(self.http.get(url), bearer);
        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::new("GET", endpoint, e))?;
        decode_response("GET", endpoint, resp).await
    }
}

/// Check HTTP status and decode the body.
async fn decode_response<R: DeserializeOwned>(
    method: &'static str,
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<R, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::new(
            method,
            endpoint,
            format!("HTTP {}: {}", status.as_u16(), body),
        ));
    }
    resp.json::<R>()
        .await
        .map_err(|e| ApiError::new(method, endpoint, format!("bad response body: {}", e)))
}
