//! HTTP client for the KIS token endpoint.
//!
//! Exchanges the app key/secret for a bearer token via the
//! client-credentials grant (`POST /oauth2/tokenP`).

use crate::error::{AuthError, AuthResult};
use kis_core::{AppCredentials, BoxFuture, Environment};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for token requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifetime assumed when the response omits `expires_in` (24h).
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 86_400;

/// Token endpoint path under the REST base URL.
const TOKEN_PATH: &str = "/oauth2/tokenP";

/// A freshly issued token before it is stamped with an expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// Something that can issue tokens (HTTP in production, doubles in tests).
pub trait TokenIssuer: Send + Sync {
    fn issue<'a>(
        &'a self,
        environment: Environment,
        credentials: &'a AppCredentials,
    ) -> BoxFuture<'a, AuthResult<IssuedToken>>;
}

/// Client-credentials request body.
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    appkey: &'a str,
    appsecret: &'a str,
}

/// Token endpoint response. KIS sends `expires_in` as a number, but older
/// gateways quote it, so both are accepted.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn into_issued(self) -> AuthResult<IssuedToken> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("missing access_token".to_string()))?;

        let expires_in = match self.expires_in {
            None => DEFAULT_EXPIRES_IN_SECS,
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            Some(serde_json::Value::String(s)) => s.trim().parse().map_err(|_| {
                AuthError::InvalidResponse(format!("expires_in is not an integer: {s}"))
            })?,
            Some(other) => {
                return Err(AuthError::InvalidResponse(format!(
                    "unexpected expires_in: {other}"
                )))
            }
        };

        if expires_in <= 0 || chrono::Duration::try_seconds(expires_in).is_none() {
            return Err(AuthError::InvalidResponse(format!(
                "expires_in out of range: {expires_in}"
            )));
        }

        Ok(IssuedToken {
            access_token,
            expires_in,
        })
    }
}

/// Client for the KIS auth endpoint.
pub struct AuthClient {
    /// HTTP client.
    client: Client,
    /// Base URL override (tests, proxies). Defaults to the environment's URL.
    base_url: Option<String>,
}

impl AuthClient {
    /// Create a client that talks to each environment's own endpoint.
    pub fn new() -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Create a client pinned to a specific base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> AuthResult<Self> {
        let mut client = Self::new()?;
        client.base_url = Some(base_url.into());
        Ok(client)
    }

    fn token_url(&self, environment: Environment) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| environment.rest_base_url())
            .trim_end_matches('/');
        format!("{base}{TOKEN_PATH}")
    }

    /// Request a new token.
    pub async fn request_token(
        &self,
        environment: Environment,
        credentials: &AppCredentials,
    ) -> AuthResult<IssuedToken> {
        let url = self.token_url(environment);
        info!(%environment, %url, "Requesting access token");

        let request = TokenRequest {
            grant_type: "client_credentials",
            appkey: &credentials.app_key,
            appsecret: credentials.app_secret.as_str(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%environment, status = status.as_u16(), "Token request rejected");
            return Err(AuthError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let issued = body.into_issued()?;
        debug!(%environment, expires_in = issued.expires_in, "Access token issued");
        Ok(issued)
    }
}

impl TokenIssuer for AuthClient {
    fn issue<'a>(
        &'a self,
        environment: Environment,
        credentials: &'a AppCredentials,
    ) -> BoxFuture<'a, AuthResult<IssuedToken>> {
        Box::pin(self.request_token(environment, credentials))
    }
}
