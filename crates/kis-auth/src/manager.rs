//! Token manager.
//!
//! Returns a valid token per environment, looking in order at the
//! in-process copy, the durable cache and finally the auth endpoint.
//! Refreshes are single-flight per environment: concurrent callers wait on
//! the same lock and reuse the token the first caller obtained.

use crate::client::TokenIssuer;
use crate::error::{AuthError, AuthResult};
use crate::token_cache::{CachedToken, TokenStore};
use chrono::{DateTime, Duration, Utc};
use kis_core::{AccessToken, AppCredentials, BoxFuture, Environment};
use kis_telemetry::Metrics;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Anything that can hand out a valid token (the manager, or test doubles).
pub trait TokenSource: Send + Sync {
    fn acquire(&self, environment: Environment) -> BoxFuture<'_, AuthResult<AccessToken>>;
}

/// Per-environment token manager.
pub struct TokenManager {
    credentials: AppCredentials,
    issuer: Arc<dyn TokenIssuer>,
    store: Arc<dyn TokenStore>,
    mock_slot: Mutex<Option<AccessToken>>,
    live_slot: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(
        credentials: AppCredentials,
        issuer: Arc<dyn TokenIssuer>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            credentials,
            issuer,
            store,
            mock_slot: Mutex::new(None),
            live_slot: Mutex::new(None),
        }
    }

    fn slot(&self, environment: Environment) -> &Mutex<Option<AccessToken>> {
        match environment {
            Environment::Mock => &self.mock_slot,
            Environment::Live => &self.live_slot,
        }
    }

    /// Return a token valid now for `environment`.
    ///
    /// The slot lock is held across the auth call, so at most one refresh is
    /// in flight per environment.
    pub async fn get_token(&self, environment: Environment) -> AuthResult<AccessToken> {
        let mut slot = self.slot(environment).lock().await;
        let now = Utc::now();

        if let Some(token) = slot.as_ref().filter(|t| t.is_valid_at(now)) {
            return Ok(token.clone());
        }

        match self.store.load(environment).await {
            Ok(Some(cached)) => {
                let token = cached.into_token(environment);
                if token.is_valid_at(now) {
                    info!(
                        %environment,
                        expires_at = %token.expires_at(),
                        "Using cached access token"
                    );
                    *slot = Some(token.clone());
                    return Ok(token);
                }
                info!(%environment, "Cached access token expired");
            }
            Ok(None) => {}
            Err(e) => warn!(%environment, error = %e, "Ignoring unreadable token cache"),
        }

        let token = self.refresh(environment).await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    async fn refresh(&self, environment: Environment) -> AuthResult<AccessToken> {
        if !self.credentials.is_complete() {
            return Err(AuthError::MissingCredentials);
        }

        let issued = self
            .issuer
            .issue(environment, &self.credentials)
            .await
            .and_then(|issued| {
                let expires_at = expiry_after(issued.expires_in)?;
                Ok((issued, expires_at))
            });
        let (issued, expires_at) = match issued {
            Ok(issued) => issued,
            Err(e) => {
                Metrics::token_refresh(environment.as_str(), "error");
                return Err(e);
            }
        };
        Metrics::token_refresh(environment.as_str(), "ok");

        let token = AccessToken::new(issued.access_token, expires_at, environment);
        info!(%environment, %expires_at, "Issued new access token");

        if let Err(e) = self
            .store
            .save(environment, &CachedToken::from_token(&token))
            .await
        {
            warn!(%environment, error = %e, "Failed to persist token cache");
        }

        Ok(token)
    }
}

/// `now + expires_in`, rejecting lifetimes that are not positive or do not fit.
fn expiry_after(expires_in: i64) -> AuthResult<DateTime<Utc>> {
    Duration::try_seconds(expires_in)
        .filter(|lifetime| *lifetime > Duration::zero())
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| {
            AuthError::InvalidResponse(format!("expires_in out of range: {expires_in}"))
        })
}

impl TokenSource for TokenManager {
    fn acquire(&self, environment: Environment) -> BoxFuture<'_, AuthResult<AccessToken>> {
        Box::pin(self.get_token(environment))
    }
}
