//! Access-token lifecycle.
//!
//! The provider hands out short-lived access tokens that are refreshed by
//! exchanging the long-lived token. The long-lived token itself expires on a
//! longer cycle, so a failed refresh falls back to minting a new long-lived
//! token from the current short-lived one, then retrying the refresh once.
//! Nothing downstream ever runs on a token that failed both levels.

use crate::client::GraphClient;
use crate::payload::OAuthTokenResponse;
use crate::GraphError;
use tracing::{info, warn};

/// The token pair threaded through one orchestration run. Replaces the
/// original design's process-wide mutable token: callers pass the current
/// context in and receive the (possibly refreshed) context back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub access_token: String,
    pub long_lived_token: String,
}

/// Durable home for refreshed tokens, so the next run starts from the
/// newest pair. Implemented by the server's config store.
pub trait TokenStore: Send + Sync {
    fn persist_access_token(&self, token: &str) -> Result<(), GraphError>;
    fn persist_long_lived_token(&self, token: &str) -> Result<(), GraphError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Valid,
    Expired,
}

impl GraphClient {
    /// Gate for every fetch: returns a context whose access token answered
    /// the liveness probe or was freshly refreshed, or `GraphError::Token`
    /// when both the refresh and the regeneration fallback failed.
    pub async fn ensure_valid_token(
        &self,
        context: &TokenContext,
        store: &dyn TokenStore,
    ) -> Result<TokenContext, GraphError> {
        match self.probe_token(&context.access_token).await? {
            Liveness::Valid => Ok(context.clone()),
            Liveness::Expired => self.refresh_chain(context, store).await,
        }
    }

    async fn refresh_chain(
        &self,
        context: &TokenContext,
        store: &dyn TokenStore,
    ) -> Result<TokenContext, GraphError> {
        info!(event = "token_expired");
        match self.exchange_token(&context.long_lived_token).await {
            Ok(access_token) => {
                store.persist_access_token(&access_token)?;
                info!(event = "token_refreshed");
                Ok(TokenContext {
                    access_token,
                    long_lived_token: context.long_lived_token.clone(),
                })
            }
            Err(refresh_err) => {
                warn!(event = "token_refresh_failed", error = %refresh_err);
                let long_lived_token = self
                    .exchange_token(&context.access_token)
                    .await
                    .map_err(|err| {
                        GraphError::Token(format!(
                            "refresh failed ({refresh_err}); regeneration failed: {err}"
                        ))
                    })?;
                store.persist_long_lived_token(&long_lived_token)?;
                let access_token =
                    self.exchange_token(&long_lived_token).await.map_err(|err| {
                        GraphError::Token(format!(
                            "refresh with regenerated long-lived token failed: {err}"
                        ))
                    })?;
                store.persist_access_token(&access_token)?;
                info!(event = "token_regenerated");
                Ok(TokenContext {
                    access_token,
                    long_lived_token,
                })
            }
        }
    }

    /// Minimal probe request. 2xx means live; 401, or 400 whose error
    /// message mentions expiry, means expired. Everything else is a
    /// transient upstream condition, not expiry: the token is assumed live
    /// and the real fetch will surface any actual failure.
    async fn probe_token(&self, access_token: &str) -> Result<Liveness, GraphError> {
        let url = self.account_url();
        let (status, body) = self
            .get_raw(&url, &[("fields", "id"), ("access_token", access_token)])
            .await?;

        if (200..300).contains(&status) {
            return Ok(Liveness::Valid);
        }
        if status == 401 {
            return Ok(Liveness::Expired);
        }
        if status == 400 && error_message(&body).to_lowercase().contains("expired") {
            return Ok(Liveness::Expired);
        }
        warn!(event = "token_probe_inconclusive", status);
        Ok(Liveness::Valid)
    }

    /// One token-exchange call; serves both refresh (from the long-lived
    /// token) and regeneration (from the current short-lived token).
    async fn exchange_token(&self, exchanged_token: &str) -> Result<String, GraphError> {
        let config = self.config();
        let response: OAuthTokenResponse = self
            .get_json(
                &config.oauth_url,
                &[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", config.app_id.as_str()),
                    ("client_secret", config.app_secret.as_str()),
                    ("fb_exchange_token", exchanged_token),
                ],
            )
            .await?;
        Ok(response.access_token)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}
