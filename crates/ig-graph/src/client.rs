use crate::GraphError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// How many bytes of an upstream error body to carry into the error chain.
const ERROR_DETAIL_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Graph API base, e.g. `https://graph.facebook.com/v21.0`.
    pub base_url: String,
    /// OAuth token-exchange endpoint.
    pub oauth_url: String,
    /// Instagram business account id.
    pub account_id: String,
    /// App credentials used for token exchange.
    pub app_id: String,
    pub app_secret: String,
    /// Per-request timeout. Remote insight queries can be slow.
    pub timeout_secs: u64,
    /// Admission gate size for the per-post metric fan-out.
    pub gate_permits: usize,
    /// Retries after the first attempt, connection-level failures only.
    pub max_retries: u32,
    /// Backoff grows linearly: `base_delay * attempt`.
    pub retry_base_delay_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.facebook.com/v21.0".to_string(),
            oauth_url: "https://graph.facebook.com/v21.0/oauth/access_token".to_string(),
            account_id: String::new(),
            app_id: String::new(),
            app_secret: String::new(),
            timeout_secs: 120,
            gate_permits: 50,
            max_retries: 3,
            retry_base_delay_ms: 2000,
        }
    }
}

/// Client for one account. Holds the single pooled HTTP connection resource
/// for the process; cloning shares the pool and the admission gate.
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    config: Arc<GraphConfig>,
    gate: Arc<Semaphore>,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .user_agent("ig-insights/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| GraphError::Init(err.to_string()))?;
        let gate = Arc::new(Semaphore::new(config.gate_permits));
        Ok(Self {
            http,
            config: Arc::new(config),
            gate,
        })
    }

    pub(crate) fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub(crate) fn gate(&self) -> Arc<Semaphore> {
        self.gate.clone()
    }

    pub(crate) fn account_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_id
        )
    }

    pub(crate) fn object_url(&self, object_id: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            object_id
        )
    }

    /// GET with the bounded retry loop. Only connection-level failures
    /// (connect, timeout) are retried; the backoff is `base_delay * attempt`.
    /// Returns the status and raw body so callers can classify non-2xx
    /// responses themselves.
    pub(crate) async fn get_raw(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<(u16, String), GraphError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.http.get(url).query(query).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.map_err(|err| {
                        GraphError::Transport {
                            attempts: attempt,
                            source: err,
                        }
                    })?;
                    return Ok((status, body));
                }
                Err(err) if is_transient(&err) && attempt <= self.config.max_retries => {
                    let delay = Duration::from_millis(
                        self.config.retry_base_delay_ms * u64::from(attempt),
                    );
                    debug!(
                        event = "fetch_retry",
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(GraphError::Transport {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// GET returning a decoded 2xx payload. Non-2xx becomes `Upstream`,
    /// undecodable bodies become `Malformed`; neither is retried.
    pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GraphError> {
        let (status, body) = self.get_raw(url, query).await?;
        if !(200..300).contains(&status) {
            return Err(GraphError::Upstream {
                status,
                detail: truncate_detail(&body),
            });
        }
        serde_json::from_str(&body).map_err(|err| GraphError::Malformed(err.to_string()))
    }
}

pub(crate) fn truncate_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_DETAIL_LIMIT {
        return trimmed.to_string();
    }
    let mut cut = ERROR_DETAIL_LIMIT;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &trimmed[..cut])
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}
