//! Meta Graph API client: token lifecycle, paginated media listing, and
//! bounded-concurrency insight fetches.

mod client;
mod fetch;
mod payload;
mod token;

pub use client::{GraphClient, GraphConfig};
pub use fetch::{MAX_PAGES, PAGE_LIMIT};
pub use token::{TokenContext, TokenStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    /// HTTP client construction failed (TLS or proxy misconfiguration).
    #[error("failed to initialize Graph client: {0}")]
    Init(String),

    /// Both the token refresh and the regeneration fallback failed. Fatal
    /// for the whole run; callers must not continue with a stale token.
    #[error("token refresh chain exhausted: {0}")]
    Token(String),

    /// Connection-level failure that survived the bounded retry loop.
    #[error("transport error after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx from the provider. Never retried.
    #[error("upstream returned {status}: {detail}")]
    Upstream { status: u16, detail: String },

    /// The provider answered 2xx with a payload we cannot decode.
    #[error("malformed provider payload: {0}")]
    Malformed(String),

    /// The durable token store rejected a refreshed token.
    #[error("token persistence failed: {0}")]
    Persist(String),
}
