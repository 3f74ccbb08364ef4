//! Collection runs: one per endpoint, each a fetch-reconcile-persist pass.
//!
//! Every run starts by validating the token pair, so downstream fetches never
//! execute with a token that failed both refresh levels. The store is behind
//! an async mutex; a run holds it only for the persistence phase.

use crate::api::ApiError;
use crate::config::ConfigStore;
use chrono::Utc;
use ig_core::{AccountObservation, AudienceDimension};
use ig_graph::{GraphClient, TokenContext};
use ig_storage::InsightsStore;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct AppState {
    pub graph: GraphClient,
    pub store: Mutex<InsightsStore>,
    pub config: ConfigStore,
}

async fn valid_token(state: &AppState) -> Result<TokenContext, ApiError> {
    let context = state.config.token_context();
    let refreshed = state
        .graph
        .ensure_valid_token(&context, &state.config)
        .await?;
    Ok(refreshed)
}

/// Fetch the cumulative account metrics, reconcile them into today's
/// snapshot row, and return the observation as reported by the provider.
pub async fn collect_account_insights(
    state: &AppState,
) -> Result<AccountObservation, ApiError> {
    let token = valid_token(state).await?;
    let observed = state
        .graph
        .fetch_account_summary(&token.access_token)
        .await?;

    let day = Utc::now().date_naive();
    let mut store = state.store.lock().await;
    let delta = store.apply_account_metrics(day, &observed)?;
    if delta.regressed() {
        warn!(event = "cumulative_regression", scope = "account", day = %day);
    }
    info!(
        event = "account_reconciled",
        day = %day,
        followers = delta.followers.increment,
        reach = delta.reach.increment,
        accounts_engaged = delta.accounts_engaged.increment,
        website_clicks = delta.website_clicks.increment,
    );
    Ok(observed)
}

#[derive(Debug, Serialize)]
pub struct BucketCount {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct DemographicsReport {
    pub age_group: Vec<BucketCount>,
    pub gender_distribution: Vec<BucketCount>,
    pub city_distribution: Vec<BucketCount>,
}

/// Fetch engaged-audience demographics and reconcile each bucket against
/// today's account snapshot. Requires that snapshot to exist already; the
/// insights run creates it.
pub async fn collect_demographics(state: &AppState) -> Result<DemographicsReport, ApiError> {
    let token = valid_token(state).await?;
    let buckets = state.graph.fetch_demographics(&token.access_token).await?;
    let bucket_total = buckets.len();

    let day = Utc::now().date_naive();
    let mut store = state.store.lock().await;
    let snapshot = store
        .account_snapshot_for_day(day)?
        .ok_or(ApiError::MissingSnapshot)?;

    let mut report = DemographicsReport::default();
    for bucket in buckets {
        let delta = store.apply_audience_count(
            snapshot.id,
            bucket.dimension,
            &bucket.value,
            day,
            bucket.count,
        )?;
        if delta.regressed {
            warn!(
                event = "cumulative_regression",
                scope = "audience",
                dimension = %bucket.dimension,
                value = %bucket.value,
                day = %day,
            );
        }
        let entry = BucketCount {
            value: bucket.value,
            count: bucket.count,
        };
        match bucket.dimension {
            AudienceDimension::Age => report.age_group.push(entry),
            AudienceDimension::Gender => report.gender_distribution.push(entry),
            AudienceDimension::City => report.city_distribution.push(entry),
        }
    }
    info!(event = "demographics_reconciled", day = %day, buckets = bucket_total);
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostsOutcome {
    Empty,
    Collected { posts: usize },
}

/// List every post, fan out the per-post metric fetches, then reconcile each
/// post's counters into its snapshot for today. An account with no media is
/// a normal outcome, not an error.
pub async fn collect_posts(state: &AppState) -> Result<PostsOutcome, ApiError> {
    let token = valid_token(state).await?;
    let posts = state.graph.fetch_all_posts(&token.access_token).await?;
    if posts.is_empty() {
        info!(event = "posts_empty");
        return Ok(PostsOutcome::Empty);
    }
    let metrics = state
        .graph
        .fetch_post_metrics_batch(&token.access_token, &posts)
        .await?;

    let day = Utc::now().date_naive();
    let mut store = state.store.lock().await;
    for (post, observed) in posts.iter().zip(metrics.iter()) {
        let post_ref = store.find_or_create_post(post)?;
        let delta = store.apply_post_metrics(post_ref, day, observed)?;
        if delta.regressed() {
            warn!(
                event = "cumulative_regression",
                scope = "post",
                post_id = %post.post_id,
                day = %day,
            );
        }
    }
    info!(event = "posts_reconciled", day = %day, posts = posts.len());
    Ok(PostsOutcome::Collected { posts: posts.len() })
}
