//! Fetch operations against the Graph API: account summary, audience
//! demographics, paginated media listing, and the bounded per-post metric
//! fan-out.

use crate::client::GraphClient;
use crate::payload::{
    AccountFieldsResponse, InsightsResponse, LikeCountResponse, MediaListResponse,
};
use crate::GraphError;
use futures_util::future::try_join_all;
use ig_core::{AccountObservation, AudienceBucket, AudienceDimension, PostMetricsObservation, PostRecord};
use tracing::{debug, info};

/// Page size requested from the media listing.
pub const PAGE_LIMIT: usize = 100;
/// Hard cap on pages followed. A provider that keeps returning a `next`
/// cursor terminates here instead of looping forever.
pub const MAX_PAGES: usize = 100;

impl GraphClient {
    /// Account fields plus the day-level insight metrics, combined into one
    /// cumulative observation.
    pub async fn fetch_account_summary(
        &self,
        access_token: &str,
    ) -> Result<AccountObservation, GraphError> {
        let account: AccountFieldsResponse = self
            .get_json(
                &self.account_url(),
                &[
                    ("fields", "id,username,followers_count"),
                    ("access_token", access_token),
                ],
            )
            .await?;

        let insights_url = format!("{}/insights", self.account_url());
        let insights: InsightsResponse = self
            .get_json(
                &insights_url,
                &[
                    ("metric", "reach,accounts_engaged,website_clicks"),
                    ("period", "day"),
                    ("metric_type", "total_value"),
                    ("access_token", access_token),
                ],
            )
            .await?;

        Ok(AccountObservation {
            username: account.username.unwrap_or_default(),
            followers: account.followers_count.unwrap_or(0),
            reach: insights.total_value("reach"),
            accounts_engaged: insights.total_value("accounts_engaged"),
            website_clicks: insights.total_value("website_clicks"),
        })
    }

    /// Engaged-audience demographics for all three breakdown dimensions,
    /// one request per dimension.
    pub async fn fetch_demographics(
        &self,
        access_token: &str,
    ) -> Result<Vec<AudienceBucket>, GraphError> {
        let insights_url = format!("{}/insights", self.account_url());
        let mut buckets = Vec::new();
        for dimension in AudienceDimension::ALL {
            let response: InsightsResponse = self
                .get_json(
                    &insights_url,
                    &[
                        ("metric", "engaged_audience_demographics"),
                        ("period", "lifetime"),
                        ("timeframe", "this_week"),
                        ("metric_type", "total_value"),
                        ("breakdown", dimension.as_str()),
                        ("access_token", access_token),
                    ],
                )
                .await?;
            buckets.extend(response.audience_buckets(dimension));
        }
        Ok(buckets)
    }

    /// Full media listing, following the provider's `next` cursor until it
    /// is exhausted or the `MAX_PAGES * PAGE_LIMIT` item cap is reached.
    pub async fn fetch_all_posts(
        &self,
        access_token: &str,
    ) -> Result<Vec<PostRecord>, GraphError> {
        let limit = PAGE_LIMIT.to_string();
        let first_url = format!("{}/media", self.account_url());
        let mut page: MediaListResponse = self
            .get_json(
                &first_url,
                &[
                    ("fields", "id,media_type,media_url,timestamp"),
                    ("limit", limit.as_str()),
                    ("access_token", access_token),
                ],
            )
            .await?;

        let cap = MAX_PAGES * PAGE_LIMIT;
        let mut records = Vec::new();
        loop {
            records.extend(page.data.into_iter().map(|item| item.into_record()));
            let next = match page.paging.and_then(|paging| paging.next) {
                Some(next) if records.len() < cap => next,
                Some(_) => {
                    info!(event = "media_page_cap_reached", posts = records.len());
                    break;
                }
                None => break,
            };
            debug!(event = "media_page_next", posts = records.len());
            // The cursor URL already carries the fields, limit and token.
            page = self.get_json(&next, &[]).await?;
        }
        Ok(records)
    }

    /// Cumulative engagement counters for one post: the `like_count` field
    /// plus `reach` and `saved` insights.
    pub async fn fetch_post_metrics(
        &self,
        access_token: &str,
        post_id: &str,
    ) -> Result<PostMetricsObservation, GraphError> {
        let likes: LikeCountResponse = self
            .get_json(
                &self.object_url(post_id),
                &[("fields", "like_count"), ("access_token", access_token)],
            )
            .await?;

        let insights_url = format!("{}/insights", self.object_url(post_id));
        let insights: InsightsResponse = self
            .get_json(
                &insights_url,
                &[("metric", "reach,saved"), ("access_token", access_token)],
            )
            .await?;

        Ok(PostMetricsObservation {
            reach: insights.series_value("reach"),
            likes: likes.like_count.unwrap_or(0),
            saves: insights.series_value("saved"),
        })
    }

    /// Metrics for every listed post, fanned out behind the admission gate.
    /// The result is index-aligned with `posts`. The first failed post
    /// (after its own retries) fails the whole batch; nothing succeeds
    /// silently in part.
    pub async fn fetch_post_metrics_batch(
        &self,
        access_token: &str,
        posts: &[PostRecord],
    ) -> Result<Vec<PostMetricsObservation>, GraphError> {
        let gate = self.gate();
        let fetches = posts.iter().map(|post| {
            let gate = gate.clone();
            async move {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|err| GraphError::Init(err.to_string()))?;
                self.fetch_post_metrics(access_token, &post.post_id).await
            }
        });
        let metrics = try_join_all(fetches).await?;
        info!(event = "post_metrics_fetched", posts = metrics.len());
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphConfig;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> GraphClient {
        GraphClient::new(GraphConfig {
            base_url: server.url("/v21.0"),
            oauth_url: server.url("/v21.0/oauth/access_token"),
            account_id: "acct".to_string(),
            app_id: "app".to_string(),
            app_secret: "secret".to_string(),
            max_retries: 0,
            retry_base_delay_ms: 0,
            gate_permits: 4,
            ..GraphConfig::default()
        })
        .expect("client")
    }

    #[tokio::test]
    async fn account_summary_combines_fields_and_insights() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v21.0/acct");
                then.status(200).json_body(json!({
                    "id": "acct",
                    "username": "blt",
                    "followers_count": 5100,
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v21.0/acct/insights");
                then.status(200).json_body(json!({
                    "data": [
                        {"name": "reach", "total_value": {"value": 900}},
                        {"name": "accounts_engaged", "total_value": {"value": 120}},
                    ]
                }));
            })
            .await;

        let observed = client(&server)
            .fetch_account_summary("tok")
            .await
            .expect("summary");
        assert_eq!(observed.username, "blt");
        assert_eq!(observed.followers, 5100);
        assert_eq!(observed.reach, 900);
        assert_eq!(observed.accounts_engaged, 120);
        assert_eq!(observed.website_clicks, 0);
    }

    #[tokio::test]
    async fn demographics_issue_one_request_per_dimension() {
        let server = MockServer::start_async().await;
        for (dimension, value, count) in [
            ("age", "25-34", 410),
            ("gender", "F", 600),
            ("city", "Berlin", 90),
        ] {
            server
                .mock_async(move |when, then| {
                    when.method(GET)
                        .path("/v21.0/acct/insights")
                        .query_param("breakdown", dimension);
                    then.status(200).json_body(json!({
                        "data": [{
                            "name": "engaged_audience_demographics",
                            "total_value": {"breakdowns": [{"results": [
                                {"dimension_values": [value], "value": count}
                            ]}]}
                        }]
                    }));
                })
                .await;
        }

        let buckets = client(&server)
            .fetch_demographics("tok")
            .await
            .expect("demographics");
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].dimension, AudienceDimension::Age);
        assert_eq!(buckets[1].value, "F");
        assert_eq!(buckets[2].count, 90);
    }

    #[tokio::test]
    async fn pagination_follows_next_until_exhausted() {
        let server = MockServer::start_async().await;
        let second_page = server.url("/v21.0/acct/media?after=p2");
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/v21.0/acct/media")
                    .query_param("after", "p2");
                then.status(200).json_body(json!({
                    "data": [{"id": "post-2", "media_type": "IMAGE"}],
                }));
            })
            .await;
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/v21.0/acct/media")
                    .query_param("limit", "100");
                then.status(200).json_body(json!({
                    "data": [{"id": "post-1", "media_type": "IMAGE"}],
                    "paging": {"next": second_page},
                }));
            })
            .await;

        let posts = client(&server).fetch_all_posts("tok").await.expect("posts");
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].post_id, "post-1");
        assert_eq!(posts[1].post_id, "post-2");
    }

    #[tokio::test]
    async fn pagination_terminates_on_an_unending_cursor() {
        let server = MockServer::start_async().await;
        let items: Vec<_> = (0..PAGE_LIMIT)
            .map(|index| json!({"id": format!("post-{index}"), "media_type": "IMAGE"}))
            .collect();
        let looping_next = server.url("/v21.0/acct/media?after=again");
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/v21.0/acct/media");
                then.status(200).json_body(json!({
                    "data": items,
                    "paging": {"next": looping_next},
                }));
            })
            .await;

        let posts = client(&server).fetch_all_posts("tok").await.expect("posts");
        assert_eq!(posts.len(), MAX_PAGES * PAGE_LIMIT);
    }

    #[tokio::test]
    async fn post_metric_batch_preserves_order() {
        let server = MockServer::start_async().await;
        for (post_id, likes, reach) in [("a", 10, 100), ("b", 20, 200), ("c", 30, 300)] {
            server
                .mock_async(move |when, then| {
                    when.method(GET).path(format!("/v21.0/{post_id}"));
                    then.status(200).json_body(json!({"like_count": likes}));
                })
                .await;
            server
                .mock_async(move |when, then| {
                    when.method(GET).path(format!("/v21.0/{post_id}/insights"));
                    then.status(200).json_body(json!({
                        "data": [
                            {"name": "reach", "values": [{"value": reach}]},
                            {"name": "saved", "values": [{"value": 1}]},
                        ]
                    }));
                })
                .await;
        }

        let posts: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|post_id| PostRecord {
                post_id: post_id.to_string(),
                media_type: "IMAGE".to_string(),
                media_url: None,
                created_date: None,
            })
            .collect();

        let metrics = client(&server)
            .fetch_post_metrics_batch("tok", &posts)
            .await
            .expect("metrics");
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0].likes, 10);
        assert_eq!(metrics[1].reach, 200);
        assert_eq!(metrics[2].likes, 30);
        assert_eq!(metrics[2].saves, 1);
    }

    #[tokio::test]
    async fn failed_post_fails_the_batch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v21.0/broken");
                then.status(500).body("{\"error\":{\"message\":\"boom\"}}");
            })
            .await;

        let posts = vec![PostRecord {
            post_id: "broken".to_string(),
            media_type: "IMAGE".to_string(),
            media_url: None,
            created_date: None,
        }];
        let err = client(&server)
            .fetch_post_metrics_batch("tok", &posts)
            .await
            .expect_err("batch failure");
        assert!(matches!(err, GraphError::Upstream { status: 500, .. }));
    }
}
