//! Wire shapes for Graph API responses and their extraction into domain
//! observations. Account-level insights carry `total_value`; per-post
//! insights carry a `values` array instead.

use chrono::{DateTime, NaiveDate};
use ig_core::{AudienceBucket, AudienceDimension, PostRecord};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountFieldsResponse {
    pub username: Option<String>,
    pub followers_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsightsResponse {
    #[serde(default)]
    pub data: Vec<InsightEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsightEntry {
    pub name: String,
    pub total_value: Option<TotalValue>,
    #[serde(default)]
    pub values: Vec<InsightValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TotalValue {
    pub value: Option<i64>,
    #[serde(default)]
    pub breakdowns: Vec<Breakdown>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsightValue {
    pub value: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Breakdown {
    #[serde(default)]
    pub results: Vec<BreakdownResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BreakdownResult {
    #[serde(default)]
    pub dimension_values: Vec<String>,
    pub value: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MediaListResponse {
    #[serde(default)]
    pub data: Vec<MediaItem>,
    pub paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Paging {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MediaItem {
    pub id: String,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LikeCountResponse {
    pub like_count: Option<i64>,
}

impl InsightsResponse {
    /// Value of a `total_value` metric, 0 when the provider omitted it.
    pub(crate) fn total_value(&self, metric: &str) -> i64 {
        self.data
            .iter()
            .find(|entry| entry.name == metric)
            .and_then(|entry| entry.total_value.as_ref())
            .and_then(|total| total.value)
            .unwrap_or(0)
    }

    /// Value of a `values`-array metric (per-post insights), 0 when absent.
    pub(crate) fn series_value(&self, metric: &str) -> i64 {
        self.data
            .iter()
            .find(|entry| entry.name == metric)
            .and_then(|entry| entry.values.first())
            .and_then(|value| value.value)
            .unwrap_or(0)
    }

    /// Flatten an `engaged_audience_demographics` breakdown into buckets.
    /// Results without a dimension value are skipped, mirroring the
    /// provider's occasional empty rows.
    pub(crate) fn audience_buckets(&self, dimension: AudienceDimension) -> Vec<AudienceBucket> {
        let mut buckets = Vec::new();
        for entry in &self.data {
            if entry.name != "engaged_audience_demographics" {
                continue;
            }
            let Some(total) = entry.total_value.as_ref() else {
                continue;
            };
            for breakdown in &total.breakdowns {
                for result in &breakdown.results {
                    let Some(value) = result.dimension_values.first() else {
                        continue;
                    };
                    buckets.push(AudienceBucket {
                        dimension,
                        value: value.clone(),
                        count: result.value.unwrap_or(0),
                    });
                }
            }
        }
        buckets
    }
}

impl MediaItem {
    pub(crate) fn into_record(self) -> PostRecord {
        let created_date = self.timestamp.as_deref().and_then(parse_media_timestamp);
        if self.media_url.is_none() {
            warn!(event = "post_missing_media_url", post_id = %self.id);
        }
        PostRecord {
            post_id: self.id,
            media_type: self.media_type.unwrap_or_default(),
            media_url: self.media_url,
            created_date,
        }
    }
}

/// Media timestamps arrive as `2026-02-23T14:00:00+0000`.
fn parse_media_timestamp(raw: &str) -> Option<NaiveDate> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|timestamp| timestamp.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn total_value_metrics_extract_with_zero_default() {
        let response: InsightsResponse = serde_json::from_value(json!({
            "data": [
                {"name": "reach", "total_value": {"value": 1200}},
                {"name": "accounts_engaged", "total_value": {}},
            ]
        }))
        .expect("decode");

        assert_eq!(response.total_value("reach"), 1200);
        assert_eq!(response.total_value("accounts_engaged"), 0);
        assert_eq!(response.total_value("website_clicks"), 0);
    }

    #[test]
    fn series_metrics_take_the_first_value() {
        let response: InsightsResponse = serde_json::from_value(json!({
            "data": [
                {"name": "reach", "values": [{"value": 90}, {"value": 80}]},
                {"name": "saved", "values": []},
            ]
        }))
        .expect("decode");

        assert_eq!(response.series_value("reach"), 90);
        assert_eq!(response.series_value("saved"), 0);
    }

    #[test]
    fn audience_buckets_flatten_and_skip_empty_dimension_values() {
        let response: InsightsResponse = serde_json::from_value(json!({
            "data": [{
                "name": "engaged_audience_demographics",
                "total_value": {
                    "breakdowns": [{
                        "results": [
                            {"dimension_values": ["25-34"], "value": 410},
                            {"dimension_values": [], "value": 7},
                            {"dimension_values": ["35-44"], "value": 180},
                        ]
                    }]
                }
            }]
        }))
        .expect("decode");

        let buckets = response.audience_buckets(AudienceDimension::Age);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].value, "25-34");
        assert_eq!(buckets[0].count, 410);
        assert_eq!(buckets[1].value, "35-44");
    }

    #[test]
    fn media_item_parses_provider_timestamp() {
        let item = MediaItem {
            id: "1789".to_string(),
            media_type: Some("IMAGE".to_string()),
            media_url: Some("https://cdn.example/x.jpg".to_string()),
            timestamp: Some("2026-02-23T14:00:00+0000".to_string()),
        };
        let record = item.into_record();
        assert_eq!(
            record.created_date,
            Some("2026-02-23".parse().expect("date"))
        );
    }

    #[test]
    fn media_item_tolerates_missing_fields() {
        let item: MediaItem = serde_json::from_value(json!({"id": "42"})).expect("decode");
        let record = item.into_record();
        assert_eq!(record.post_id, "42");
        assert_eq!(record.media_type, "");
        assert!(record.media_url.is_none());
        assert!(record.created_date.is_none());
    }
}
