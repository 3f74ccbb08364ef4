//! Domain contracts shared between the Graph client, the store, and the
//! service endpoints.

use crate::delta::Delta;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Point-in-time cumulative account metrics as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountObservation {
    pub username: String,
    pub followers: i64,
    pub reach: i64,
    pub accounts_engaged: i64,
    pub website_clicks: i64,
}

/// Per-metric increments applied to today's account snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountDelta {
    pub followers: Delta,
    pub reach: Delta,
    pub accounts_engaged: Delta,
    pub website_clicks: Delta,
}

impl AccountDelta {
    pub fn regressed(&self) -> bool {
        self.followers.regressed
            || self.reach.regressed
            || self.accounts_engaged.regressed
            || self.website_clicks.regressed
    }
}

/// Breakdown axis for engaged-audience demographics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceDimension {
    Age,
    Gender,
    City,
}

impl AudienceDimension {
    pub const ALL: [AudienceDimension; 3] = [
        AudienceDimension::Age,
        AudienceDimension::Gender,
        AudienceDimension::City,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudienceDimension::Age => "age",
            AudienceDimension::Gender => "gender",
            AudienceDimension::City => "city",
        }
    }
}

impl fmt::Display for AudienceDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudienceDimension {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "age" => Ok(AudienceDimension::Age),
            "gender" => Ok(AudienceDimension::Gender),
            "city" => Ok(AudienceDimension::City),
            other => Err(format!("Unknown audience dimension: {other}")),
        }
    }
}

/// One observed demographic bucket, e.g. (age, "25-34", 412).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceBucket {
    pub dimension: AudienceDimension,
    pub value: String,
    pub count: i64,
}

/// A media post as listed by the provider. `post_id` is the provider's
/// stable identifier; a post is created once and never re-incremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_id: String,
    pub media_type: String,
    pub media_url: Option<String>,
    pub created_date: Option<NaiveDate>,
}

/// Cumulative per-post engagement counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetricsObservation {
    pub reach: i64,
    pub likes: i64,
    pub saves: i64,
}

/// Increments applied to a post's snapshot for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostMetricsDelta {
    pub reach: Delta,
    pub likes: Delta,
    pub saves: Delta,
}

impl PostMetricsDelta {
    pub fn regressed(&self) -> bool {
        self.reach.regressed || self.likes.regressed || self.saves.regressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_round_trips_through_str() {
        for dimension in AudienceDimension::ALL {
            let parsed: AudienceDimension = dimension.as_str().parse().expect("parse");
            assert_eq!(parsed, dimension);
        }
        assert!("country".parse::<AudienceDimension>().is_err());
    }
}
