pub mod delta;
pub mod insights;

pub use delta::{reconcile, Delta};
pub use insights::{
    AccountDelta, AccountObservation, AudienceBucket, AudienceDimension, PostMetricsDelta,
    PostMetricsObservation, PostRecord,
};
