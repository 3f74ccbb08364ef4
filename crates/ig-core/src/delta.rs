//! Cumulative-to-daily delta reconciliation.
//!
//! The Graph API reports lifetime cumulative counters (total reach ever, total
//! likes ever). To build a daily time series we infer "how much changed since
//! we last looked": the only durable signal is the sum of every increment
//! recorded so far, so the next increment is the observed cumulative value
//! minus that sum. Repeated calls within one day accumulate further deltas
//! onto today's record, against a baseline that already includes it.

/// Result of reconciling one observation for one dimension key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    /// Change since the last observation. May be negative when the provider
    /// counter regressed.
    pub increment: i64,
    /// Value today's record must hold after applying the increment.
    pub today_value: i64,
    /// The observed cumulative value dropped below the stored baseline.
    /// Usually means a non-monotonic upstream metric; callers should log it.
    pub regressed: bool,
}

/// Compute the increment for an observed cumulative value.
///
/// `baseline` is the sum of all previously stored increments for this
/// dimension key, across all days, including today's existing record.
/// `existing_today` is the value of today's record if one exists.
///
/// A regression (observed below baseline) is preserved as a negative
/// increment. Clamping it to zero would permanently overstate the running
/// total, so the stored series could never converge on the provider again.
pub fn reconcile(observed: i64, baseline: i64, existing_today: Option<i64>) -> Delta {
    let increment = observed - baseline;
    let today_value = match existing_today {
        Some(current) => current + increment,
        None => increment,
    };
    Delta {
        increment,
        today_value,
        regressed: increment < 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a sequence of observations through the store-shaped loop:
    /// the baseline grows by each applied increment.
    fn replay(observations: &[i64]) -> (i64, i64) {
        let mut baseline = 0_i64;
        let mut today = None;
        for &observed in observations {
            let delta = reconcile(observed, baseline, today);
            baseline += delta.increment;
            today = Some(delta.today_value);
        }
        (baseline, today.unwrap_or(0))
    }

    #[test]
    fn first_observation_becomes_the_increment() {
        let delta = reconcile(130, 0, None);
        assert_eq!(delta.increment, 130);
        assert_eq!(delta.today_value, 130);
        assert!(!delta.regressed);
    }

    #[test]
    fn worked_example_from_two_same_day_calls() {
        // baseline 100 from prior days, observed 130 -> today stores 30.
        let first = reconcile(130, 100, None);
        assert_eq!(first.increment, 30);
        assert_eq!(first.today_value, 30);

        // Second call same day: baseline now includes today's 30.
        let second = reconcile(150, 100 + first.increment, Some(first.today_value));
        assert_eq!(second.increment, 20);
        assert_eq!(second.today_value, 50);
    }

    #[test]
    fn non_decreasing_observations_sum_to_latest() {
        let (baseline, _) = replay(&[10, 25, 25, 40, 100]);
        assert_eq!(baseline, 100);
    }

    #[test]
    fn repeated_observation_is_idempotent() {
        let first = reconcile(42, 0, None);
        let second = reconcile(42, first.increment, Some(first.today_value));
        assert_eq!(second.increment, 0);
        assert_eq!(second.today_value, first.today_value);
    }

    #[test]
    fn provider_reset_yields_negative_increment() {
        let delta = reconcile(70, 100, Some(10));
        assert_eq!(delta.increment, -30);
        assert_eq!(delta.today_value, -20);
        assert!(delta.regressed);

        // The running total still converges on the provider's view.
        let (baseline, _) = replay(&[100, 70, 90]);
        assert_eq!(baseline, 90);
    }
}
