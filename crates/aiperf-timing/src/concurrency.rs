//! Concurrency-mode credit scheduling (spec §4.5 "Concurrency mode"),
//! grounded on `timing/strategies/concurrency.py`'s semaphore-backed
//! in-flight tracking, reworked as pure target-level arithmetic the service
//! loop drives against `CREDIT_RETURN` arrivals.

/// The in-flight target at `elapsed_secs` into the run: linearly ramps from
/// 1 to `concurrency` over `ramp_up_secs` when set, else holds steady at
/// `concurrency` from t0.
pub fn target_level(concurrency: usize, ramp_up_secs: Option<f64>, elapsed_secs: f64) -> usize {
    let Some(ramp) = ramp_up_secs.filter(|r| *r > 0.0) else {
        return concurrency.max(1);
    };
    if concurrency <= 1 {
        return concurrency.max(1);
    }
    let frac = (elapsed_secs / ramp).clamp(0.0, 1.0);
    let level = 1.0 + frac * (concurrency as f64 - 1.0);
    (level.round() as usize).clamp(1, concurrency)
}

/// How many additional credits to drop right now given the current
/// in-flight count, the ramp's target level, and how many of the run's
/// `total_required` credits have been dropped so far.
pub fn credits_due(in_flight: usize, target: usize, dropped: usize, total_required: usize) -> usize {
    if dropped >= total_required {
        return 0;
    }
    let headroom = target.saturating_sub(in_flight);
    headroom.min(total_required - dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ramp_holds_steady_at_concurrency() {
        assert_eq!(target_level(8, None, 0.0), 8);
        assert_eq!(target_level(8, None, 100.0), 8);
    }

    #[test]
    fn ramp_starts_at_one_and_reaches_target_at_ramp_end() {
        assert_eq!(target_level(9, Some(10.0), 0.0), 1);
        assert_eq!(target_level(9, Some(10.0), 10.0), 9);
        assert_eq!(target_level(9, Some(10.0), 20.0), 9);
    }

    #[test]
    fn ramp_midpoint_is_between_one_and_target() {
        let level = target_level(9, Some(10.0), 5.0);
        assert!(level > 1 && level < 9);
    }

    #[test]
    fn credits_due_never_exceeds_remaining_requirement() {
        assert_eq!(credits_due(0, 4, 8, 10), 2);
        assert_eq!(credits_due(0, 4, 10, 10), 0);
    }

    #[test]
    fn credits_due_is_zero_when_already_at_target() {
        assert_eq!(credits_due(4, 4, 2, 10), 0);
    }
}
