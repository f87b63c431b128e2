//! Per-credit cancellation sampling (spec §4.5 "Request cancellation"),
//! grounded on `timing/manager.py`'s `_maybe_cancel_request`: a fraction of
//! issued credits are marked to be cancelled by the worker a fixed delay
//! after being sent, independent of timing mode.

use rand::Rng;
use rand::rngs::StdRng;

/// Rolls whether this credit should be cancelled, and if so after how long.
/// `rate` is a probability in `[0, 1]`; `delay_secs` is the fixed delay
/// after send at which the worker should abort the in-flight request.
pub fn sample(rng: &mut StdRng, rate: f64, delay_secs: f64) -> (bool, Option<u64>) {
    if rate <= 0.0 {
        return (false, None);
    }
    if rng.random::<f64>() < rate {
        (true, Some((delay_secs.max(0.0) * 1e9) as u64))
    } else {
        (false, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn zero_rate_never_cancels() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(sample(&mut rng, 0.0, 1.0), (false, None));
        }
    }

    #[test]
    fn full_rate_always_cancels_with_delay_in_ns() {
        let mut rng = StdRng::seed_from_u64(2);
        let (should_cancel, after_ns) = sample(&mut rng, 1.0, 0.5);
        assert!(should_cancel);
        assert_eq!(after_ns, Some(500_000_000));
    }
}
