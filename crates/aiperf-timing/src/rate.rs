//! Request-rate credit scheduling (spec §4.5 "Request-rate mode"), grounded
//! on `timing/strategies/request_rate.py`'s Poisson/constant inter-arrival
//! generators.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};

use aiperf_core::config::RequestRateMode;

/// Draws `count` inter-arrival offsets (seconds from t0) for `mode` at the
/// given `rate` (requests/sec). Poisson draws iid `Exp(rate)` gaps;
/// constant spaces requests evenly at `1/rate`.
pub fn schedule_offsets(mode: RequestRateMode, rate: f64, count: usize, rng: &mut StdRng) -> Vec<f64> {
    match mode {
        RequestRateMode::Constant => constant_offsets(rate, count),
        RequestRateMode::Poisson => poisson_offsets(rate, count, rng),
    }
}

fn constant_offsets(rate: f64, count: usize) -> Vec<f64> {
    let period = 1.0 / rate;
    (0..count).map(|i| i as f64 * period).collect()
}

fn poisson_offsets(rate: f64, count: usize, rng: &mut StdRng) -> Vec<f64> {
    let exp = Exp::new(rate).expect("positive rate validated upstream");
    let mut t = 0.0;
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        t += exp.sample(rng);
        offsets.push(t);
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn constant_offsets_are_evenly_spaced() {
        let offsets = constant_offsets(2.0, 4);
        assert_eq!(offsets, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn poisson_offsets_are_monotonically_increasing() {
        let mut rng = StdRng::seed_from_u64(7);
        let offsets = poisson_offsets(10.0, 50, &mut rng);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn poisson_mean_inter_arrival_tracks_expected_rate() {
        let mut rng = StdRng::seed_from_u64(11);
        let offsets = poisson_offsets(5.0, 2000, &mut rng);
        let mean_gap = offsets.last().unwrap() / offsets.len() as f64;
        assert!((mean_gap - 0.2).abs() < 0.02, "mean gap {mean_gap} should be near 0.2s");
    }

    #[test]
    fn same_seed_reproduces_same_offsets() {
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        assert_eq!(poisson_offsets(3.0, 20, &mut rng_a), poisson_offsets(3.0, 20, &mut rng_b));
    }
}
