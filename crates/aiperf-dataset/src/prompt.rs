//! Synthetic text/prefix-prompt generation (spec §4.2), grounded on
//! `dataset/composer/synthetic.py`'s `_generate_text_payloads` and
//! `dataset/utils.py`'s `sample_positive_normal_integer`.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use aiperf_core::config::{PrefixPromptConfig, SyntheticTokensConfig};

/// A small fixed corpus used to synthesize prompts of a target token count.
/// The original draws from a real tokenizer's vocabulary; this stands in
/// with plain words since no tokenizer crate is part of this stack, and one
/// "word" is treated as one token for sizing purposes.
const WORD_POOL: &[&str] = &[
    "system", "signal", "vector", "cluster", "latency", "gateway", "protocol", "runtime",
    "buffer", "channel", "kernel", "matrix", "packet", "stream", "thread", "context", "payload",
    "socket", "endpoint", "cache", "token", "model", "tensor", "weight", "batch", "epoch",
    "gradient", "layer", "attention", "encoder", "decoder",
];

/// Draws a token count from `Normal(mean, stddev)`, floored at 1 (the
/// original's `sample_positive_normal_integer`: a non-positive draw would
/// produce a degenerate empty turn/prompt).
pub fn sample_positive_normal_integer(rng: &mut StdRng, mean: f64, stddev: f64) -> u32 {
    if stddev <= 0.0 {
        return mean.round().max(1.0) as u32;
    }
    let normal = Normal::new(mean, stddev).expect("valid normal params");
    let sample = normal.sample(rng);
    sample.round().max(1.0) as u32
}

pub struct PromptGenerator {
    tokens: SyntheticTokensConfig,
    prefix_pool: Vec<String>,
}

impl PromptGenerator {
    pub fn new(tokens: SyntheticTokensConfig, prefix: &PrefixPromptConfig, rng: &mut StdRng) -> Self {
        let prefix_pool = (0..prefix.pool_size)
            .map(|_| Self::random_words(rng, prefix.length))
            .collect();
        Self { tokens, prefix_pool }
    }

    fn random_words(rng: &mut StdRng, count: usize) -> String {
        (0..count)
            .map(|_| WORD_POOL[rng.random_range(0..WORD_POOL.len())])
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Generates a prompt body of approximately `synthetic_tokens` words.
    pub fn generate(&self, rng: &mut StdRng) -> String {
        let count = sample_positive_normal_integer(rng, self.tokens.mean, self.tokens.stddev);
        Self::random_words(rng, count as usize)
    }

    pub fn random_prefix_prompt(&self, rng: &mut StdRng) -> Option<String> {
        if self.prefix_pool.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.prefix_pool.len());
        Some(self.prefix_pool[idx].clone())
    }

    /// The full prefix-prompt pool, for custom-dataset `hash_ids` indexing
    /// (spec §4.4 supplemental detail: deterministic selection, not resampling).
    pub fn prefix_pool(&self) -> &[String] {
        &self.prefix_pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn zero_stddev_is_deterministic_and_rounds() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_positive_normal_integer(&mut rng, 10.0, 0.0), 10);
    }

    #[test]
    fn sample_never_goes_below_one() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(sample_positive_normal_integer(&mut rng, 1.0, 5.0) >= 1);
        }
    }

    #[test]
    fn same_seed_produces_same_prompt() {
        let tokens = SyntheticTokensConfig {
            mean: 8.0,
            stddev: 0.0,
            block_size: None,
        };
        let prefix = PrefixPromptConfig::default();
        let mut rng_a = StdRng::seed_from_u64(42);
        let gen_a = PromptGenerator::new(tokens.clone(), &prefix, &mut rng_a);
        let mut rng_b = StdRng::seed_from_u64(42);
        let gen_b = PromptGenerator::new(tokens, &prefix, &mut rng_b);
        assert_eq!(gen_a.generate(&mut rng_a.clone()), gen_b.generate(&mut rng_b.clone()));
    }
}
