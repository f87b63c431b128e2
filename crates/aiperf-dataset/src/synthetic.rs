//! Synthetic conversation construction, grounded on
//! `dataset/composer/synthetic.py::SyntheticConversationComposer`.

use rand::rngs::StdRng;

use aiperf_core::config::InputConfig;
use aiperf_core::model::{Conversation, Turn};

use crate::media::{AudioGenerator, ImageGenerator};
use crate::prompt::{sample_positive_normal_integer, PromptGenerator};

/// Mean/stddev for the number of turns and the inter-turn delay. The
/// original sources these from `TurnConfig`/`TurnDelayConfig`; this crate
/// folds them into fixed defaults matching `config_defaults.py`'s
/// `TurnDefaults`/`TurnDelayDefaults` since `InputConfig` doesn't carry a
/// separate per-turn section (Open Question: not resolved by the
/// distillation, so the defaults are applied directly).
const TURN_COUNT_MEAN: f64 = 1.0;
const TURN_COUNT_STDDEV: f64 = 0.0;
const TURN_DELAY_MEAN_MS: f64 = 0.0;
const TURN_DELAY_STDDEV_MS: f64 = 0.0;

pub struct SyntheticComposer {
    prompts: PromptGenerator,
    images: Option<ImageGenerator>,
    audios: Option<AudioGenerator>,
    output_tokens_mean: Option<f64>,
}

impl SyntheticComposer {
    pub fn new(config: &InputConfig, rng: &mut StdRng) -> Self {
        let prompts = PromptGenerator::new(config.synthetic_tokens.clone(), &config.prefix_prompt, rng);
        let images = (config.image.width_mean > 0.0 && config.image.height_mean > 0.0)
            .then(|| ImageGenerator::new(config.image.clone()));
        let audios = (config.audio.length_mean > 0.0).then(|| AudioGenerator::new(config.audio.clone()));
        Self {
            prompts,
            images,
            audios,
            output_tokens_mean: config.output_tokens.mean,
        }
    }

    pub fn create_conversation(&self, rng: &mut StdRng) -> Conversation {
        let num_turns = sample_positive_normal_integer(rng, TURN_COUNT_MEAN, TURN_COUNT_STDDEV);
        let turns = (0..num_turns)
            .map(|i| self.create_turn(rng, i == 0))
            .collect();
        Conversation::new(turns)
    }

    fn create_turn(&self, rng: &mut StdRng, is_first: bool) -> Turn {
        let mut turn = Turn::default();

        let mut prompt = self.prompts.generate(rng);
        if is_first {
            if let Some(prefix) = self.prompts.random_prefix_prompt(rng) {
                prompt = format!("{prefix} {prompt}");
            }
        }
        turn.texts.push(prompt);

        if let Some(gen) = &self.images {
            turn.images.push(gen.generate(rng));
        }
        if let Some(gen) = &self.audios {
            turn.audios.push(gen.generate(rng));
        }
        if let Some(mean) = self.output_tokens_mean {
            turn.max_tokens = Some(sample_positive_normal_integer(rng, mean, 0.0));
        }
        if !is_first {
            turn.delay_ms = sample_positive_normal_integer(rng, TURN_DELAY_MEAN_MS.max(1.0), TURN_DELAY_STDDEV_MS) as f64;
            if TURN_DELAY_MEAN_MS == 0.0 {
                turn.delay_ms = 0.0;
            }
        }
        turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn same_seed_produces_identical_dataset() {
        let config = InputConfig::default();
        let mut rng_a = StdRng::seed_from_u64(99);
        let composer_a = SyntheticComposer::new(&config, &mut rng_a);
        let convo_a = composer_a.create_conversation(&mut rng_a);

        let mut rng_b = StdRng::seed_from_u64(99);
        let composer_b = SyntheticComposer::new(&config, &mut rng_b);
        let convo_b = composer_b.create_conversation(&mut rng_b);

        assert_eq!(convo_a.turns, convo_b.turns);
    }

    #[test]
    fn every_turn_carries_at_least_text() {
        let config = InputConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let composer = SyntheticComposer::new(&config, &mut rng);
        let convo = composer.create_conversation(&mut rng);
        assert!(convo.turns.iter().all(|t| t.has_modality()));
    }
}
