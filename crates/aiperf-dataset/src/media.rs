//! Synthetic image/audio payload generation (spec §4.2), grounded on
//! `dataset/generator/image.py` and `dataset/utils.py::encode_image`.
//!
//! Pixel-accurate image/audio encoding is out of scope: these generators
//! produce deterministically-seeded random byte payloads of a size
//! proportional to the configured dimensions/length, base64-encoded behind
//! a `data:` URI with the configured MIME type, which is all a load
//! generator needs to exercise a multimodal endpoint's request path.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::StdRng;

use aiperf_core::config::{AudioFormat, AudioGenConfig, ImageFormat, ImageGenConfig};

use crate::prompt::sample_positive_normal_integer;

pub struct ImageGenerator {
    config: ImageGenConfig,
}

impl ImageGenerator {
    pub fn new(config: ImageGenConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, rng: &mut StdRng) -> String {
        let width = sample_positive_normal_integer(rng, self.config.width_mean, self.config.width_stddev);
        let height = sample_positive_normal_integer(rng, self.config.height_mean, self.config.height_stddev);
        let byte_len = (width as usize * height as usize * 3).max(16);
        let mut bytes = vec![0u8; byte_len];
        rng.fill_bytes(&mut bytes);
        let encoded = STANDARD.encode(&bytes);
        let format = match self.config.format {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Random => {
                if rng.next_u32() % 2 == 0 {
                    "png"
                } else {
                    "jpeg"
                }
            }
        };
        format!("data:image/{format};base64,{encoded}")
    }
}

pub struct AudioGenerator {
    config: AudioGenConfig,
}

impl AudioGenerator {
    pub fn new(config: AudioGenConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, rng: &mut StdRng) -> String {
        let length_secs = sample_positive_normal_integer(rng, self.config.length_mean, self.config.length_stddev);
        let byte_len = (length_secs as usize * 8_000).max(16);
        let mut bytes = vec![0u8; byte_len];
        rng.fill_bytes(&mut bytes);
        let encoded = STANDARD.encode(&bytes);
        let format = match self.config.format {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        };
        format!("data:audio/{format};base64,{encoded}")
    }
}

/// Embeds a local image file as a base64 `data:` URI, or passes a URL
/// through unchanged, mirroring `custom.py::_handle_image_content`.
pub fn embed_or_pass_through(content: &str) -> aiperf_core::error::Result<String> {
    if content.starts_with("http://") || content.starts_with("https://") {
        return Ok(content.to_string());
    }
    let bytes = std::fs::read(content)?;
    let format = std::path::Path::new(content)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();
    let encoded = STANDARD.encode(&bytes);
    Ok(format!("data:image/{format};base64,{encoded}"))
}
