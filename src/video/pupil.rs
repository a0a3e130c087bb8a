use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::scoring::BandRamp,
    error::{ForensicsError, Result},
    stats,
    video::blink::EyeRegion,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PupilConfig {
    pub dark_below: u8,
    pub min_frames: usize,
    pub variation: BandRamp,
}

impl Default for PupilConfig {
    fn default() -> Self {
        Self {
            dark_below: 40,
            min_frames: 3,
            variation: BandRamp::new(1.5, 4.0, 15.0, 25.0),
        }
    }
}

impl PupilConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_frames < 2 {
            return Err(ForensicsError::InvalidParameter(
                "pupil min_frames must be at least 2".into(),
            ));
        }
        self.variation.validate("pupil.variation")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PupilAnalysis {
    pub mean_size: f64,
    pub variation_percent: f64,
    pub score: f64,
}

pub fn pupil_size(gray: &GrayImage, region: &EyeRegion, config: &PupilConfig) -> usize {
    region.pixels(gray).filter(|&v| v < config.dark_below).count()
}

pub fn analyze_pupils(sizes: &[usize], config: &PupilConfig) -> Option<PupilAnalysis> {
    if sizes.len() < config.min_frames {
        return None;
    }

    let values = sizes.iter().map(|&s| s as f64).collect::<Vec<_>>();
    let mean_size = stats::mean(&values);
    if mean_size <= 0.0 {
        return None;
    }

    let variation_percent = stats::coefficient_of_variation(&values) * 100.0;
    let score = config.variation.score(variation_percent);

    log::debug!("pupil: mean={mean_size:.1}px cv={variation_percent:.2}% score={score:.1}");

    Some(PupilAnalysis {
        mean_size,
        variation_percent,
        score,
    })
}
