pub mod compression;
pub mod edge_coherence;
pub mod frequency;
pub mod noise;
pub mod pattern;
pub mod scoring;
pub mod texture;

use std::collections::BTreeMap;

use image::GrayImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    image_utils::{PixelBuffer, gray_to_array},
};

use self::scoring::RampScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Frequency,
    Noise,
    Compression,
    EdgeCoherence,
    Texture,
    Pattern,
    Model,
}

impl DetectorKind {
    pub const PIXEL_STATISTICS: [DetectorKind; 5] = [
        DetectorKind::Frequency,
        DetectorKind::Noise,
        DetectorKind::Compression,
        DetectorKind::EdgeCoherence,
        DetectorKind::Texture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Frequency => "frequency",
            DetectorKind::Noise => "noise",
            DetectorKind::Compression => "compression",
            DetectorKind::EdgeCoherence => "edge",
            DetectorKind::Texture => "texture",
            DetectorKind::Pattern => "pattern",
            DetectorKind::Model => "model",
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub score: u8,
    pub indicators: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
}

impl DetectorResult {
    pub const NEUTRAL_SCORE: u8 = 50;

    pub fn neutral() -> Self {
        Self {
            score: Self::NEUTRAL_SCORE,
            ..Default::default()
        }
    }

    pub fn from_score(score: f64, indicators: Vec<String>, metrics: BTreeMap<String, f64>) -> Self {
        Self {
            score: clamp_score(score),
            indicators,
            metrics,
        }
    }

    pub fn from_ramps(ramps: RampScore, metrics: BTreeMap<String, f64>) -> Self {
        Self::from_score(ramps.score, ramps.indicators, metrics)
    }
}

pub fn clamp_score(score: f64) -> u8 {
    if !score.is_finite() {
        return 0;
    }
    score.round().clamp(0.0, 100.0) as u8
}

pub struct AnalysisFrame<'a> {
    buffer: &'a PixelBuffer,
    gray: GrayImage,
    luma: Array2<f64>,
}

impl<'a> AnalysisFrame<'a> {
    pub fn new(buffer: &'a PixelBuffer) -> Result<Self> {
        buffer.validate()?;
        let gray = buffer.to_gray();
        let luma = gray_to_array(&gray);

        Ok(Self { buffer, gray, luma })
    }

    pub fn buffer(&self) -> &PixelBuffer {
        self.buffer
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn luma(&self) -> &Array2<f64> {
        &self.luma
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }
}

pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    fn analyze(&self, frame: &AnalysisFrame<'_>) -> Result<DetectorResult>;

    fn name(&self) -> &str {
        self.kind().as_str()
    }
}

pub(crate) fn metric_map<const N: usize>(entries: [(&str, f64); N]) -> BTreeMap<String, f64> {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-5.0), 0);
        assert_eq!(clamp_score(49.5), 50);
        assert_eq!(clamp_score(140.0), 100);
        assert_eq!(clamp_score(f64::NAN), 0);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(DetectorKind::EdgeCoherence.as_str(), "edge");
        assert_eq!(DetectorKind::PIXEL_STATISTICS.len(), 5);
    }

    #[test]
    fn test_frame_views_match_buffer() {
        let buffer = test_frames::uniform(90);
        let frame = AnalysisFrame::new(&buffer).unwrap();
        assert_eq!(frame.gray().dimensions(), (224, 224));
        assert_eq!(frame.luma().dim(), (224, 224));
        assert!(frame.luma().iter().all(|&v| v == 90.0 || v == 89.0));
    }
}
