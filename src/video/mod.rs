pub mod blink;
pub mod frames;
pub mod pupil;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{AnalysisFrame, DetectorKind, clamp_score},
    detection::{FrameAnalysis, ensemble::MethodScores},
    error::{ForensicsError, Result},
    stats,
};

use self::{
    blink::{BlinkAnalysis, BlinkConfig, EyeRegion, analyze_blinks, eye_aspect_proxy},
    pupil::{PupilAnalysis, PupilConfig, analyze_pupils, pupil_size},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub sample_points: Vec<f64>,
    pub frame_interval_secs: f64,
    pub consistent_below: f64,
    pub consistent_bonus: f64,
    pub inconsistent_above: f64,
    pub inconsistent_bonus: f64,
    pub eyes_enabled: bool,
    pub eye_weight: f64,
    pub eye_region: EyeRegion,
    pub blink: BlinkConfig,
    pub pupil: PupilConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            sample_points: vec![0.1, 0.5, 0.9],
            frame_interval_secs: 1.0,
            consistent_below: 5.0,
            consistent_bonus: 3.0,
            inconsistent_above: 15.0,
            inconsistent_bonus: 5.0,
            eyes_enabled: true,
            eye_weight: 0.10,
            eye_region: EyeRegion::default(),
            blink: BlinkConfig::default(),
            pupil: PupilConfig::default(),
        }
    }
}

impl VideoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_points.is_empty() || self.sample_points.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(ForensicsError::InvalidParameter(
                "video sample_points must be non-empty fractions in [0, 1]".into(),
            ));
        }
        if !(self.frame_interval_secs.is_finite() && self.frame_interval_secs > 0.0) {
            return Err(ForensicsError::InvalidParameter(
                "video frame_interval_secs must be positive".into(),
            ));
        }
        if self.consistent_below > self.inconsistent_above {
            return Err(ForensicsError::InvalidParameter(
                "video consistent_below must not exceed inconsistent_above".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.eye_weight) {
            return Err(ForensicsError::InvalidParameter(
                "video eye_weight must be in [0, 1]".into(),
            ));
        }
        self.eye_region.validate()?;
        self.blink.validate()?;
        self.pupil.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeSample {
    pub timestamp: f64,
    pub aspect_proxy: f64,
    pub pupil_size: usize,
    /// Backfilled or byte-identical to the previous frame; carries no eye motion.
    pub repeated: bool,
}

impl EyeSample {
    pub fn measure(frame: &AnalysisFrame<'_>, timestamp: f64, repeated: bool, config: &VideoConfig) -> Self {
        Self {
            timestamp,
            aspect_proxy: eye_aspect_proxy(frame.gray(), &config.eye_region, &config.blink),
            pupil_size: pupil_size(frame.gray(), &config.eye_region, &config.pupil),
            repeated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSummary {
    pub frame_scores: Vec<u8>,
    pub std_dev: f64,
    pub adjustment: f64,
    pub blink: Option<BlinkAnalysis>,
    pub pupil: Option<PupilAnalysis>,
    pub eye_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalOutcome {
    pub confidence: u8,
    pub scores: MethodScores,
    pub faces: usize,
    pub summary: TemporalSummary,
}

pub struct TemporalAggregator {
    config: VideoConfig,
}

impl TemporalAggregator {
    pub fn new() -> Self {
        Self::with_config(VideoConfig::default())
    }

    pub fn with_config(config: VideoConfig) -> Self {
        Self { config }
    }

    pub fn average_scores(frames: &[FrameAnalysis]) -> MethodScores {
        let mut kinds = frames
            .iter()
            .flat_map(|f| f.scores.iter().map(|(kind, _)| kind))
            .collect::<Vec<DetectorKind>>();
        kinds.sort();
        kinds.dedup();

        kinds
            .into_iter()
            .map(|kind| {
                let values = frames
                    .iter()
                    .filter(|f| f.scores.contains(kind))
                    .map(|f| f.scores.get(kind) as f64)
                    .collect::<Vec<_>>();
                (kind, clamp_score(stats::mean(&values)))
            })
            .collect()
    }

    pub fn temporal_adjustment(&self, std_dev: f64) -> f64 {
        if std_dev < self.config.consistent_below {
            self.config.consistent_bonus
        } else if std_dev > self.config.inconsistent_above {
            self.config.inconsistent_bonus
        } else {
            0.0
        }
    }

    pub fn aggregate(&self, frames: &[FrameAnalysis], eyes: &[EyeSample]) -> Result<TemporalOutcome> {
        if frames.is_empty() {
            return Err(ForensicsError::NoFrames);
        }

        let frame_scores = frames.iter().map(FrameAnalysis::score).collect::<Vec<_>>();
        let values = frame_scores.iter().map(|&s| s as f64).collect::<Vec<_>>();
        let base = stats::mean(&values);
        let std_dev = stats::std_dev(&values);
        let adjustment = self.temporal_adjustment(std_dev);

        let (blink, pupil) = if self.config.eyes_enabled {
            let observed = eyes.iter().filter(|e| !e.repeated);
            let ears = observed.clone().map(|e| (e.timestamp, e.aspect_proxy)).collect::<Vec<_>>();
            let sizes = observed.map(|e| e.pupil_size).collect::<Vec<_>>();
            (analyze_blinks(&ears, &self.config.blink), analyze_pupils(&sizes, &self.config.pupil))
        } else {
            (None, None)
        };

        let eye_scores = blink.iter().map(|b| b.score).chain(pupil.iter().map(|p| p.score)).collect::<Vec<_>>();
        let eye_score = (!eye_scores.is_empty()).then(|| stats::mean(&eye_scores));

        let mut confidence = (base + adjustment).clamp(0.0, 100.0);
        if let Some(eye) = eye_score {
            confidence = confidence * (1.0 - self.config.eye_weight) + eye * self.config.eye_weight;
        }

        log::debug!(
            "temporal: frames={} base={:.2} std={:.2} adjustment={:+.0} eye={:?}",
            frames.len(),
            base,
            std_dev,
            adjustment,
            eye_score
        );

        Ok(TemporalOutcome {
            confidence: clamp_score(confidence),
            scores: Self::average_scores(frames),
            faces: frames.iter().map(|f| f.faces).max().unwrap_or(0),
            summary: TemporalSummary {
                frame_scores,
                std_dev,
                adjustment,
                blink,
                pupil,
                eye_score,
            },
        })
    }
}

impl Default for TemporalAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::DetectorResult,
        detection::{DetectorOutcome, consensus::ConsensusConfig, ensemble::EnsembleWeights},
    };

    fn frame(values: [u8; 5], faces: usize) -> FrameAnalysis {
        let outcomes = DetectorKind::PIXEL_STATISTICS
            .into_iter()
            .zip(values)
            .map(|(kind, score)| DetectorOutcome {
                kind,
                result: DetectorResult {
                    score,
                    ..Default::default()
                },
                failed: false,
            })
            .collect();
        FrameAnalysis::assemble(outcomes, faces, &EnsembleWeights::CANONICAL, &ConsensusConfig::default())
    }

    #[test]
    fn test_identical_frames_get_bonus_once() {
        let frames = vec![frame([50; 5], 0), frame([50; 5], 0), frame([50; 5], 0)];
        let outcome = TemporalAggregator::new().aggregate(&frames, &[]).unwrap();

        assert_eq!(outcome.summary.std_dev, 0.0);
        assert_eq!(outcome.summary.adjustment, 3.0);
        assert_eq!(outcome.confidence, 53);
    }

    #[test]
    fn test_inconsistent_frames_are_penalised() {
        // frame scores 20 and 80: std 30
        let frames = vec![frame([20; 5], 0), frame([80; 5], 0)];
        let outcome = TemporalAggregator::new().aggregate(&frames, &[]).unwrap();
        assert!(outcome.summary.frame_scores[0] < 38);
        assert_eq!(outcome.summary.adjustment, 5.0);
    }

    #[test]
    fn test_middle_band_has_no_adjustment() {
        let aggregator = TemporalAggregator::new();
        assert_eq!(aggregator.temporal_adjustment(4.99), 3.0);
        assert_eq!(aggregator.temporal_adjustment(5.0), 0.0);
        assert_eq!(aggregator.temporal_adjustment(15.0), 0.0);
        assert_eq!(aggregator.temporal_adjustment(15.01), 5.0);
    }

    #[test]
    fn test_per_method_average_and_faces() {
        let frames = vec![frame([10, 20, 30, 40, 50], 1), frame([11, 20, 30, 40, 50], 2)];
        let outcome = TemporalAggregator::new().aggregate(&frames, &[]).unwrap();

        // 10.5 rounds away from zero
        assert_eq!(outcome.scores.get(DetectorKind::Frequency), 11);
        assert_eq!(outcome.scores.get(DetectorKind::Texture), 50);
        assert_eq!(outcome.faces, 2);
    }

    #[test]
    fn test_frozen_pupil_blends_into_confidence() {
        let frames = vec![frame([50; 5], 0), frame([50; 5], 0), frame([50; 5], 0)];
        let eyes = (0..3)
            .map(|i| EyeSample {
                timestamp: i as f64,
                aspect_proxy: 0.3,
                pupil_size: 120,
                repeated: false,
            })
            .collect::<Vec<_>>();
        let outcome = TemporalAggregator::new().aggregate(&frames, &eyes).unwrap();

        assert!(outcome.summary.blink.is_none());
        assert_eq!(outcome.summary.eye_score, Some(100.0));
        // 53 * 0.9 + 100 * 0.1 = 57.7
        assert_eq!(outcome.confidence, 58);
    }

    #[test]
    fn test_repeated_samples_carry_no_eye_evidence() {
        let frames = vec![frame([50; 5], 0), frame([50; 5], 0), frame([50; 5], 0)];
        let eyes = (0..3)
            .map(|i| EyeSample {
                timestamp: i as f64,
                aspect_proxy: 0.3,
                pupil_size: 120,
                repeated: i > 0,
            })
            .collect::<Vec<_>>();
        let outcome = TemporalAggregator::new().aggregate(&frames, &eyes).unwrap();

        assert!(outcome.summary.pupil.is_none());
        assert_eq!(outcome.summary.eye_score, None);
        assert_eq!(outcome.confidence, 53);
    }

    #[test]
    fn test_empty_input_is_no_frames() {
        let err = TemporalAggregator::new().aggregate(&[], &[]).unwrap_err();
        assert!(err.is_no_frames());
    }
}
