use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        compression::CompressionConfig, edge_coherence::EdgeCoherenceConfig, frequency::FrequencyConfig,
        noise::NoiseConfig, pattern::PatternConfig, texture::TextureConfig,
    },
    detection::{consensus::ConsensusConfig, ensemble::EnsembleWeights, face::FaceConfig, verdict::VerdictThresholds},
    error::Result,
    video::{TemporalSummary, VideoConfig},
};

pub mod analysis;
pub mod analyzer;
pub mod detection;
pub mod engine;
pub mod error;
pub mod image_utils;
pub mod progress;
pub mod report;
pub mod stats;
pub mod video;

pub use analysis::{AnalysisFrame, Detector, DetectorKind, DetectorResult};
pub use analyzer::DeepfakeAnalyzer;
pub use detection::verdict::Verdict;
pub use engine::{DetectionEngine, ModelRegistry, SyntheticModel};
pub use error::{ForensicsError, Result as ForensicsResult};
pub use image_utils::PixelBuffer;
pub use progress::CancellationToken;
pub use video::frames::{FrameSequence, FrameSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub parallel: bool,
    /// `None` uses the preset matching the engine backend.
    pub weights: Option<EnsembleWeights>,
    pub consensus: ConsensusConfig,
    pub verdict: VerdictThresholds,
    pub frequency: FrequencyConfig,
    pub noise: NoiseConfig,
    pub compression: CompressionConfig,
    pub edge: EdgeCoherenceConfig,
    pub texture: TextureConfig,
    pub pattern: PatternConfig,
    pub face: FaceConfig,
    pub video: VideoConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            weights: None,
            consensus: ConsensusConfig::default(),
            verdict: VerdictThresholds::default(),
            frequency: FrequencyConfig::default(),
            noise: NoiseConfig::default(),
            compression: CompressionConfig::default(),
            edge: EdgeCoherenceConfig::default(),
            texture: TextureConfig::default(),
            pattern: PatternConfig::default(),
            face: FaceConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(weights) = &self.weights {
            weights.validate()?;
        }
        self.consensus.validate()?;
        self.verdict.validate()?;
        self.frequency.validate()?;
        self.noise.validate()?;
        self.compression.validate()?;
        self.edge.validate()?;
        self.texture.validate()?;
        self.pattern.validate()?;
        self.face.validate()?;
        self.video.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub confidence: u8,
    pub verdict: Verdict,
    pub per_method_scores: BTreeMap<String, u8>,
    pub indicators: Vec<String>,
    pub faces_detected: usize,
    pub frame_count: usize,
    pub processing_time_seconds: f64,
    pub frame_scores: Vec<u8>,
    pub temporal: Option<TemporalSummary>,
    pub consensus_rules: Vec<String>,
    pub failed_detectors: Vec<String>,
}

impl AnalysisResult {
    pub fn method_score(&self, kind: DetectorKind) -> Option<u8> {
        self.per_method_scores.get(kind.as_str()).copied()
    }
}
