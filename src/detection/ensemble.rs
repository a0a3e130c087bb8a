use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{DetectorKind, DetectorResult, clamp_score},
    detection::consensus::ConsensusConfig,
    error::{ForensicsError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub frequency: f64,
    pub noise: f64,
    pub compression: f64,
    pub edge: f64,
    pub texture: f64,
    pub learned: f64,
}

impl EnsembleWeights {
    pub const CANONICAL: EnsembleWeights = EnsembleWeights {
        frequency: 0.28,
        noise: 0.24,
        compression: 0.18,
        edge: 0.15,
        texture: 0.15,
        learned: 0.0,
    };

    pub const MODEL_BACKED: EnsembleWeights = EnsembleWeights {
        frequency: 0.20,
        noise: 0.17,
        compression: 0.13,
        edge: 0.10,
        texture: 0.10,
        learned: 0.30,
    };

    pub fn weight(&self, kind: DetectorKind) -> f64 {
        match kind {
            DetectorKind::Frequency => self.frequency,
            DetectorKind::Noise => self.noise,
            DetectorKind::Compression => self.compression,
            DetectorKind::EdgeCoherence => self.edge,
            DetectorKind::Texture => self.texture,
            DetectorKind::Pattern | DetectorKind::Model => self.learned,
        }
    }

    pub fn total(&self) -> f64 {
        self.frequency + self.noise + self.compression + self.edge + self.texture + self.learned
    }

    pub fn validate(&self) -> Result<()> {
        let all = [self.frequency, self.noise, self.compression, self.edge, self.texture, self.learned];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ForensicsError::InvalidParameter(
                "ensemble weights must be finite and non-negative".into(),
            ));
        }
        if (self.total() - 1.0).abs() > 1e-6 {
            return Err(ForensicsError::InvalidParameter(format!(
                "ensemble weights must sum to 1.0, got {:.6}",
                self.total()
            )));
        }
        Ok(())
    }
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// Integer scores keyed by detector. A missing detector reads as neutral.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodScores(BTreeMap<DetectorKind, u8>);

impl MethodScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: DetectorKind, score: u8) {
        self.0.insert(kind, score.min(100));
    }

    pub fn get(&self, kind: DetectorKind) -> u8 {
        self.0.get(&kind).copied().unwrap_or(DetectorResult::NEUTRAL_SCORE)
    }

    pub fn contains(&self, kind: DetectorKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DetectorKind, u8)> + '_ {
        self.0.iter().map(|(&kind, &score)| (kind, score))
    }

    pub fn learned(&self) -> Option<u8> {
        self.0
            .get(&DetectorKind::Model)
            .or_else(|| self.0.get(&DetectorKind::Pattern))
            .copied()
    }

    pub fn to_named(&self) -> BTreeMap<String, u8> {
        self.iter().map(|(kind, score)| (kind.as_str().to_string(), score)).collect()
    }
}

impl FromIterator<(DetectorKind, u8)> for MethodScores {
    fn from_iter<T: IntoIterator<Item = (DetectorKind, u8)>>(iter: T) -> Self {
        let mut scores = MethodScores::new();
        for (kind, score) in iter {
            scores.insert(kind, score);
        }
        scores
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleOutcome {
    pub raw: f64,
    pub score: u8,
    pub fired: Vec<&'static str>,
}

pub fn weighted_sum(scores: &MethodScores, weights: &EnsembleWeights) -> f64 {
    let pixel = DetectorKind::PIXEL_STATISTICS
        .iter()
        .map(|&kind| weights.weight(kind) * scores.get(kind) as f64)
        .sum::<f64>();

    let learned = scores
        .learned()
        .map(|score| weights.learned * score as f64)
        .unwrap_or(0.0);

    pixel + learned
}

pub fn combine(scores: &MethodScores, weights: &EnsembleWeights, consensus: &ConsensusConfig) -> EnsembleOutcome {
    let raw = weighted_sum(scores, weights);
    let (adjusted, fired) = consensus.apply(raw, scores);

    log::debug!("ensemble: raw={:.2} adjusted={:.2} rules={:?}", raw, adjusted, fired);

    EnsembleOutcome {
        raw,
        score: clamp_score(adjusted),
        fired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: [u8; 5]) -> MethodScores {
        DetectorKind::PIXEL_STATISTICS.into_iter().zip(values).collect()
    }

    #[test]
    fn test_presets_sum_to_one() {
        assert!(EnsembleWeights::CANONICAL.validate().is_ok());
        assert!(EnsembleWeights::MODEL_BACKED.validate().is_ok());
    }

    #[test]
    fn test_rejects_unnormalised_weights() {
        let weights = EnsembleWeights {
            frequency: 0.5,
            ..EnsembleWeights::CANONICAL
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_weighted_sum() {
        let s = scores([100, 0, 0, 0, 0]);
        assert!((weighted_sum(&s, &EnsembleWeights::CANONICAL) - 28.0).abs() < 1e-9);

        let s = scores([50, 50, 50, 50, 50]);
        assert!((weighted_sum(&s, &EnsembleWeights::CANONICAL) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_learned_slot_prefers_model() {
        let mut s = scores([0, 0, 0, 0, 0]);
        s.insert(DetectorKind::Pattern, 20);
        s.insert(DetectorKind::Model, 90);
        assert_eq!(s.learned(), Some(90));
        assert!((weighted_sum(&s, &EnsembleWeights::MODEL_BACKED) - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_detector_is_neutral() {
        let s = MethodScores::new();
        assert_eq!(s.get(DetectorKind::Texture), 50);
    }

    #[test]
    fn test_combine_without_rules_rounds_raw() {
        let s = scores([50, 50, 50, 50, 50]);
        let outcome = combine(&s, &EnsembleWeights::CANONICAL, &ConsensusConfig::default());
        assert_eq!(outcome.score, 50);
        assert!(outcome.fired.is_empty());
    }
}
