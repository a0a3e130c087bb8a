use serde::{Deserialize, Serialize};

use crate::{
    analysis::DetectorKind,
    detection::ensemble::MethodScores,
    error::{ForensicsError, Result},
};

/// Moves the value towards `anchor`, then `step` further, never past `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Push {
    pub anchor: f64,
    pub step: f64,
    pub limit: f64,
}

impl Push {
    pub const fn new(anchor: f64, step: f64, limit: f64) -> Self {
        Self { anchor, step, limit }
    }

    pub fn raise(&self, value: f64) -> f64 {
        (value.max(self.anchor) + self.step).min(self.limit)
    }

    pub fn lower(&self, value: f64) -> f64 {
        (value.min(self.anchor) - self.step).max(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub fake_vote_above: u8,
    pub real_vote_below: u8,
    pub strong_votes: usize,
    pub lean_votes: usize,
    pub strong_fake: Push,
    pub strong_real: Push,
    pub lean_fake: Push,
    pub lean_real: Push,
    pub uncertain_band: (u8, u8),
    pub uncertain_min: usize,
    pub uncertain_fake: Push,
    pub edge_texture_min: u8,
    pub edge_texture_floor: f64,
    pub edge_strong_min: u8,
    pub edge_strong_floor: f64,
    pub adversarial_frequency_min: u8,
    pub adversarial_compression_min: u8,
    pub adversarial_noise_below: u8,
    pub adversarial_floor: f64,
    pub adversarial_texture_min: u8,
    pub adversarial_texture_floor: f64,
    pub frequency_strong_min: u8,
    pub frequency_strong_floor: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            fake_vote_above: 70,
            real_vote_below: 30,
            strong_votes: 3,
            lean_votes: 2,
            strong_fake: Push::new(72.0, 12.0, 98.0),
            strong_real: Push::new(32.0, 12.0, 5.0),
            lean_fake: Push::new(65.0, 8.0, 95.0),
            lean_real: Push::new(38.0, 8.0, 5.0),
            uncertain_band: (50, 70),
            uncertain_min: 2,
            uncertain_fake: Push::new(62.0, 5.0, 85.0),
            edge_texture_min: 60,
            edge_texture_floor: 65.0,
            edge_strong_min: 85,
            edge_strong_floor: 65.0,
            adversarial_frequency_min: 70,
            adversarial_compression_min: 40,
            adversarial_noise_below: 20,
            adversarial_floor: 55.0,
            adversarial_texture_min: 40,
            adversarial_texture_floor: 62.0,
            frequency_strong_min: 90,
            frequency_strong_floor: 60.0,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.real_vote_below > self.fake_vote_above || self.fake_vote_above > 100 {
            return Err(ForensicsError::InvalidParameter(
                "consensus vote thresholds must satisfy real_vote_below <= fake_vote_above <= 100".into(),
            ));
        }
        if self.uncertain_band.0 > self.uncertain_band.1 {
            return Err(ForensicsError::InvalidParameter(
                "consensus uncertain_band must be ordered".into(),
            ));
        }
        if self.strong_votes == 0 || self.lean_votes == 0 || self.lean_votes > self.strong_votes {
            return Err(ForensicsError::InvalidParameter(
                "consensus vote counts must satisfy 0 < lean_votes <= strong_votes".into(),
            ));
        }
        Ok(())
    }

    pub fn apply(&self, raw: f64, scores: &MethodScores) -> (f64, Vec<&'static str>) {
        let votes = Votes::tally(scores, self);
        let mut value = raw;
        let mut fired = Vec::new();
        let mut vote_rule_applied = false;

        for rule in RULES.iter() {
            if rule.stage == RuleStage::Exclusive && vote_rule_applied {
                continue;
            }
            if rule.matches(&votes, self) {
                value = rule.adjust(value, self);
                fired.push(rule.name);
                if rule.stage == RuleStage::Exclusive {
                    vote_rule_applied = true;
                }
            }
        }

        (value.clamp(0.0, 100.0), fired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Votes {
    pub fake: usize,
    pub real: usize,
    pub uncertain: usize,
    pub frequency: u8,
    pub noise: u8,
    pub compression: u8,
    pub edge: u8,
    pub texture: u8,
}

impl Votes {
    pub fn tally(scores: &MethodScores, config: &ConsensusConfig) -> Self {
        let values = DetectorKind::PIXEL_STATISTICS.map(|kind| scores.get(kind));
        let (low, high) = config.uncertain_band;

        Self {
            fake: values.iter().filter(|&&s| s > config.fake_vote_above).count(),
            real: values.iter().filter(|&&s| s < config.real_vote_below).count(),
            uncertain: values.iter().filter(|&&s| (low..=high).contains(&s)).count(),
            frequency: scores.get(DetectorKind::Frequency),
            noise: scores.get(DetectorKind::Noise),
            compression: scores.get(DetectorKind::Compression),
            edge: scores.get(DetectorKind::EdgeCoherence),
            texture: scores.get(DetectorKind::Texture),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStage {
    /// First match wins within the stage.
    Exclusive,
    /// Always evaluated.
    Independent,
}

pub struct ConsensusRule {
    pub name: &'static str,
    pub stage: RuleStage,
    predicate: fn(&Votes, &ConsensusConfig) -> bool,
    adjustment: fn(f64, &ConsensusConfig) -> f64,
}

impl ConsensusRule {
    pub fn matches(&self, votes: &Votes, config: &ConsensusConfig) -> bool {
        (self.predicate)(votes, config)
    }

    pub fn adjust(&self, value: f64, config: &ConsensusConfig) -> f64 {
        (self.adjustment)(value, config)
    }
}

impl std::fmt::Debug for ConsensusRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusRule")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .finish()
    }
}

pub static RULES: [ConsensusRule; 10] = [
    ConsensusRule {
        name: "strong_fake_consensus",
        stage: RuleStage::Exclusive,
        predicate: |v, c| v.fake >= c.strong_votes,
        adjustment: |x, c| c.strong_fake.raise(x),
    },
    ConsensusRule {
        name: "strong_real_consensus",
        stage: RuleStage::Exclusive,
        predicate: |v, c| v.real >= c.strong_votes,
        adjustment: |x, c| c.strong_real.lower(x),
    },
    ConsensusRule {
        name: "lean_fake",
        stage: RuleStage::Exclusive,
        predicate: |v, c| v.fake >= c.lean_votes && v.real == 0,
        adjustment: |x, c| c.lean_fake.raise(x),
    },
    ConsensusRule {
        name: "lean_real",
        stage: RuleStage::Exclusive,
        predicate: |v, c| v.real >= c.lean_votes && v.fake == 0,
        adjustment: |x, c| c.lean_real.lower(x),
    },
    ConsensusRule {
        name: "suspicious_majority",
        stage: RuleStage::Exclusive,
        predicate: |v, c| v.fake >= 1 && v.uncertain >= c.uncertain_min,
        adjustment: |x, c| c.uncertain_fake.raise(x),
    },
    ConsensusRule {
        name: "edge_and_texture",
        stage: RuleStage::Independent,
        predicate: |v, c| v.edge >= c.edge_texture_min && v.texture >= c.edge_texture_min,
        adjustment: |x, c| x.max(c.edge_texture_floor),
    },
    ConsensusRule {
        name: "strong_edge",
        stage: RuleStage::Independent,
        predicate: |v, c| v.edge >= c.edge_strong_min,
        adjustment: |x, c| x.max(c.edge_strong_floor),
    },
    ConsensusRule {
        name: "adversarial_noise",
        stage: RuleStage::Independent,
        predicate: adversarial_noise,
        adjustment: |x, c| x.max(c.adversarial_floor),
    },
    ConsensusRule {
        name: "adversarial_noise_textured",
        stage: RuleStage::Independent,
        predicate: |v, c| adversarial_noise(v, c) && v.texture >= c.adversarial_texture_min,
        adjustment: |x, c| x.max(c.adversarial_texture_floor),
    },
    ConsensusRule {
        name: "strong_frequency",
        stage: RuleStage::Independent,
        predicate: |v, c| v.frequency >= c.frequency_strong_min,
        adjustment: |x, c| x.max(c.frequency_strong_floor),
    },
];

fn adversarial_noise(v: &Votes, c: &ConsensusConfig) -> bool {
    v.frequency >= c.adversarial_frequency_min
        && v.compression >= c.adversarial_compression_min
        && v.noise < c.adversarial_noise_below
}

pub fn rule(name: &str) -> Option<&'static ConsensusRule> {
    RULES.iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: [u8; 5]) -> MethodScores {
        DetectorKind::PIXEL_STATISTICS.into_iter().zip(values).collect()
    }

    fn votes(values: [u8; 5]) -> Votes {
        Votes::tally(&scores(values), &ConsensusConfig::default())
    }

    #[test]
    fn test_vote_counting_is_strict() {
        let v = votes([71, 70, 30, 29, 50]);
        assert_eq!(v.fake, 1);
        assert_eq!(v.real, 1);
        assert_eq!(v.uncertain, 2);
    }

    #[test]
    fn test_strong_fake_rule() {
        let c = ConsensusConfig::default();
        let r = rule("strong_fake_consensus").unwrap();
        assert!(r.matches(&votes([90, 90, 90, 10, 10]), &c));
        assert_eq!(r.adjust(40.0, &c), 84.0);
        assert_eq!(r.adjust(90.0, &c), 98.0);
    }

    #[test]
    fn test_strong_real_rule() {
        let c = ConsensusConfig::default();
        let r = rule("strong_real_consensus").unwrap();
        assert!(r.matches(&votes([10, 10, 10, 90, 90]), &c));
        assert_eq!(r.adjust(60.0, &c), 20.0);
        assert_eq!(r.adjust(10.0, &c), 5.0);
    }

    #[test]
    fn test_lean_rules() {
        let c = ConsensusConfig::default();
        assert!(rule("lean_fake").unwrap().matches(&votes([80, 80, 50, 50, 50]), &c));
        assert!(!rule("lean_fake").unwrap().matches(&votes([80, 80, 20, 50, 50]), &c));
        assert_eq!(rule("lean_fake").unwrap().adjust(50.0, &c), 73.0);
        assert!(rule("lean_real").unwrap().matches(&votes([20, 20, 50, 50, 50]), &c));
        assert_eq!(rule("lean_real").unwrap().adjust(50.0, &c), 30.0);
    }

    #[test]
    fn test_suspicious_majority() {
        let c = ConsensusConfig::default();
        let r = rule("suspicious_majority").unwrap();
        assert!(r.matches(&votes([80, 55, 60, 40, 20]), &c));
        assert_eq!(r.adjust(50.0, &c), 67.0);
        assert_eq!(r.adjust(84.0, &c), 85.0);
    }

    #[test]
    fn test_four_fake_one_real_forces_floor() {
        let c = ConsensusConfig::default();
        let s = scores([90, 10, 90, 90, 90]);
        let (value, fired) = c.apply(70.8, &s);
        assert!(value >= 72.0);
        assert_eq!(fired[0], "strong_fake_consensus");
        assert!(!fired.contains(&"lean_fake"));
    }

    #[test]
    fn test_exclusive_stage_applies_once() {
        // matches both strong_real and lean_real
        let c = ConsensusConfig::default();
        let (value, fired) = c.apply(40.0, &scores([10, 10, 10, 50, 50]));
        assert_eq!(fired, vec!["strong_real_consensus"]);
        assert_eq!(value, 20.0);
    }

    #[test]
    fn test_adversarial_noise_rules() {
        let c = ConsensusConfig::default();
        let v = votes([75, 10, 45, 30, 45]);
        assert!(rule("adversarial_noise").unwrap().matches(&v, &c));
        assert!(rule("adversarial_noise_textured").unwrap().matches(&v, &c));

        let v = votes([75, 10, 45, 30, 30]);
        assert!(rule("adversarial_noise").unwrap().matches(&v, &c));
        assert!(!rule("adversarial_noise_textured").unwrap().matches(&v, &c));
    }

    #[test]
    fn test_independent_boosts_only_raise() {
        let c = ConsensusConfig::default();
        let (value, fired) = c.apply(95.0, &scores([95, 50, 50, 90, 65]));
        assert_eq!(value, 95.0);
        assert!(fired.contains(&"strong_edge"));
        assert!(fired.contains(&"strong_frequency"));
        assert!(fired.contains(&"edge_and_texture"));
    }

    #[test]
    fn test_result_is_clamped() {
        let mut c = ConsensusConfig::default();
        c.strong_fake = Push::new(72.0, 50.0, 150.0);
        let (value, _) = c.apply(90.0, &scores([90, 90, 90, 90, 90]));
        assert_eq!(value, 100.0);
    }
}
