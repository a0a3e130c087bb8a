use serde::{Deserialize, Serialize};

use crate::error::{ForensicsError, Result};

pub const INDICATOR_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ramp {
    pub natural: f64,
    pub ai: f64,
}

impl Ramp {
    pub const fn new(natural: f64, ai: f64) -> Self {
        Self { natural, ai }
    }

    /// 0 at (or beyond) `natural`, 100 at (or beyond) `ai`, linear in between.
    /// Works in either direction.
    pub fn score(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }

        let span = self.ai - self.natural;
        if span == 0.0 {
            return 0.0;
        }

        ((value - self.natural) / span).clamp(0.0, 1.0) * 100.0
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.natural.is_finite() || !self.ai.is_finite() || self.natural == self.ai {
            return Err(ForensicsError::InvalidParameter(format!(
                "ramp '{name}' needs two distinct finite reference points"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRamp {
    pub low_ai: f64,
    pub low_natural: f64,
    pub high_natural: f64,
    pub high_ai: f64,
}

impl BandRamp {
    pub const fn new(low_ai: f64, low_natural: f64, high_natural: f64, high_ai: f64) -> Self {
        Self {
            low_ai,
            low_natural,
            high_natural,
            high_ai,
        }
    }

    pub fn score(&self, value: f64) -> f64 {
        if value < self.low_natural {
            Ramp::new(self.low_natural, self.low_ai).score(value)
        } else if value > self.high_natural {
            Ramp::new(self.high_natural, self.high_ai).score(value)
        } else {
            0.0
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        let ordered = self.low_ai < self.low_natural
            && self.low_natural <= self.high_natural
            && self.high_natural < self.high_ai;
        if !ordered {
            return Err(ForensicsError::InvalidParameter(format!(
                "band ramp '{name}' must satisfy low_ai < low_natural <= high_natural < high_ai"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RampInput {
    pub metric: &'static str,
    pub value: f64,
    pub ramp: Ramp,
    pub indicator: &'static str,
}

impl RampInput {
    pub fn new(metric: &'static str, value: f64, ramp: Ramp, indicator: &'static str) -> Self {
        Self {
            metric,
            value,
            ramp,
            indicator,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RampScore {
    pub score: f64,
    pub components: Vec<(&'static str, f64)>,
    pub indicators: Vec<String>,
}

pub fn score_ramps(table: &[RampInput]) -> RampScore {
    if table.is_empty() {
        return RampScore {
            score: 0.0,
            components: Vec::new(),
            indicators: Vec::new(),
        };
    }

    let components = table
        .iter()
        .map(|row| (row.metric, row.ramp.score(row.value)))
        .collect::<Vec<_>>();

    let indicators = table
        .iter()
        .zip(&components)
        .filter(|(_, (_, score))| *score >= INDICATOR_THRESHOLD)
        .map(|(row, _)| row.indicator.to_string())
        .collect();

    let score = components.iter().map(|(_, s)| s).sum::<f64>() / components.len() as f64;

    RampScore {
        score,
        components,
        indicators,
    }
}
