use serde::{Deserialize, Serialize};

use crate::error::{ForensicsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Authentic,
    Inconclusive,
    Deepfake,
}

/// Cut-points on the 0-100 confidence scale. Each bound is inclusive on the
/// upper verdict: `confidence >= deepfake_from` is a deepfake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictThresholds {
    pub inconclusive_from: u8,
    pub deepfake_from: u8,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            inconclusive_from: 38,
            deepfake_from: 62,
        }
    }
}

impl VerdictThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.inconclusive_from >= self.deepfake_from || self.deepfake_from > 100 {
            return Err(ForensicsError::InvalidParameter(format!(
                "verdict thresholds must satisfy inconclusive_from < deepfake_from <= 100 (got {} / {})",
                self.inconclusive_from, self.deepfake_from
            )));
        }
        Ok(())
    }
}

impl Verdict {
    pub fn from_confidence(confidence: u8, thresholds: &VerdictThresholds) -> Self {
        match confidence {
            c if c >= thresholds.deepfake_from => Verdict::Deepfake,
            c if c >= thresholds.inconclusive_from => Verdict::Inconclusive,
            _ => Verdict::Authentic,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Authentic => "Likely authentic",
            Verdict::Inconclusive => "Inconclusive",
            Verdict::Deepfake => "Likely synthetic",
        }
    }
}
