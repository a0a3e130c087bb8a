pub mod consensus;
pub mod ensemble;
pub mod face;
pub mod verdict;

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use crate::{
    analysis::{AnalysisFrame, Detector, DetectorKind, DetectorResult},
    error::Result,
    progress::{CancellationToken, ProgressReporter},
};

use self::{
    consensus::ConsensusConfig,
    ensemble::{EnsembleOutcome, EnsembleWeights, MethodScores, combine},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorOutcome {
    pub kind: DetectorKind,
    pub result: DetectorResult,
    pub failed: bool,
}

pub struct DetectorSuite {
    detectors: Vec<Arc<dyn Detector>>,
    parallel: bool,
}

impl DetectorSuite {
    pub fn new(detectors: Vec<Arc<dyn Detector>>) -> Self {
        Self {
            detectors,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn replace(&mut self, detector: Arc<dyn Detector>) {
        let kind = detector.kind();
        match self.detectors.iter_mut().find(|d| d.kind() == kind) {
            Some(slot) => *slot = detector,
            None => self.detectors.push(detector),
        }
    }

    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn run(
        &self,
        frame: &AnalysisFrame<'_>,
        cancel: &CancellationToken,
        progress: Option<&ProgressReporter<'_>>,
    ) -> Result<Vec<DetectorOutcome>> {
        let run_one = |detector: &Arc<dyn Detector>| -> Result<DetectorOutcome> {
            cancel.check()?;
            let outcome = Self::run_detector(detector.as_ref(), frame);
            if let Some(progress) = progress {
                progress.step();
            }
            Ok(outcome)
        };

        if self.parallel {
            self.detectors.par_iter().map(run_one).collect()
        } else {
            self.detectors.iter().map(run_one).collect()
        }
    }

    fn run_detector(detector: &dyn Detector, frame: &AnalysisFrame<'_>) -> DetectorOutcome {
        let kind = detector.kind();
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| detector.analyze(frame))) {
            Ok(Ok(result)) => {
                return DetectorOutcome {
                    kind,
                    result,
                    failed: false,
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        log::warn!("{} detector failed, scoring neutral: {failure}", detector.name());
        DetectorOutcome {
            kind,
            result: DetectorResult::neutral(),
            failed: true,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAnalysis {
    pub outcomes: Vec<DetectorOutcome>,
    pub scores: MethodScores,
    pub ensemble: EnsembleOutcome,
    pub faces: usize,
}

impl FrameAnalysis {
    pub fn assemble(
        outcomes: Vec<DetectorOutcome>,
        faces: usize,
        weights: &EnsembleWeights,
        consensus: &ConsensusConfig,
    ) -> Self {
        let scores = outcomes.iter().map(|o| (o.kind, o.result.score)).collect::<MethodScores>();
        let ensemble = combine(&scores, weights, consensus);

        Self {
            outcomes,
            scores,
            ensemble,
            faces,
        }
    }

    pub fn score(&self) -> u8 {
        self.ensemble.score
    }

    pub fn failed(&self) -> Vec<DetectorKind> {
        self.outcomes.iter().filter(|o| o.failed).map(|o| o.kind).collect()
    }

    /// Indicators in suite order, first occurrence kept. Detectors carrying
    /// no ensemble weight contribute none.
    pub fn indicators(&self, weights: &EnsembleWeights) -> Vec<String> {
        let mut seen = Vec::new();
        let weighted = self.outcomes.iter().filter(|o| weights.weight(o.kind) > 0.0);
        for indicator in weighted.flat_map(|o| o.result.indicators.iter()) {
            if !seen.contains(indicator) {
                seen.push(indicator.clone());
            }
        }
        seen
    }
}
