use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    analysis::{
        AnalysisFrame, Detector, DetectorKind, DetectorResult, metric_map,
        pattern::{PatternConfig, PatternDetector},
    },
    detection::ensemble::EnsembleWeights,
    error::{ForensicsError, Result},
};

pub trait SyntheticModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, frame: &AnalysisFrame<'_>) -> Result<f64>;
}

pub struct ModelDetector {
    model: Arc<dyn SyntheticModel>,
}

impl ModelDetector {
    pub fn new(model: Arc<dyn SyntheticModel>) -> Self {
        Self { model }
    }
}

impl Detector for ModelDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Model
    }

    fn analyze(&self, frame: &AnalysisFrame<'_>) -> Result<DetectorResult> {
        let probability = self.model.predict(frame)?;
        if !probability.is_finite() {
            return Err(ForensicsError::Model(format!(
                "model '{}' returned a non-finite probability",
                self.model.name()
            )));
        }
        let probability = probability.clamp(0.0, 1.0);

        let indicators = if probability >= 0.8 {
            vec![format!("Learned model '{}' flags synthetic content", self.model.name())]
        } else {
            Vec::new()
        };

        Ok(DetectorResult::from_score(
            probability * 100.0,
            indicators,
            metric_map([("probability", probability)]),
        ))
    }

    fn name(&self) -> &str {
        self.model.name()
    }
}

#[derive(Clone, Default)]
pub enum EngineBackend {
    #[default]
    HeuristicOnly,
    ModelBacked(Arc<dyn SyntheticModel>),
}

#[derive(Clone, Default)]
pub struct DetectionEngine {
    backend: EngineBackend,
}

impl DetectionEngine {
    pub fn heuristic() -> Self {
        Self {
            backend: EngineBackend::HeuristicOnly,
        }
    }

    pub fn with_model(model: Arc<dyn SyntheticModel>) -> Self {
        Self {
            backend: EngineBackend::ModelBacked(model),
        }
    }

    pub fn from_registry<F>(registry: &ModelRegistry, loader: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn SyntheticModel>>,
    {
        match registry.get_or_load(loader) {
            Some(model) => Self::with_model(model),
            None => Self::heuristic(),
        }
    }

    pub fn backend(&self) -> &EngineBackend {
        &self.backend
    }

    pub fn is_model_backed(&self) -> bool {
        matches!(self.backend, EngineBackend::ModelBacked(_))
    }

    pub fn default_weights(&self) -> EnsembleWeights {
        match self.backend {
            EngineBackend::HeuristicOnly => EnsembleWeights::CANONICAL,
            EngineBackend::ModelBacked(_) => EnsembleWeights::MODEL_BACKED,
        }
    }

    pub fn learned_detector(&self, pattern: &PatternConfig) -> Arc<dyn Detector> {
        match &self.backend {
            EngineBackend::HeuristicOnly => Arc::new(PatternDetector::with_config(pattern.clone())),
            EngineBackend::ModelBacked(model) => Arc::new(ModelDetector::new(Arc::clone(model))),
        }
    }
}

impl std::fmt::Debug for DetectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backend {
            EngineBackend::HeuristicOnly => f.write_str("DetectionEngine(HeuristicOnly)"),
            EngineBackend::ModelBacked(model) => write!(f, "DetectionEngine(ModelBacked({}))", model.name()),
        }
    }
}

#[derive(Default)]
enum LoadState {
    #[default]
    Pending,
    Loaded(Arc<dyn SyntheticModel>),
    Unavailable,
}

/// One-time model initialisation shared by every engine built from it.
/// The loader runs at most once; concurrent callers wait for that run.
#[derive(Default)]
pub struct ModelRegistry {
    state: Mutex<LoadState>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load<F>(&self, loader: F) -> Option<Arc<dyn SyntheticModel>>
    where
        F: FnOnce() -> Result<Arc<dyn SyntheticModel>>,
    {
        let mut state = self.state.lock();
        if let LoadState::Pending = *state {
            *state = match loader() {
                Ok(model) => {
                    log::info!("loaded synthetic-media model '{}'", model.name());
                    LoadState::Loaded(model)
                }
                Err(e) => {
                    log::warn!("model unavailable, using pattern heuristic: {e}");
                    LoadState::Unavailable
                }
            };
        }

        match &*state {
            LoadState::Loaded(model) => Some(Arc::clone(model)),
            LoadState::Pending | LoadState::Unavailable => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), LoadState::Loaded(_))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::analysis::test_frames;

    struct FixedModel(f64);

    impl SyntheticModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _frame: &AnalysisFrame<'_>) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_model_detector_scales_probability() {
        let buffer = test_frames::uniform(100);
        let frame = AnalysisFrame::new(&buffer).unwrap();
        let result = ModelDetector::new(Arc::new(FixedModel(0.87))).analyze(&frame).unwrap();
        assert_eq!(result.score, 87);
        assert_eq!(result.indicators.len(), 1);
    }

    #[test]
    fn test_model_detector_rejects_nan() {
        let buffer = test_frames::uniform(100);
        let frame = AnalysisFrame::new(&buffer).unwrap();
        let err = ModelDetector::new(Arc::new(FixedModel(f64::NAN))).analyze(&frame).unwrap_err();
        assert!(matches!(err, ForensicsError::Model(_)));
    }

    #[test]
    fn test_engine_defaults() {
        let engine = DetectionEngine::heuristic();
        assert_eq!(engine.default_weights(), EnsembleWeights::CANONICAL);
        assert_eq!(engine.learned_detector(&PatternConfig::default()).kind(), DetectorKind::Pattern);

        let engine = DetectionEngine::with_model(Arc::new(FixedModel(0.5)));
        assert!(engine.is_model_backed());
        assert_eq!(engine.default_weights(), EnsembleWeights::MODEL_BACKED);
        assert_eq!(engine.learned_detector(&PatternConfig::default()).kind(), DetectorKind::Model);
    }

    #[test]
    fn test_registry_loads_once() {
        let registry = ModelRegistry::new();
        let calls = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    registry.get_or_load(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new(FixedModel(0.5)) as Arc<dyn SyntheticModel>)
                    })
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_loaded());
    }

    #[test]
    fn test_failed_load_falls_back_to_heuristic() {
        let registry = ModelRegistry::new();
        let engine = DetectionEngine::from_registry(&registry, || Err(ForensicsError::Model("missing weights".into())));
        assert!(!engine.is_model_backed());

        // a failed load is not retried
        let engine = DetectionEngine::from_registry(&registry, || Ok(Arc::new(FixedModel(0.5)) as Arc<dyn SyntheticModel>));
        assert!(!engine.is_model_backed());
    }
}
