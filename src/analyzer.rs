use std::{sync::Arc, time::Instant};

use image::DynamicImage;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    AnalysisConfig, AnalysisResult,
    analysis::{
        AnalysisFrame, Detector, compression::CompressionAnalyzer, edge_coherence::EdgeCoherenceAnalyzer,
        frequency::FrequencyAnalyzer, noise::NoiseAnalyzer, texture::TextureAnalyzer,
    },
    detection::{
        DetectorSuite, FrameAnalysis,
        ensemble::EnsembleWeights,
        face::{FaceDetector, SkinRegionFaceDetector},
        verdict::Verdict,
    },
    engine::DetectionEngine,
    error::{ForensicsError, Result},
    image_utils::PixelBuffer,
    progress::{CancellationToken, ProgressReporter},
    video::{
        EyeSample, TemporalAggregator,
        frames::{FrameSource, sample_frames},
    },
};

#[derive(Clone, Copy)]
struct TimedBuffer<'b> {
    timestamp: f64,
    buffer: &'b PixelBuffer,
    repeated: bool,
}

fn timeline<'b>(frames: impl IntoIterator<Item = (f64, &'b PixelBuffer, bool)>) -> Vec<TimedBuffer<'b>> {
    let mut previous: Option<&PixelBuffer> = None;
    frames
        .into_iter()
        .map(|(timestamp, buffer, backfilled)| {
            let repeated = backfilled || previous == Some(buffer);
            previous = Some(buffer);
            TimedBuffer {
                timestamp,
                buffer,
                repeated,
            }
        })
        .collect()
}

pub struct DeepfakeAnalyzer {
    config: AnalysisConfig,
    engine: DetectionEngine,
    overrides: Vec<Arc<dyn Detector>>,
    face_override: Option<Arc<dyn FaceDetector>>,
    face_detector: Arc<dyn FaceDetector>,
    suite: DetectorSuite,
}

impl DeepfakeAnalyzer {
    pub fn new() -> Self {
        let config = AnalysisConfig::default();
        let engine = DetectionEngine::default();
        let suite = Self::build_suite(&config, &engine, &[]);
        let face_detector = Arc::new(SkinRegionFaceDetector::with_config(config.face.clone()));

        Self {
            config,
            engine,
            overrides: Vec::new(),
            face_override: None,
            face_detector,
            suite,
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self.rebuild();
        self
    }

    pub fn with_engine(mut self, engine: DetectionEngine) -> Self {
        self.engine = engine;
        self.rebuild();
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.overrides.retain(|d| d.kind() != detector.kind());
        self.overrides.push(detector);
        self.rebuild();
        self
    }

    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_override = Some(detector);
        self.rebuild();
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.config.weights.unwrap_or_else(|| self.engine.default_weights())
    }

    fn rebuild(&mut self) {
        self.suite = Self::build_suite(&self.config, &self.engine, &self.overrides);
        self.face_detector = match &self.face_override {
            Some(detector) => Arc::clone(detector),
            None => Arc::new(SkinRegionFaceDetector::with_config(self.config.face.clone())),
        };
    }

    fn build_suite(config: &AnalysisConfig, engine: &DetectionEngine, overrides: &[Arc<dyn Detector>]) -> DetectorSuite {
        let detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::new(FrequencyAnalyzer::with_config(config.frequency.clone())),
            Arc::new(NoiseAnalyzer::with_config(config.noise.clone())),
            Arc::new(CompressionAnalyzer::with_config(config.compression.clone())),
            Arc::new(EdgeCoherenceAnalyzer::with_config(config.edge.clone())),
            Arc::new(TextureAnalyzer::with_config(config.texture.clone())),
            engine.learned_detector(&config.pattern),
        ];

        let mut suite = DetectorSuite::new(detectors).with_parallel(config.parallel);
        for detector in overrides {
            suite.replace(Arc::clone(detector));
        }
        suite
    }

    pub fn analyze<F>(&self, buffers: &[PixelBuffer], on_progress: F) -> Result<AnalysisResult>
    where
        F: Fn(f64) + Sync,
    {
        self.analyze_with_cancel(buffers, on_progress, &CancellationToken::new())
    }

    pub fn analyze_with_cancel<F>(
        &self,
        buffers: &[PixelBuffer],
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult>
    where
        F: Fn(f64) + Sync,
    {
        let started = Instant::now();
        let progress = ProgressReporter::new(&on_progress, buffers.len() * self.suite.len());
        progress.start();

        let interval = self.config.video.frame_interval_secs;
        let frames = timeline(
            buffers
                .iter()
                .enumerate()
                .map(|(i, buffer)| (i as f64 * interval, buffer, false)),
        );

        let result = self
            .config
            .validate()
            .and_then(|()| {
                if frames.is_empty() {
                    return Err(ForensicsError::Decode("no pixel buffers supplied".into()));
                }
                self.run(&frames, frames.len() > 1, &progress, cancel, started)
            })
            .map_err(ForensicsError::into_analysis_failure)?;

        progress.finish();
        Ok(result)
    }

    pub fn analyze_video<F>(&self, source: &dyn FrameSource, on_progress: F) -> Result<AnalysisResult>
    where
        F: Fn(f64) + Sync,
    {
        self.analyze_video_with_cancel(source, on_progress, &CancellationToken::new())
    }

    pub fn analyze_video_with_cancel<F>(
        &self,
        source: &dyn FrameSource,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult>
    where
        F: Fn(f64) + Sync,
    {
        let started = Instant::now();
        let points = &self.config.video.sample_points;
        let progress = ProgressReporter::new(&on_progress, points.len() * self.suite.len());
        progress.start();

        let result = self
            .config
            .validate()
            .and_then(|()| sample_frames(source, points, cancel))
            .and_then(|sampled| {
                let frames = timeline(sampled.iter().map(|s| (s.timestamp, &s.buffer, s.backfilled)));
                self.run(&frames, true, &progress, cancel, started)
            })
            .map_err(ForensicsError::into_analysis_failure)?;

        progress.finish();
        Ok(result)
    }

    pub fn analyze_image(&self, image: &DynamicImage) -> Result<AnalysisResult> {
        self.analyze(&[PixelBuffer::from_image(image)], |_| {})
    }

    pub fn analyze_frame(&self, buffer: &PixelBuffer) -> Result<FrameAnalysis> {
        let timed = TimedBuffer {
            timestamp: 0.0,
            buffer,
            repeated: false,
        };
        let (frame, _) = self.analyze_one(timed, &self.weights(), &CancellationToken::new(), None)?;
        Ok(frame)
    }

    fn analyze_one(
        &self,
        timed: TimedBuffer<'_>,
        weights: &EnsembleWeights,
        cancel: &CancellationToken,
        progress: Option<&ProgressReporter<'_>>,
    ) -> Result<(FrameAnalysis, EyeSample)> {
        cancel.check()?;
        let frame = AnalysisFrame::new(timed.buffer)?;
        let outcomes = self.suite.run(&frame, cancel, progress)?;
        let faces = self.face_detector.count(&frame);
        let eyes = EyeSample::measure(&frame, timed.timestamp, timed.repeated, &self.config.video);

        Ok((
            FrameAnalysis::assemble(outcomes, faces, weights, &self.config.consensus),
            eyes,
        ))
    }

    fn run(
        &self,
        frames: &[TimedBuffer<'_>],
        temporal: bool,
        progress: &ProgressReporter<'_>,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<AnalysisResult> {
        for timed in frames {
            timed.buffer.validate()?;
        }

        let weights = self.weights();
        let analyse = |&timed: &TimedBuffer<'_>| self.analyze_one(timed, &weights, cancel, Some(progress));
        let analysed = if self.config.parallel {
            frames.par_iter().map(analyse).collect::<Result<Vec<_>>>()?
        } else {
            frames.iter().map(analyse).collect::<Result<Vec<_>>>()?
        };
        let (frame_results, eyes): (Vec<FrameAnalysis>, Vec<EyeSample>) = analysed.into_iter().unzip();

        let Some(first) = frame_results.first() else {
            return Err(ForensicsError::NoFrames);
        };

        let (confidence, scores, faces, summary) = if temporal {
            let outcome = TemporalAggregator::with_config(self.config.video.clone()).aggregate(&frame_results, &eyes)?;
            (outcome.confidence, outcome.scores, outcome.faces, Some(outcome.summary))
        } else {
            (first.score(), first.scores.clone(), first.faces, None)
        };

        let mut indicators: Vec<String> = Vec::new();
        let mut failed: Vec<String> = Vec::new();
        for frame in &frame_results {
            for indicator in frame.indicators(&weights) {
                if !indicators.contains(&indicator) {
                    indicators.push(indicator);
                }
            }
            for kind in frame.failed() {
                let name = kind.as_str().to_string();
                if !failed.contains(&name) {
                    failed.push(name);
                }
            }
        }

        let verdict = Verdict::from_confidence(confidence, &self.config.verdict);
        let processing_time_seconds = started.elapsed().as_secs_f64();

        log::info!(
            "analysis complete: frames={} confidence={} verdict={:?} faces={} failed={:?} in {:.3}s",
            frame_results.len(),
            confidence,
            verdict,
            faces,
            failed,
            processing_time_seconds
        );

        Ok(AnalysisResult {
            confidence,
            verdict,
            per_method_scores: scores.to_named(),
            indicators,
            faces_detected: faces,
            frame_count: frame_results.len(),
            processing_time_seconds,
            frame_scores: frame_results.iter().map(FrameAnalysis::score).collect(),
            temporal: summary,
            consensus_rules: first.ensemble.fired.iter().map(|r| r.to_string()).collect(),
            failed_detectors: failed,
        })
    }
}

impl Default for DeepfakeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
