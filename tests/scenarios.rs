//! End-to-end behaviour of the analyzer on synthetic inputs.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use deepfake_forensics::{
    AnalysisConfig, AnalysisFrame, CancellationToken, DeepfakeAnalyzer, DetectionEngine, Detector, DetectorKind,
    DetectorResult, ForensicsError, FrameSequence, FrameSource, ModelRegistry, PixelBuffer, SyntheticModel, Verdict,
    detection::{ensemble::EnsembleWeights, verdict::VerdictThresholds},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

type TestResult<T> = deepfake_forensics::ForensicsResult<T>;

fn uniform(value: u8) -> PixelBuffer {
    PixelBuffer::filled(224, 224, [value, value, value])
}

/// Flat gray frame with a dark blob inside the eye band.
fn dark_eyes() -> PixelBuffer {
    let mut data = Vec::with_capacity(224 * 224 * 4);
    for y in 0..224 {
        for x in 0..224 {
            let v = if (100..124).contains(&x) && (75..90).contains(&y) { 20 } else { 150 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    PixelBuffer::new(data, 224, 224, 4).unwrap()
}

/// Flat base plus independent per-pixel Gaussian noise (Box-Muller).
fn gaussian_noise(base: f64, sigma: f64, seed: u64) -> PixelBuffer {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(224 * 224 * 4);
    for _ in 0..224 * 224 {
        let u1 = 1.0 - rng.random::<f64>();
        let u2 = rng.random::<f64>();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let v = (base + z * sigma).round().clamp(0.0, 255.0) as u8;
        data.extend_from_slice(&[v, v, v, 255]);
    }
    PixelBuffer::new(data, 224, 224, 4).unwrap()
}

struct Fixed(DetectorKind, u8);

impl Detector for Fixed {
    fn kind(&self) -> DetectorKind {
        self.0
    }

    fn analyze(&self, _frame: &AnalysisFrame<'_>) -> TestResult<DetectorResult> {
        Ok(DetectorResult {
            score: self.1,
            indicators: vec![format!("{} fired", self.0)],
            ..Default::default()
        })
    }
}

struct Broken(DetectorKind);

impl Detector for Broken {
    fn kind(&self) -> DetectorKind {
        self.0
    }

    fn analyze(&self, _frame: &AnalysisFrame<'_>) -> TestResult<DetectorResult> {
        Err(ForensicsError::DetectorFailed {
            detector: self.0.to_string(),
            reason: "forced".into(),
        })
    }
}

/// Decodes only the first two seconds of a ten-second clip.
struct TruncatedClip;

impl FrameSource for TruncatedClip {
    fn duration_secs(&self) -> f64 {
        10.0
    }

    fn frame_at(&self, timestamp: f64) -> TestResult<PixelBuffer> {
        if timestamp > 2.0 {
            return Err(ForensicsError::Decode(format!("truncated at {timestamp}")));
        }
        Ok(dark_eyes())
    }
}

struct Exploding(DetectorKind);

impl Detector for Exploding {
    fn kind(&self) -> DetectorKind {
        self.0
    }

    fn analyze(&self, _frame: &AnalysisFrame<'_>) -> TestResult<DetectorResult> {
        panic!("{} exploded", self.0)
    }
}

struct NoDecoder;

impl FrameSource for NoDecoder {
    fn duration_secs(&self) -> f64 {
        4.0
    }

    fn frame_at(&self, timestamp: f64) -> TestResult<PixelBuffer> {
        Err(ForensicsError::Decode(format!("no frame at {timestamp}")))
    }
}

struct ConstantModel;

impl SyntheticModel for ConstantModel {
    fn name(&self) -> &str {
        "constant"
    }

    fn predict(&self, _frame: &AnalysisFrame<'_>) -> TestResult<f64> {
        Ok(0.9)
    }
}

fn without_timing(mut result: deepfake_forensics::AnalysisResult) -> deepfake_forensics::AnalysisResult {
    result.processing_time_seconds = 0.0;
    result
}

#[test]
fn test_uniform_gray_is_flagged() {
    let result = DeepfakeAnalyzer::new().analyze(&[uniform(128)], |_| {}).unwrap();

    assert!(result.confidence > 70, "confidence {}", result.confidence);
    assert_eq!(result.verdict, Verdict::Deepfake);
    assert!(result.method_score(DetectorKind::Noise).unwrap() >= 70);
    assert!(result.method_score(DetectorKind::Frequency).unwrap() >= 80);
    assert!(result.consensus_rules.iter().any(|r| r == "strong_fake_consensus"));
    assert!(result.failed_detectors.is_empty());
}

#[test]
fn test_gaussian_noise_is_not_flagged() {
    let analyzer = DeepfakeAnalyzer::new();
    for seed in 1..=5 {
        let result = analyzer.analyze(&[gaussian_noise(128.0, 20.0, seed)], |_| {}).unwrap();

        assert!(result.method_score(DetectorKind::Noise).unwrap() < 50, "seed {seed}");
        assert!(result.confidence < 38, "seed {seed}: confidence {}", result.confidence);
        assert_eq!(result.verdict, Verdict::Authentic, "seed {seed}");
    }
}

#[test]
fn test_four_fake_votes_force_consensus() {
    let analyzer = [
        (DetectorKind::Frequency, 90),
        (DetectorKind::Noise, 90),
        (DetectorKind::Compression, 90),
        (DetectorKind::EdgeCoherence, 90),
        (DetectorKind::Texture, 10),
    ]
    .into_iter()
    .fold(DeepfakeAnalyzer::new(), |analyzer, (kind, score)| {
        analyzer.with_detector(Arc::new(Fixed(kind, score)))
    });

    let result = analyzer.analyze(&[uniform(40)], |_| {}).unwrap();
    assert!(result.confidence >= 72);
    assert_eq!(result.consensus_rules[0], "strong_fake_consensus");
}

#[test]
fn test_verdict_boundaries() {
    let thresholds = VerdictThresholds::default();
    assert_eq!(Verdict::from_confidence(37, &thresholds), Verdict::Authentic);
    assert_eq!(Verdict::from_confidence(38, &thresholds), Verdict::Inconclusive);
    assert_eq!(Verdict::from_confidence(61, &thresholds), Verdict::Inconclusive);
    assert_eq!(Verdict::from_confidence(62, &thresholds), Verdict::Deepfake);
}

#[test]
fn test_identical_frames_get_one_consistency_bonus() {
    let frames = vec![uniform(128); 3];
    let result = DeepfakeAnalyzer::new().analyze(&frames, |_| {}).unwrap();
    let temporal = result.temporal.as_ref().unwrap();

    assert_eq!(result.frame_count, 3);
    assert_eq!(temporal.std_dev, 0.0);
    assert_eq!(temporal.adjustment, 3.0);
    assert!(temporal.frame_scores.iter().all(|&s| s == temporal.frame_scores[0]));
    assert_eq!(result.confidence, (temporal.frame_scores[0] + 3).min(100));
}

#[test]
fn test_identical_frames_with_visible_pupil_get_only_the_bonus() {
    let frames = vec![dark_eyes(); 3];
    let result = DeepfakeAnalyzer::new().analyze(&frames, |_| {}).unwrap();
    let temporal = result.temporal.as_ref().unwrap();

    assert!(temporal.pupil.is_none());
    assert_eq!(temporal.eye_score, None);
    assert_eq!(result.confidence, (temporal.frame_scores[0] + 3).min(100));
}

#[test]
fn test_backfilled_clip_ignores_eye_heuristics() {
    let result = DeepfakeAnalyzer::new().analyze_video(&TruncatedClip, |_| {}).unwrap();
    let temporal = result.temporal.as_ref().unwrap();

    assert_eq!(result.frame_count, 3);
    assert!(temporal.blink.is_none() && temporal.pupil.is_none());
    assert_eq!(temporal.eye_score, None);

    let mean = temporal.frame_scores.iter().map(|&s| s as f64).sum::<f64>() / 3.0;
    let expected = (mean + temporal.adjustment).round().clamp(0.0, 100.0) as u8;
    assert_eq!(result.confidence, expected);
}

#[test]
fn test_panicking_texture_counts_as_neutral() {
    let analyzer = DeepfakeAnalyzer::new().with_detector(Arc::new(Exploding(DetectorKind::Texture)));

    let result = analyzer.analyze(&[uniform(128), uniform(90)], |_| {}).unwrap();
    assert_eq!(result.method_score(DetectorKind::Texture), Some(50));
    assert_eq!(result.failed_detectors, vec!["texture".to_string()]);
    assert_eq!(result.frame_count, 2);
}

#[test]
fn test_unweighted_pattern_slot_adds_no_indicators() {
    let analyzer = DeepfakeAnalyzer::new()
        .with_detector(Arc::new(Fixed(DetectorKind::Pattern, 95)))
        .with_detector(Arc::new(Fixed(DetectorKind::Noise, 80)));

    let result = analyzer.analyze(&[gaussian_noise(128.0, 20.0, 9)], |_| {}).unwrap();
    assert_eq!(result.method_score(DetectorKind::Pattern), Some(95));
    assert!(result.indicators.contains(&"noise fired".to_string()));
    assert!(!result.indicators.contains(&"pattern fired".to_string()));
}

#[test]
fn test_failing_texture_counts_as_neutral() {
    let analyzer = DeepfakeAnalyzer::new().with_detector(Arc::new(Broken(DetectorKind::Texture)));
    let buffer = gaussian_noise(128.0, 20.0, 11);

    let result = analyzer.analyze(std::slice::from_ref(&buffer), |_| {}).unwrap();
    assert_eq!(result.method_score(DetectorKind::Texture), Some(50));
    assert_eq!(result.failed_detectors, vec!["texture".to_string()]);

    let frame = analyzer.analyze_frame(&buffer).unwrap();
    let weights = EnsembleWeights::CANONICAL;
    let expected = DetectorKind::PIXEL_STATISTICS
        .iter()
        .map(|&kind| weights.weight(kind) * frame.scores.get(kind) as f64)
        .sum::<f64>();
    assert_eq!(frame.scores.get(DetectorKind::Texture), 50);
    assert!((frame.ensemble.raw - expected).abs() < 1e-9);
}

#[test]
fn test_analysis_is_deterministic() {
    let buffers = vec![gaussian_noise(120.0, 12.0, 1), uniform(90), gaussian_noise(120.0, 12.0, 2)];
    let analyzer = DeepfakeAnalyzer::new();

    let first = without_timing(analyzer.analyze(&buffers, |_| {}).unwrap());
    let second = without_timing(analyzer.analyze(&buffers, |_| {}).unwrap());
    assert_eq!(first, second);
}

#[test]
fn test_parallel_matches_sequential() {
    let buffers = vec![gaussian_noise(100.0, 25.0, 3), uniform(200)];
    let parallel = DeepfakeAnalyzer::new();
    let sequential = DeepfakeAnalyzer::new().with_config(AnalysisConfig {
        parallel: false,
        ..Default::default()
    });

    assert_eq!(
        without_timing(parallel.analyze(&buffers, |_| {}).unwrap()),
        without_timing(sequential.analyze(&buffers, |_| {}).unwrap())
    );
}

#[test]
fn test_progress_is_monotone_and_completes() {
    let seen = Mutex::new(Vec::new());
    let buffers = vec![uniform(128), gaussian_noise(128.0, 20.0, 5), uniform(64)];

    DeepfakeAnalyzer::new()
        .analyze(&buffers, |p| seen.lock().unwrap().push(p))
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.first(), Some(&0.0));
    assert_eq!(seen.last(), Some(&1.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_undecodable_video_reports_no_frames() {
    let err = DeepfakeAnalyzer::new().analyze_video(&NoDecoder, |_| {}).unwrap_err();
    assert!(matches!(err, ForensicsError::AnalysisFailed { .. }));
    assert!(err.is_no_frames());
}

#[test]
fn test_malformed_buffer_is_a_decode_error() {
    let err = DeepfakeAnalyzer::new()
        .analyze(&[uniform(10), PixelBuffer::filled(0, 0, [0, 0, 0])], |_| {})
        .unwrap_err();
    assert!(err.is_decode_error());

    let err = DeepfakeAnalyzer::new().analyze(&[], |_| {}).unwrap_err();
    assert!(err.is_decode_error());
}

#[test]
fn test_video_samples_three_frames() {
    let frames = (0..10).map(|i| uniform(100 + i)).collect();
    let source = FrameSequence::new(frames, 5.0).unwrap();

    let result = DeepfakeAnalyzer::new().analyze_video(&source, |_| {}).unwrap();
    assert_eq!(result.frame_count, 3);
    assert!(result.temporal.is_some());
}

#[test]
fn test_model_loads_once_and_fills_learned_slot() {
    let registry = ModelRegistry::new();
    let loads = AtomicUsize::new(0);
    let loader = || -> TestResult<Arc<dyn SyntheticModel>> {
        loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ConstantModel))
    };

    let first = DetectionEngine::from_registry(&registry, loader);
    let second = DetectionEngine::from_registry(&registry, loader);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(first.is_model_backed() && second.is_model_backed());

    let result = DeepfakeAnalyzer::new()
        .with_engine(first)
        .analyze(&[uniform(128)], |_| {})
        .unwrap();
    assert_eq!(result.per_method_scores.get("model"), Some(&90));
    assert!(!result.per_method_scores.contains_key("pattern"));
}

#[test]
fn test_cancelled_analysis_is_not_wrapped() {
    let token = CancellationToken::new();
    token.cancel();

    let err = DeepfakeAnalyzer::new()
        .analyze_with_cancel(&[uniform(128)], |_| {}, &token)
        .unwrap_err();
    assert!(matches!(err, ForensicsError::Cancelled));
}
