use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        AnalysisFrame, Detector, DetectorKind, DetectorResult, metric_map,
        noise::NoiseAnalyzer,
        scoring::{Ramp, RampInput, score_ramps},
    },
    error::Result,
    image_utils::PixelBuffer,
    stats,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternRamps {
    pub saturation_spread: Ramp,
    pub chroma_residual_ratio: Ramp,
    pub channel_correlation: Ramp,
}

impl Default for PatternRamps {
    fn default() -> Self {
        Self {
            saturation_spread: Ramp::new(0.18, 0.08),
            chroma_residual_ratio: Ramp::new(0.35, 0.10),
            channel_correlation: Ramp::new(0.85, 0.98),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub ramps: PatternRamps,
}

impl PatternConfig {
    pub fn validate(&self) -> Result<()> {
        let r = &self.ramps;
        r.saturation_spread.validate("pattern.saturation_spread")?;
        r.chroma_residual_ratio.validate("pattern.chroma_residual_ratio")?;
        r.channel_correlation.validate("pattern.channel_correlation")
    }
}

struct ColorPlanes {
    red: Array2<f64>,
    blue: Array2<f64>,
    rg: Array2<f64>,
    bg: Array2<f64>,
    saturation: Vec<f64>,
}

pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new() -> Self {
        Self::with_config(PatternConfig::default())
    }

    pub fn with_config(config: PatternConfig) -> Self {
        Self { config }
    }

    fn split_channels(buffer: &PixelBuffer) -> ColorPlanes {
        let (width, height) = buffer.dimensions();
        let shape = (height as usize, width as usize);
        let mut planes = ColorPlanes {
            red: Array2::zeros(shape),
            blue: Array2::zeros(shape),
            rg: Array2::zeros(shape),
            bg: Array2::zeros(shape),
            saturation: Vec::with_capacity(shape.0 * shape.1),
        };

        for y in 0..height {
            for x in 0..width {
                let rgb = buffer.rgb_at(x, y);
                let idx = (y as usize, x as usize);
                let [r, g, b] = rgb.map(f64::from);

                planes.red[idx] = r;
                planes.blue[idx] = b;
                // opponent channels, exactly zero on neutral pixels
                planes.rg[idx] = r - g;
                planes.bg[idx] = b - g;

                let max = rgb.iter().copied().max().unwrap_or(0) as f64;
                let min = rgb.iter().copied().min().unwrap_or(0) as f64;
                planes.saturation.push(if max > 0.0 { (max - min) / max } else { 0.0 });
            }
        }

        planes
    }

    fn mean_abs(plane: &Array2<f64>) -> f64 {
        if plane.is_empty() {
            return 0.0;
        }
        plane.iter().map(|v| v.abs()).sum::<f64>() / plane.len() as f64
    }

    fn correlation(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        let mut sum_product = 0.0;
        let mut sum_a = 0.0;
        let mut sum_b = 0.0;
        for (&x, &y) in a.iter().zip(b.iter()) {
            sum_product += x * y;
            sum_a += x * x;
            sum_b += y * y;
        }

        stats::ratio_or(sum_product, (sum_a * sum_b).sqrt(), 1.0)
    }
}

impl Detector for PatternDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Pattern
    }

    fn analyze(&self, frame: &AnalysisFrame<'_>) -> Result<DetectorResult> {
        let planes = Self::split_channels(frame.buffer());

        let saturation_spread = stats::std_dev(&planes.saturation);

        let luma_residual = Self::mean_abs(&NoiseAnalyzer::extract_residual(frame.luma()));
        let chroma_residual = (Self::mean_abs(&NoiseAnalyzer::extract_residual(&planes.rg))
            + Self::mean_abs(&NoiseAnalyzer::extract_residual(&planes.bg)))
            / 2.0;
        let chroma_residual_ratio = stats::ratio_or(chroma_residual, luma_residual, 0.0);

        let channel_correlation = Self::correlation(
            &NoiseAnalyzer::extract_residual(&planes.red),
            &NoiseAnalyzer::extract_residual(&planes.blue),
        );

        let r = &self.config.ramps;
        let ramps = score_ramps(&[
            RampInput::new("saturation_spread", saturation_spread, r.saturation_spread, "Narrow saturation range"),
            RampInput::new("chroma_residual_ratio", chroma_residual_ratio, r.chroma_residual_ratio, "Missing chroma noise"),
            RampInput::new("channel_correlation", channel_correlation, r.channel_correlation, "Colour channels move in lockstep"),
        ]);

        log::debug!(
            "pattern: saturation_spread={:.3} chroma_ratio={:.3} channel_corr={:.3} score={:.1}",
            saturation_spread,
            chroma_residual_ratio,
            channel_correlation,
            ramps.score
        );

        let metrics = metric_map([
            ("saturation_spread", saturation_spread),
            ("chroma_residual_ratio", chroma_residual_ratio),
            ("channel_correlation", channel_correlation),
        ]);

        Ok(DetectorResult::from_ramps(ramps, metrics))
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}
