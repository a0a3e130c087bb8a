use ndarray::{Array2, s};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        AnalysisFrame, Detector, DetectorKind, DetectorResult, metric_map,
        scoring::{Ramp, RampInput, score_ramps},
    },
    error::{ForensicsError, Result},
    stats,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseRamps {
    pub std_dev: Ramp,
    pub kurtosis_deviation: Ramp,
    pub skewness: Ramp,
    pub local_uniformity: Ramp,
    pub variance_uniformity: Ramp,
    pub dynamic_range: Ramp,
    pub noise_floor: Ramp,
}

impl Default for NoiseRamps {
    fn default() -> Self {
        Self {
            std_dev: Ramp::new(22.0, 8.0),
            kurtosis_deviation: Ramp::new(0.8, 4.0),
            skewness: Ramp::new(0.4, 2.0),
            local_uniformity: Ramp::new(0.65, 0.45),
            variance_uniformity: Ramp::new(0.9, 0.4),
            dynamic_range: Ramp::new(8.0, 2.0),
            noise_floor: Ramp::new(2.5, 0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub patch_size: usize,
    pub tail_fraction: f64,
    pub ramps: NoiseRamps,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            patch_size: 16,
            tail_fraction: 0.1,
            ramps: NoiseRamps::default(),
        }
    }
}

impl NoiseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.patch_size < 4 {
            return Err(ForensicsError::InvalidParameter(
                "noise patch_size must be at least 4".into(),
            ));
        }
        if !(self.tail_fraction > 0.0 && self.tail_fraction <= 0.5) {
            return Err(ForensicsError::InvalidParameter(
                "noise tail_fraction must be in (0, 0.5]".into(),
            ));
        }
        let r = &self.ramps;
        r.std_dev.validate("noise.std_dev")?;
        r.kurtosis_deviation.validate("noise.kurtosis_deviation")?;
        r.skewness.validate("noise.skewness")?;
        r.local_uniformity.validate("noise.local_uniformity")?;
        r.variance_uniformity.validate("noise.variance_uniformity")?;
        r.dynamic_range.validate("noise.dynamic_range")?;
        r.noise_floor.validate("noise.noise_floor")
    }
}

pub struct NoiseAnalyzer {
    config: NoiseConfig,
}

impl NoiseAnalyzer {
    pub fn new() -> Self {
        Self::with_config(NoiseConfig::default())
    }

    pub fn with_config(config: NoiseConfig) -> Self {
        Self { config }
    }

    /// `4*center - (up + down + left + right)` over interior pixels.
    pub(crate) fn extract_residual(luma: &Array2<f64>) -> Array2<f64> {
        let (height, width) = luma.dim();
        Array2::from_shape_fn((height - 2, width - 2), |(y, x)| {
            let (cy, cx) = (y + 1, x + 1);
            4.0 * luma[[cy, cx]]
                - luma[[cy - 1, cx]]
                - luma[[cy + 1, cx]]
                - luma[[cy, cx - 1]]
                - luma[[cy, cx + 1]]
        })
    }

    fn patch_statistics(&self, residual: &Array2<f64>, luma: &Array2<f64>) -> (Vec<f64>, Vec<f64>) {
        let patch = self.config.patch_size;
        let stride = (patch / 2).max(1);
        let (height, width) = residual.dim();

        let mut local_noise = Vec::new();
        let mut variances = Vec::new();

        if height < patch || width < patch {
            return (local_noise, variances);
        }

        for y in (0..=height - patch).step_by(stride) {
            for x in (0..=width - patch).step_by(stride) {
                let noise_patch = residual.slice(s![y..y + patch, x..x + patch]);
                let values = noise_patch.iter().copied().collect::<Vec<_>>();
                local_noise.push(stats::median_absolute_deviation(&values));

                // residual[y, x] sits over luma[y + 1, x + 1]
                let luma_patch = luma.slice(s![y + 1..y + 1 + patch, x + 1..x + 1 + patch]);
                let pixels = luma_patch.iter().copied().collect::<Vec<_>>();
                let sd = stats::std_dev(&pixels);
                variances.push(sd * sd);
            }
        }

        (local_noise, variances)
    }
}

impl Detector for NoiseAnalyzer {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Noise
    }

    fn analyze(&self, frame: &AnalysisFrame<'_>) -> Result<DetectorResult> {
        let luma = frame.luma();
        let (height, width) = luma.dim();
        let minimum = self.config.patch_size + 2;
        if height < minimum || width < minimum {
            return Err(ForensicsError::ImageTooSmall(minimum as u32));
        }

        let residual = Self::extract_residual(luma);
        let flat = residual.iter().copied().collect::<Vec<_>>();
        let moments = stats::moments(&flat);

        let (local_noise, variances) = self.patch_statistics(&residual, luma);
        let local_uniformity = stats::coefficient_of_variation(&local_noise);
        let variance_uniformity = stats::coefficient_of_variation(&variances);
        let (noise_floor, noise_ceiling) = stats::tail_means(&local_noise, self.config.tail_fraction);
        let dynamic_range = noise_ceiling - noise_floor;
        let kurtosis_deviation = (moments.kurtosis - 3.0).abs();

        let r = &self.config.ramps;
        let ramps = score_ramps(&[
            RampInput::new("std_dev", moments.std_dev, r.std_dev, "Very low noise level"),
            RampInput::new("kurtosis_deviation", kurtosis_deviation, r.kurtosis_deviation, "Non-Gaussian noise distribution"),
            RampInput::new("skewness", moments.skewness.abs(), r.skewness, "Skewed noise distribution"),
            RampInput::new("local_uniformity", local_uniformity, r.local_uniformity, "Unnaturally uniform local noise"),
            RampInput::new("variance_uniformity", variance_uniformity, r.variance_uniformity, "Uniform patch variance"),
            RampInput::new("dynamic_range", dynamic_range, r.dynamic_range, "Narrow noise dynamic range"),
            RampInput::new("noise_floor", noise_floor, r.noise_floor, "Missing sensor noise floor"),
        ]);

        log::debug!(
            "noise: std={:.2} skew={:.3} kurt={:.3} local_uniformity={:.3} score={:.1}",
            moments.std_dev,
            moments.skewness,
            moments.kurtosis,
            local_uniformity,
            ramps.score
        );

        let metrics = metric_map([
            ("std_dev", moments.std_dev),
            ("skewness", moments.skewness),
            ("kurtosis", moments.kurtosis),
            ("excess_kurtosis", moments.excess_kurtosis()),
            ("local_noise_mean", stats::mean(&local_noise)),
            ("local_uniformity", local_uniformity),
            ("variance_uniformity", variance_uniformity),
            ("dynamic_range", dynamic_range),
            ("noise_floor", noise_floor),
            ("patch_count", local_noise.len() as f64),
        ]);

        Ok(DetectorResult::from_ramps(ramps, metrics))
    }
}

impl Default for NoiseAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_frames;

    #[test]
    fn test_residual_of_flat_plane_is_zero() {
        let luma = Array2::from_elem((20, 20), 77.0);
        let residual = NoiseAnalyzer::extract_residual(&luma);
        assert_eq!(residual.dim(), (18, 18));
        assert!(residual.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_residual_isolates_spike() {
        let mut luma = Array2::zeros((5, 5));
        luma[[2, 2]] = 10.0;
        let residual = NoiseAnalyzer::extract_residual(&luma);
        assert_eq!(residual[[1, 1]], 40.0);
        assert_eq!(residual[[0, 1]], -10.0);
        assert_eq!(residual[[0, 0]], 0.0);
    }

    #[test]
    fn test_patch_grid_uses_half_stride() {
        let buffer = test_frames::uniform(128);
        let frame = AnalysisFrame::new(&buffer).unwrap();
        let result = NoiseAnalyzer::new().analyze(&frame).unwrap();
        // interior 222 px: (222 - 16) / 8 + 1 = 26 per axis
        assert_eq!(result.metrics["patch_count"], 676.0);
    }

    #[test]
    fn test_uniform_frame_has_no_noise() {
        let buffer = test_frames::uniform(128);
        let frame = AnalysisFrame::new(&buffer).unwrap();
        let result = NoiseAnalyzer::new().analyze(&frame).unwrap();

        assert_eq!(result.metrics["std_dev"], 0.0);
        assert_eq!(result.metrics["skewness"], 0.0);
        assert_eq!(result.metrics["excess_kurtosis"], 0.0);
        assert!(result.score >= 70, "score {}", result.score);
        assert!(result.indicators.iter().any(|i| i == "Very low noise level"));
    }

    #[test]
    fn test_strong_noise_scores_low() {
        let buffer = test_frames::hashed_noise(128.0, 60.0);
        let frame = AnalysisFrame::new(&buffer).unwrap();
        let result = NoiseAnalyzer::new().analyze(&frame).unwrap();

        assert!(result.metrics["std_dev"] > 22.0);
        assert!(result.metrics["noise_floor"] > 2.5);
        assert!(result.score < 50, "score {}", result.score);
    }
}
