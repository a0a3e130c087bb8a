use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use ndarray::Array2;
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
pub struct EdgeCoherenceRamps {
    pub center_outer_ratio: Ramp,
    pub ring_anomaly: Ramp,
    pub discontinuity_rate: Ramp,
    pub circular_spike: Ramp,
    pub local_variance_uniformity: Ramp,
    pub mean_gradient: Ramp,
}

impl Default for EdgeCoherenceRamps {
    fn default() -> Self {
        Self {
            center_outer_ratio: Ramp::new(1.0, 0.5),
            ring_anomaly: Ramp::new(1.2, 2.0),
            discontinuity_rate: Ramp::new(0.05, 0.15),
            circular_spike: Ramp::new(1.2, 1.8),
            local_variance_uniformity: Ramp::new(1.0, 0.4),
            mean_gradient: Ramp::new(30.0, 8.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeCoherenceConfig {
    /// Fractions of `min(half_width, half_height)`.
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub window_size: usize,
    pub jump_threshold: f64,
    pub circle_count: usize,
    pub circle_spacing: f64,
    pub ramps: EdgeCoherenceRamps,
}

impl Default for EdgeCoherenceConfig {
    fn default() -> Self {
        Self {
            inner_radius: 0.4,
            outer_radius: 0.7,
            window_size: 5,
            jump_threshold: 30.0,
            circle_count: 10,
            circle_spacing: 5.0,
            ramps: EdgeCoherenceRamps::default(),
        }
    }
}

impl EdgeCoherenceConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.inner_radius && self.inner_radius < self.outer_radius && self.outer_radius <= 1.0) {
            return Err(ForensicsError::InvalidParameter(
                "edge radii must satisfy 0 < inner < outer <= 1".into(),
            ));
        }
        if self.window_size < 2 || self.circle_count == 0 || self.circle_spacing <= 0.0 {
            return Err(ForensicsError::InvalidParameter(
                "edge window_size >= 2, circle_count > 0 and circle_spacing > 0 required".into(),
            ));
        }
        let r = &self.ramps;
        r.center_outer_ratio.validate("edge.center_outer_ratio")?;
        r.ring_anomaly.validate("edge.ring_anomaly")?;
        r.discontinuity_rate.validate("edge.discontinuity_rate")?;
        r.circular_spike.validate("edge.circular_spike")?;
        r.local_variance_uniformity.validate("edge.local_variance_uniformity")?;
        r.mean_gradient.validate("edge.mean_gradient")
    }
}

pub struct GradientField {
    pub magnitude: Array2<f64>,
    pub direction: Array2<f64>,
}

impl GradientField {
    pub fn compute(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);

        let mut magnitude = Array2::zeros((height as usize, width as usize));
        let mut direction = Array2::zeros((height as usize, width as usize));

        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                let dx = gx.get_pixel(x, y)[0] as f64;
                let dy = gy.get_pixel(x, y)[0] as f64;
                magnitude[[y as usize, x as usize]] = (dx * dx + dy * dy).sqrt();
                direction[[y as usize, x as usize]] = dy.atan2(dx);
            }
        }

        Self { magnitude, direction }
    }

    pub fn interior(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let (height, width) = self.magnitude.dim();
        (1..height.saturating_sub(1))
            .flat_map(move |y| (1..width.saturating_sub(1)).map(move |x| (x, y, self.magnitude[[y, x]])))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct RegionStats {
    mean: f64,
    std_dev: f64,
    count: usize,
}

impl RegionStats {
    fn from_values(values: &[f64]) -> Self {
        Self {
            mean: stats::mean(values),
            std_dev: stats::std_dev(values),
            count: values.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RadialRegions {
    center: RegionStats,
    ring: RegionStats,
    outer: RegionStats,
    overall: RegionStats,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SequenceStats {
    discontinuities: usize,
    variance_uniformity: f64,
}

pub struct EdgeCoherenceAnalyzer {
    config: EdgeCoherenceConfig,
}

impl EdgeCoherenceAnalyzer {
    pub fn new() -> Self {
        Self::with_config(EdgeCoherenceConfig::default())
    }

    pub fn with_config(config: EdgeCoherenceConfig) -> Self {
        Self { config }
    }

    fn radial_regions(&self, field: &GradientField) -> RadialRegions {
        let (height, width) = field.magnitude.dim();
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        let half_min = cx.min(cy);
        let inner = self.config.inner_radius * half_min;
        let outer = self.config.outer_radius * half_min;

        let mut center = Vec::new();
        let mut ring = Vec::new();
        let mut rest = Vec::new();
        let mut all = Vec::new();

        for (x, y, magnitude) in field.interior() {
            let distance = (x as f64 - cx).hypot(y as f64 - cy);
            if distance < inner {
                center.push(magnitude);
            } else if distance < outer {
                ring.push(magnitude);
            } else {
                rest.push(magnitude);
            }
            all.push(magnitude);
        }

        RadialRegions {
            center: RegionStats::from_values(&center),
            ring: RegionStats::from_values(&ring),
            outer: RegionStats::from_values(&rest),
            overall: RegionStats::from_values(&all),
        }
    }

    fn sequence_stats(&self, magnitudes: &[f64]) -> SequenceStats {
        let windows = magnitudes
            .chunks_exact(self.config.window_size)
            .map(|w| {
                let sd = stats::std_dev(w);
                (stats::mean(w), sd * sd)
            })
            .collect::<Vec<_>>();

        let discontinuities = windows
            .windows(2)
            .filter(|pair| (pair[1].0 - pair[0].0).abs() > self.config.jump_threshold)
            .count();

        let variances = windows.iter().map(|&(_, v)| v).collect::<Vec<_>>();

        SequenceStats {
            discontinuities,
            variance_uniformity: stats::coefficient_of_variation(&variances),
        }
    }

    fn circular_spike_ratio(&self, field: &GradientField) -> f64 {
        let (height, width) = field.magnitude.dim();
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        let max_radius = cx.min(cy) - 1.0;
        if max_radius <= 1.0 {
            return 1.0;
        }

        let count = self.config.circle_count;
        let radial_means = (1..=count)
            .filter_map(|k| {
                let radius = max_radius * k as f64 / count as f64;
                let circumference = 2.0 * std::f64::consts::PI * radius;
                let samples = ((circumference / self.config.circle_spacing) as usize).max(8);

                let values = (0..samples)
                    .filter_map(|i| {
                        let angle = 2.0 * std::f64::consts::PI * i as f64 / samples as f64;
                        let x = (cx + radius * angle.cos()).round();
                        let y = (cy + radius * angle.sin()).round();
                        let inside = x >= 1.0 && y >= 1.0 && x < (width - 1) as f64 && y < (height - 1) as f64;
                        inside.then(|| field.magnitude[[y as usize, x as usize]])
                    })
                    .collect::<Vec<_>>();

                (!values.is_empty()).then(|| stats::mean(&values))
            })
            .collect::<Vec<_>>();

        if radial_means.is_empty() {
            return 1.0;
        }

        let max = radial_means.iter().copied().fold(f64::MIN, f64::max);
        stats::ratio_or(max, stats::mean(&radial_means), 1.0)
    }
}

impl Detector for EdgeCoherenceAnalyzer {
    fn kind(&self) -> DetectorKind {
        DetectorKind::EdgeCoherence
    }

    fn analyze(&self, frame: &AnalysisFrame<'_>) -> Result<DetectorResult> {
        let (width, height) = frame.dimensions();
        if width < 8 || height < 8 {
            return Err(ForensicsError::ImageTooSmall(8));
        }

        let field = GradientField::compute(frame.gray());
        let regions = self.radial_regions(&field);
        let magnitudes = field.interior().map(|(_, _, m)| m).collect::<Vec<_>>();
        let sequence = self.sequence_stats(&magnitudes);
        let spike_ratio = self.circular_spike_ratio(&field);

        let center_outer_ratio = stats::ratio_or(regions.center.mean, regions.outer.mean, 1.0);
        let ring_anomaly = stats::ratio_or(regions.ring.std_dev, regions.center.std_dev, 1.0);
        let discontinuity_rate = sequence.discontinuities as f64 / magnitudes.len().max(1) as f64 * 1000.0;

        let r = &self.config.ramps;
        let ramps = score_ramps(&[
            RampInput::new("center_outer_ratio", center_outer_ratio, r.center_outer_ratio, "Smoothed central region"),
            RampInput::new("ring_anomaly", ring_anomaly, r.ring_anomaly, "Blending ring around the centre"),
            RampInput::new("discontinuity_rate", discontinuity_rate, r.discontinuity_rate, "Abrupt gradient discontinuities"),
            RampInput::new("circular_spike", spike_ratio, r.circular_spike, "Circular seam in gradients"),
            RampInput::new("local_variance_uniformity", sequence.variance_uniformity, r.local_variance_uniformity, "Uniform local edge variance"),
            RampInput::new("mean_gradient", regions.overall.mean, r.mean_gradient, "Weak overall edges"),
        ]);

        log::debug!(
            "edge: center/outer={:.3} ring={:.3} discontinuity={:.3} spike={:.3} score={:.1}",
            center_outer_ratio,
            ring_anomaly,
            discontinuity_rate,
            spike_ratio,
            ramps.score
        );

        let metrics = metric_map([
            ("center_mean", regions.center.mean),
            ("center_std", regions.center.std_dev),
            ("ring_mean", regions.ring.mean),
            ("ring_std", regions.ring.std_dev),
            ("outer_mean", regions.outer.mean),
            ("outer_std", regions.outer.std_dev),
            ("mean_gradient", regions.overall.mean),
            ("gradient_std", regions.overall.std_dev),
            ("center_pixels", regions.center.count as f64),
            ("center_outer_ratio", center_outer_ratio),
            ("ring_anomaly", ring_anomaly),
            ("discontinuities", sequence.discontinuities as f64),
            ("discontinuity_rate", discontinuity_rate),
            ("local_variance_uniformity", sequence.variance_uniformity),
            ("circular_spike_ratio", spike_ratio),
        ]);

        Ok(DetectorResult::from_ramps(ramps, metrics))
    }
}

impl Default for EdgeCoherenceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
