use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        AnalysisFrame, Detector, DetectorKind, DetectorResult, metric_map,
        scoring::{Ramp, RampInput, score_ramps},
    },
    error::{ForensicsError, Result},
    stats,
};

const GRID: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionRamps {
    pub boundary_ratio: Ramp,
    pub block_variance_cv: Ramp,
    pub inter_block_diff: Ramp,
    pub entropy: Ramp,
    pub peak_count: Ramp,
    pub banding: Ramp,
    pub mean_block_variance: Ramp,
}

impl Default for CompressionRamps {
    fn default() -> Self {
        Self {
            boundary_ratio: Ramp::new(1.05, 0.97),
            block_variance_cv: Ramp::new(0.75, 0.55),
            inter_block_diff: Ramp::new(15.0, 6.0),
            entropy: Ramp::new(7.0, 6.0),
            peak_count: Ramp::new(25.0, 8.0),
            banding: Ramp::new(5.0, 25.0),
            mean_block_variance: Ramp::new(200.0, 40.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub histogram_samples: usize,
    pub peak_min_count: u32,
    pub banding_neighbor_min: u32,
    pub ramps: CompressionRamps,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            histogram_samples: 10_000,
            peak_min_count: 10,
            banding_neighbor_min: 5,
            ramps: CompressionRamps::default(),
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.histogram_samples == 0 {
            return Err(ForensicsError::InvalidParameter(
                "compression histogram_samples must be positive".into(),
            ));
        }
        let r = &self.ramps;
        r.boundary_ratio.validate("compression.boundary_ratio")?;
        r.block_variance_cv.validate("compression.block_variance_cv")?;
        r.inter_block_diff.validate("compression.inter_block_diff")?;
        r.entropy.validate("compression.entropy")?;
        r.peak_count.validate("compression.peak_count")?;
        r.banding.validate("compression.banding")?;
        r.mean_block_variance.validate("compression.mean_block_variance")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockGridStats {
    variance_cv: f64,
    mean_variance: f64,
    inter_block_diff: f64,
    block_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HistogramStats {
    entropy: f64,
    peaks: usize,
    banding: usize,
}

pub struct CompressionAnalyzer {
    config: CompressionConfig,
}

impl CompressionAnalyzer {
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    pub fn with_config(config: CompressionConfig) -> Self {
        Self { config }
    }

    fn pixel(gray: &GrayImage, x: u32, y: u32) -> f64 {
        gray.get_pixel(x, y)[0] as f64
    }

    fn mean_step_at(gray: &GrayImage, offset: u32) -> f64 {
        let (width, height) = gray.dimensions();
        let mut sum = 0.0;
        let mut count = 0usize;

        for y in 0..height {
            for x in (1..width).filter(|x| x % GRID == offset) {
                sum += (Self::pixel(gray, x, y) - Self::pixel(gray, x - 1, y)).abs();
                count += 1;
            }
        }

        for y in (1..height).filter(|y| y % GRID == offset) {
            for x in 0..width {
                sum += (Self::pixel(gray, x, y) - Self::pixel(gray, x, y - 1)).abs();
                count += 1;
            }
        }

        if count == 0 { 0.0 } else { sum / count as f64 }
    }

    fn boundary_ratio(gray: &GrayImage) -> (f64, f64, f64) {
        let boundary = Self::mean_step_at(gray, 0);
        let interior = Self::mean_step_at(gray, GRID / 2);
        (boundary / interior.max(1.0), boundary, interior)
    }

    fn block_grid_stats(gray: &GrayImage) -> BlockGridStats {
        let (width, height) = gray.dimensions();
        let blocks_x = (width / GRID) as usize;
        let blocks_y = (height / GRID) as usize;

        let mut means = vec![0.0; blocks_x * blocks_y];
        let mut variances = vec![0.0; blocks_x * blocks_y];

        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let mut values = Vec::with_capacity((GRID * GRID) as usize);
                for dy in 0..GRID {
                    for dx in 0..GRID {
                        values.push(Self::pixel(gray, bx as u32 * GRID + dx, by as u32 * GRID + dy));
                    }
                }
                let sd = stats::std_dev(&values);
                means[by * blocks_x + bx] = stats::mean(&values);
                variances[by * blocks_x + bx] = sd * sd;
            }
        }

        let mut diffs = Vec::new();
        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let here = means[by * blocks_x + bx];
                if bx + 1 < blocks_x {
                    diffs.push((here - means[by * blocks_x + bx + 1]).abs());
                }
                if by + 1 < blocks_y {
                    diffs.push((here - means[(by + 1) * blocks_x + bx]).abs());
                }
            }
        }

        BlockGridStats {
            variance_cv: stats::coefficient_of_variation(&variances),
            mean_variance: stats::mean(&variances),
            inter_block_diff: stats::mean(&diffs),
            block_count: variances.len(),
        }
    }

    fn sampled_histogram(&self, gray: &GrayImage) -> [u32; 256] {
        let raw = gray.as_raw();
        let step = (raw.len() / self.config.histogram_samples).max(1);
        let mut histogram = [0u32; 256];

        for &value in raw.iter().step_by(step) {
            histogram[value as usize] += 1;
        }

        histogram
    }

    fn histogram_stats(&self, histogram: &[u32; 256]) -> HistogramStats {
        let peaks = (0..histogram.len())
            .filter(|&i| {
                let count = histogram[i];
                let above_left = i == 0 || count > histogram[i - 1];
                let above_right = i == histogram.len() - 1 || count > histogram[i + 1];
                count > self.config.peak_min_count && above_left && above_right
            })
            .count();

        let floor = self.config.banding_neighbor_min;
        let banding = histogram
            .windows(3)
            .filter(|w| w[1] == 0 && w[0] > floor && w[2] > floor)
            .count();

        HistogramStats {
            entropy: stats::shannon_entropy(histogram),
            peaks,
            banding,
        }
    }
}

impl Detector for CompressionAnalyzer {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Compression
    }

    fn analyze(&self, frame: &AnalysisFrame<'_>) -> Result<DetectorResult> {
        let gray = frame.gray();
        let (width, height) = gray.dimensions();
        if width < GRID * 2 || height < GRID * 2 {
            return Err(ForensicsError::ImageTooSmall(GRID * 2));
        }

        let (boundary_ratio, boundary_step, interior_step) = Self::boundary_ratio(gray);
        let grid = Self::block_grid_stats(gray);
        let histogram = self.sampled_histogram(gray);
        let tonal = self.histogram_stats(&histogram);

        let r = &self.config.ramps;
        let ramps = score_ramps(&[
            RampInput::new("boundary_ratio", boundary_ratio, r.boundary_ratio, "No JPEG block grid"),
            RampInput::new("block_variance_cv", grid.variance_cv, r.block_variance_cv, "Uniform block variance"),
            RampInput::new("inter_block_diff", grid.inter_block_diff, r.inter_block_diff, "Smooth transitions between blocks"),
            RampInput::new("entropy", tonal.entropy, r.entropy, "Low tonal entropy"),
            RampInput::new("peak_count", tonal.peaks as f64, r.peak_count, "Sparse tonal histogram"),
            RampInput::new("banding", tonal.banding as f64, r.banding, "Histogram banding"),
            RampInput::new("mean_block_variance", grid.mean_variance, r.mean_block_variance, "Overly smooth blocks"),
        ]);

        log::debug!(
            "compression: boundary_ratio={:.3} entropy={:.2} peaks={} banding={} score={:.1}",
            boundary_ratio,
            tonal.entropy,
            tonal.peaks,
            tonal.banding,
            ramps.score
        );

        let metrics = metric_map([
            ("boundary_ratio", boundary_ratio),
            ("boundary_step", boundary_step),
            ("interior_step", interior_step),
            ("block_count", grid.block_count as f64),
            ("block_variance_cv", grid.variance_cv),
            ("mean_block_variance", grid.mean_variance),
            ("inter_block_diff", grid.inter_block_diff),
            ("entropy", tonal.entropy),
            ("peak_count", tonal.peaks as f64),
            ("banding", tonal.banding as f64),
        ]);

        Ok(DetectorResult::from_ramps(ramps, metrics))
    }
}

impl Default for CompressionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
