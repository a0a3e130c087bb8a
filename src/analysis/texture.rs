use std::f64::consts::PI;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        AnalysisFrame, Detector, DetectorKind, DetectorResult,
        edge_coherence::GradientField,
        metric_map,
        scoring::{Ramp, RampInput, score_ramps},
    },
    error::{ForensicsError, Result},
    stats,
};

/// Clockwise from the top-left neighbour; bit `i` belongs to offset `i`.
const LBP_NEIGHBORS: [(i32, i32); 8] = [(-1, -1), (0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0)];

const ORIENTATION_BINS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureRamps {
    pub lbp_entropy: Ramp,
    pub uniform_ratio: Ramp,
    pub orientation_uniformity: Ramp,
    pub complexity_uniformity: Ramp,
    pub low_complexity_ratio: Ramp,
    pub glcm_energy: Ramp,
    pub glcm_homogeneity: Ramp,
}

impl Default for TextureRamps {
    fn default() -> Self {
        Self {
            lbp_entropy: Ramp::new(6.5, 5.0),
            uniform_ratio: Ramp::new(0.6, 0.85),
            orientation_uniformity: Ramp::new(0.8, 0.95),
            complexity_uniformity: Ramp::new(1.0, 0.4),
            low_complexity_ratio: Ramp::new(0.1, 0.4),
            glcm_energy: Ramp::new(0.01, 0.05),
            glcm_homogeneity: Ramp::new(0.7, 0.9),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    pub patch_size: u32,
    pub orientation_magnitude_min: f64,
    pub low_complexity_threshold: f64,
    pub glcm_levels: usize,
    pub ramps: TextureRamps,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            patch_size: 16,
            orientation_magnitude_min: 5.0,
            low_complexity_threshold: 5.0,
            glcm_levels: 16,
            ramps: TextureRamps::default(),
        }
    }
}

impl TextureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.patch_size < 4 {
            return Err(ForensicsError::InvalidParameter(
                "texture patch_size must be at least 4".into(),
            ));
        }
        if !matches!(self.glcm_levels, 2 | 4 | 8 | 16 | 32 | 64 | 128 | 256) {
            return Err(ForensicsError::InvalidParameter(
                "texture glcm_levels must be a power of two between 2 and 256".into(),
            ));
        }
        let r = &self.ramps;
        r.lbp_entropy.validate("texture.lbp_entropy")?;
        r.uniform_ratio.validate("texture.uniform_ratio")?;
        r.orientation_uniformity.validate("texture.orientation_uniformity")?;
        r.complexity_uniformity.validate("texture.complexity_uniformity")?;
        r.low_complexity_ratio.validate("texture.low_complexity_ratio")?;
        r.glcm_energy.validate("texture.glcm_energy")?;
        r.glcm_homogeneity.validate("texture.glcm_homogeneity")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlcmFeatures {
    pub contrast: f64,
    pub energy: f64,
    pub homogeneity: f64,
    pub correlation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PatchRegularity {
    complexity_uniformity: f64,
    low_complexity_ratio: f64,
    mean_complexity: f64,
    mean_energy: f64,
    patch_count: usize,
}

pub fn is_uniform_pattern(code: u8) -> bool {
    (code ^ code.rotate_right(1)).count_ones() <= 2
}

pub struct TextureAnalyzer {
    config: TextureConfig,
}

impl TextureAnalyzer {
    pub fn new() -> Self {
        Self::with_config(TextureConfig::default())
    }

    pub fn with_config(config: TextureConfig) -> Self {
        Self { config }
    }

    fn lbp_codes(gray: &GrayImage) -> Vec<u8> {
        let (width, height) = gray.dimensions();
        let mut codes = Vec::with_capacity((width.saturating_sub(2) * height.saturating_sub(2)) as usize);

        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                let center = gray.get_pixel(x, y)[0];
                let code = LBP_NEIGHBORS
                    .iter()
                    .enumerate()
                    .fold(0u8, |code, (bit, &(dx, dy))| {
                        let neighbor = gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0];
                        if neighbor >= center { code | (1 << bit) } else { code }
                    });
                codes.push(code);
            }
        }

        codes
    }

    fn lbp_statistics(codes: &[u8]) -> (f64, f64) {
        let mut histogram = [0u32; 256];
        for &code in codes {
            histogram[code as usize] += 1;
        }

        let uniform = codes.iter().filter(|&&c| is_uniform_pattern(c)).count();
        let uniform_ratio = if codes.is_empty() { 0.0 } else { uniform as f64 / codes.len() as f64 };

        (stats::shannon_entropy(&histogram), uniform_ratio)
    }

    fn orientation_uniformity(&self, gray: &GrayImage) -> (f64, usize) {
        let field = GradientField::compute(gray);
        let mut histogram = [0u32; ORIENTATION_BINS];
        let mut counted = 0usize;

        for (x, y, magnitude) in field.interior() {
            if magnitude <= self.config.orientation_magnitude_min {
                continue;
            }
            let angle = field.direction[[y, x]];
            let bin = (((angle + PI) / (2.0 * PI)) * ORIENTATION_BINS as f64) as usize;
            histogram[bin.min(ORIENTATION_BINS - 1)] += 1;
            counted += 1;
        }

        let max_entropy = (ORIENTATION_BINS as f64).log2();
        (stats::shannon_entropy(&histogram) / max_entropy, counted)
    }

    fn patch_regularity(&self, gray: &GrayImage) -> PatchRegularity {
        let (width, height) = gray.dimensions();
        let patch = self.config.patch_size;
        let stride = (patch / 2).max(1);

        let mut complexities = Vec::new();
        let mut energies = Vec::new();

        if width >= patch && height >= patch {
            for y in (0..=height - patch).step_by(stride as usize) {
                for x in (0..=width - patch).step_by(stride as usize) {
                    let mut values = Vec::with_capacity((patch * patch) as usize);
                    for dy in 0..patch {
                        for dx in 0..patch {
                            values.push(gray.get_pixel(x + dx, y + dy)[0] as f64);
                        }
                    }
                    complexities.push(stats::std_dev(&values));
                    energies.push(values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64);
                }
            }
        }

        let low = complexities
            .iter()
            .filter(|&&c| c < self.config.low_complexity_threshold)
            .count();

        PatchRegularity {
            complexity_uniformity: stats::coefficient_of_variation(&complexities),
            low_complexity_ratio: if complexities.is_empty() { 0.0 } else { low as f64 / complexities.len() as f64 },
            mean_complexity: stats::mean(&complexities),
            mean_energy: stats::mean(&energies),
            patch_count: complexities.len(),
        }
    }

    pub fn glcm_features(&self, gray: &GrayImage) -> GlcmFeatures {
        let levels = self.config.glcm_levels;
        let shift = 8 - levels.trailing_zeros();
        let (width, height) = gray.dimensions();

        let mut matrix = vec![0.0f64; levels * levels];
        let mut pairs = 0usize;
        for y in 0..height {
            for x in 0..width.saturating_sub(1) {
                let i = (gray.get_pixel(x, y)[0] >> shift) as usize;
                let j = (gray.get_pixel(x + 1, y)[0] >> shift) as usize;
                matrix[i * levels + j] += 1.0;
                pairs += 1;
            }
        }

        if pairs == 0 {
            return GlcmFeatures::default();
        }
        for p in matrix.iter_mut() {
            *p /= pairs as f64;
        }

        let cells = || {
            matrix
                .iter()
                .enumerate()
                .map(move |(idx, &p)| ((idx / levels) as f64, (idx % levels) as f64, p))
        };

        let mean_i = cells().map(|(i, _, p)| i * p).sum::<f64>();
        let mean_j = cells().map(|(_, j, p)| j * p).sum::<f64>();
        let sigma_i = cells().map(|(i, _, p)| (i - mean_i).powi(2) * p).sum::<f64>().sqrt();
        let sigma_j = cells().map(|(_, j, p)| (j - mean_j).powi(2) * p).sum::<f64>().sqrt();

        let mut features = GlcmFeatures::default();
        let mut covariance = 0.0;
        for (i, j, p) in cells() {
            let d = i - j;
            features.contrast += d * d * p;
            features.energy += p * p;
            features.homogeneity += p / (1.0 + d * d);
            covariance += (i - mean_i) * (j - mean_j) * p;
        }
        features.correlation = if sigma_i > 1e-12 && sigma_j > 1e-12 {
            covariance / (sigma_i * sigma_j)
        } else {
            0.0
        };

        features
    }
}

impl Detector for TextureAnalyzer {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Texture
    }

    fn analyze(&self, frame: &AnalysisFrame<'_>) -> Result<DetectorResult> {
        let gray = frame.gray();
        let (width, height) = gray.dimensions();
        if width < self.config.patch_size || height < self.config.patch_size {
            return Err(ForensicsError::ImageTooSmall(self.config.patch_size));
        }

        let codes = Self::lbp_codes(gray);
        let (lbp_entropy, uniform_ratio) = Self::lbp_statistics(&codes);
        let (orientation_uniformity, oriented_pixels) = self.orientation_uniformity(gray);
        let patches = self.patch_regularity(gray);
        let glcm = self.glcm_features(gray);

        let r = &self.config.ramps;
        let ramps = score_ramps(&[
            RampInput::new("lbp_entropy", lbp_entropy, r.lbp_entropy, "Low micro-texture diversity"),
            RampInput::new("uniform_ratio", uniform_ratio, r.uniform_ratio, "Overly regular local patterns"),
            RampInput::new("orientation_uniformity", orientation_uniformity, r.orientation_uniformity, "Isotropic gradient orientations"),
            RampInput::new("complexity_uniformity", patches.complexity_uniformity, r.complexity_uniformity, "Uniform texture complexity"),
            RampInput::new("low_complexity_ratio", patches.low_complexity_ratio, r.low_complexity_ratio, "Large texture-free areas"),
            RampInput::new("glcm_energy", glcm.energy, r.glcm_energy, "Repetitive gray-level structure"),
            RampInput::new("glcm_homogeneity", glcm.homogeneity, r.glcm_homogeneity, "Overly homogeneous texture"),
        ]);

        log::debug!(
            "texture: lbp_entropy={:.3} uniform={:.3} orientation={:.3} glcm_energy={:.4} score={:.1}",
            lbp_entropy,
            uniform_ratio,
            orientation_uniformity,
            glcm.energy,
            ramps.score
        );

        let metrics = metric_map([
            ("lbp_entropy", lbp_entropy),
            ("uniform_ratio", uniform_ratio),
            ("orientation_uniformity", orientation_uniformity),
            ("oriented_pixels", oriented_pixels as f64),
            ("complexity_uniformity", patches.complexity_uniformity),
            ("low_complexity_ratio", patches.low_complexity_ratio),
            ("mean_complexity", patches.mean_complexity),
            ("mean_energy", patches.mean_energy),
            ("patch_count", patches.patch_count as f64),
            ("glcm_contrast", glcm.contrast),
            ("glcm_energy", glcm.energy),
            ("glcm_homogeneity", glcm.homogeneity),
            ("glcm_correlation", glcm.correlation),
        ]);

        Ok(DetectorResult::from_ramps(ramps, metrics))
    }
}

impl Default for TextureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
