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

const BLOCK: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRamps {
    pub complexity: Ramp,
    pub ac_cv: Ramp,
    pub complexity_std: Ramp,
    pub periodic_ratio: Ramp,
    pub dc_cv: Ramp,
    pub ac_energy: Ramp,
}

impl Default for FrequencyRamps {
    fn default() -> Self {
        Self {
            complexity: Ramp::new(0.40, 0.15),
            ac_cv: Ramp::new(0.60, 0.40),
            complexity_std: Ramp::new(0.25, 0.12),
            periodic_ratio: Ramp::new(0.03, 0.12),
            dc_cv: Ramp::new(0.25, 0.18),
            ac_energy: Ramp::new(80.0, 40.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Blocks whose coefficients satisfy `u + v <= low_band_limit` count as low frequency.
    pub low_band_limit: usize,
    pub mid_coefficient_threshold: f64,
    pub corner_coefficient_threshold: f64,
    pub ramps: FrequencyRamps,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            low_band_limit: 3,
            mid_coefficient_threshold: 50.0,
            corner_coefficient_threshold: 30.0,
            ramps: FrequencyRamps::default(),
        }
    }
}

impl FrequencyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.low_band_limit == 0 || self.low_band_limit >= 2 * (BLOCK - 1) {
            return Err(ForensicsError::InvalidParameter(
                "frequency low_band_limit must split the 8x8 block".into(),
            ));
        }
        let r = &self.ramps;
        r.complexity.validate("frequency.complexity")?;
        r.ac_cv.validate("frequency.ac_cv")?;
        r.complexity_std.validate("frequency.complexity_std")?;
        r.periodic_ratio.validate("frequency.periodic_ratio")?;
        r.dc_cv.validate("frequency.dc_cv")?;
        r.ac_energy.validate("frequency.ac_energy")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockFeatures {
    dc: f64,
    ac_energy: f64,
    complexity: f64,
    periodic: bool,
}

pub struct FrequencyAnalyzer {
    config: FrequencyConfig,
    dct_matrix: [[f64; BLOCK]; BLOCK],
    dct_matrix_t: [[f64; BLOCK]; BLOCK],
}

impl FrequencyAnalyzer {
    pub fn new() -> Self {
        Self::with_config(FrequencyConfig::default())
    }

    pub fn with_config(config: FrequencyConfig) -> Self {
        let dct_matrix = Self::compute_dct_matrix();
        let dct_matrix_t = Self::transpose_matrix(&dct_matrix);

        Self {
            config,
            dct_matrix,
            dct_matrix_t,
        }
    }

    pub fn compute_dct_matrix() -> [[f64; BLOCK]; BLOCK] {
        let n = BLOCK as f64;
        let mut matrix = [[0.0f64; BLOCK]; BLOCK];

        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = if i == 0 {
                    1.0 / n.sqrt()
                } else {
                    (2.0 / n).sqrt()
                        * (std::f64::consts::PI * (2.0 * j as f64 + 1.0) * i as f64 / (2.0 * n)).cos()
                };
            }
        }

        matrix
    }

    fn transpose_matrix(matrix: &[[f64; BLOCK]; BLOCK]) -> [[f64; BLOCK]; BLOCK] {
        let mut result = [[0.0f64; BLOCK]; BLOCK];
        for i in 0..BLOCK {
            for j in 0..BLOCK {
                result[i][j] = matrix[j][i];
            }
        }

        result
    }

    pub fn dct_2d(&self, block: &[[f64; BLOCK]; BLOCK]) -> [[f64; BLOCK]; BLOCK] {
        let mut temp = [[0.0f64; BLOCK]; BLOCK];
        let mut result = [[0.0f64; BLOCK]; BLOCK];

        for i in 0..BLOCK {
            for j in 0..BLOCK {
                temp[i][j] = (0..BLOCK).map(|k| self.dct_matrix[i][k] * block[k][j]).sum();
            }
        }

        for i in 0..BLOCK {
            for j in 0..BLOCK {
                result[i][j] = (0..BLOCK).map(|k| temp[i][k] * self.dct_matrix_t[k][j]).sum();
            }
        }

        result
    }

    fn extract_block(luma: &Array2<f64>, bx: usize, by: usize) -> [[f64; BLOCK]; BLOCK] {
        let view = luma.slice(s![by..by + BLOCK, bx..bx + BLOCK]);
        let mut block = [[0.0f64; BLOCK]; BLOCK];

        for ((y, x), &value) in view.indexed_iter() {
            block[y][x] = value;
        }

        block
    }

    fn block_features(&self, coeffs: &[[f64; BLOCK]; BLOCK]) -> BlockFeatures {
        let mut ac_sq = 0.0;
        let mut low = 0.0;
        let mut high = 0.0;

        for (v, row) in coeffs.iter().enumerate() {
            for (u, &c) in row.iter().enumerate() {
                if u == 0 && v == 0 {
                    continue;
                }
                let energy = c * c;
                ac_sq += energy;
                if u + v <= self.config.low_band_limit {
                    low += energy;
                } else {
                    high += energy;
                }
            }
        }

        let periodic = coeffs[4][4].abs() > self.config.mid_coefficient_threshold
            || coeffs[BLOCK - 1][BLOCK - 1].abs() > self.config.corner_coefficient_threshold;

        BlockFeatures {
            dc: coeffs[0][0].abs(),
            ac_energy: ac_sq.sqrt(),
            complexity: high / low.max(1.0),
            periodic,
        }
    }

    fn collect_blocks(&self, luma: &Array2<f64>) -> Vec<BlockFeatures> {
        let (height, width) = luma.dim();
        let blocks_x = width / BLOCK;
        let blocks_y = height / BLOCK;

        let mut features = Vec::with_capacity(blocks_x * blocks_y);
        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let block = Self::extract_block(luma, bx * BLOCK, by * BLOCK);
                let coeffs = self.dct_2d(&block);
                features.push(self.block_features(&coeffs));
            }
        }

        features
    }
}

impl Detector for FrequencyAnalyzer {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Frequency
    }

    fn analyze(&self, frame: &AnalysisFrame<'_>) -> Result<DetectorResult> {
        let blocks = self.collect_blocks(frame.luma());
        if blocks.is_empty() {
            return Err(ForensicsError::ImageTooSmall(BLOCK as u32));
        }

        let dc = blocks.iter().map(|b| b.dc).collect::<Vec<_>>();
        let ac = blocks.iter().map(|b| b.ac_energy).collect::<Vec<_>>();
        let complexity = blocks.iter().map(|b| b.complexity).collect::<Vec<_>>();
        let periodic_ratio = blocks.iter().filter(|b| b.periodic).count() as f64 / blocks.len() as f64;

        let dc_mean = stats::mean(&dc);
        let dc_cv = stats::coefficient_of_variation(&dc);
        let ac_mean = stats::mean(&ac);
        let ac_cv = stats::coefficient_of_variation(&ac);
        let complexity_mean = stats::mean(&complexity);
        let complexity_std = stats::std_dev(&complexity);

        let r = &self.config.ramps;
        let ramps = score_ramps(&[
            RampInput::new("complexity", complexity_mean, r.complexity, "Low frequency-domain complexity"),
            RampInput::new("ac_cv", ac_cv, r.ac_cv, "Uniform AC energy across blocks"),
            RampInput::new("complexity_std", complexity_std, r.complexity_std, "Consistent complexity across blocks"),
            RampInput::new("periodic_ratio", periodic_ratio, r.periodic_ratio, "Periodic frequency artifacts"),
            RampInput::new("dc_cv", dc_cv, r.dc_cv, "Uniform DC distribution"),
            RampInput::new("ac_energy", ac_mean, r.ac_energy, "Low AC energy (overly smooth)"),
        ]);

        log::debug!(
            "frequency: blocks={} complexity={:.3} ac_cv={:.3} periodic={:.3} score={:.1}",
            blocks.len(),
            complexity_mean,
            ac_cv,
            periodic_ratio,
            ramps.score
        );

        let metrics = metric_map([
            ("block_count", blocks.len() as f64),
            ("dc_mean", dc_mean),
            ("dc_std", stats::std_dev(&dc)),
            ("dc_cv", dc_cv),
            ("ac_energy_mean", ac_mean),
            ("ac_energy_std", stats::std_dev(&ac)),
            ("ac_cv", ac_cv),
            ("complexity_mean", complexity_mean),
            ("complexity_std", complexity_std),
            ("periodic_ratio", periodic_ratio),
        ]);

        Ok(DetectorResult::from_ramps(ramps, metrics))
    }
}

impl Default for FrequencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
