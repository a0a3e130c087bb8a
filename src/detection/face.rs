use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::AnalysisFrame,
    error::{ForensicsError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &AnalysisFrame<'_>) -> Vec<Region>;

    fn count(&self, frame: &AnalysisFrame<'_>) -> usize {
        self.detect(frame).len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub enabled: bool,
    pub cell_size: u32,
    pub cell_skin_fraction: f64,
    pub min_cells: usize,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub cb_range: (f64, f64),
    pub cr_range: (f64, f64),
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cell_size: 8,
            cell_skin_fraction: 0.5,
            min_cells: 6,
            min_aspect: 0.5,
            max_aspect: 2.0,
            cb_range: (77.0, 127.0),
            cr_range: (133.0, 173.0),
        }
    }
}

impl FaceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cell_size == 0 || !(0.0..=1.0).contains(&self.cell_skin_fraction) {
            return Err(ForensicsError::InvalidParameter(
                "face cell_size must be positive and cell_skin_fraction in [0, 1]".into(),
            ));
        }
        if self.min_aspect <= 0.0 || self.min_aspect > self.max_aspect {
            return Err(ForensicsError::InvalidParameter(
                "face aspect bounds must satisfy 0 < min_aspect <= max_aspect".into(),
            ));
        }
        Ok(())
    }
}

pub struct SkinRegionFaceDetector {
    config: FaceConfig,
}

impl SkinRegionFaceDetector {
    pub fn new() -> Self {
        Self::with_config(FaceConfig::default())
    }

    pub fn with_config(config: FaceConfig) -> Self {
        Self { config }
    }

    pub fn is_skin(&self, rgb: [u8; 3]) -> bool {
        let [r, g, b] = rgb.map(f64::from);
        let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
        let (cb_min, cb_max) = self.config.cb_range;
        let (cr_min, cr_max) = self.config.cr_range;

        (cb_min..=cb_max).contains(&cb) && (cr_min..=cr_max).contains(&cr)
    }

    fn skin_cells(&self, frame: &AnalysisFrame<'_>) -> GrayImage {
        let buffer = frame.buffer();
        let (width, height) = buffer.dimensions();
        let cell = self.config.cell_size;
        let cells_x = width / cell;
        let cells_y = height / cell;

        GrayImage::from_fn(cells_x, cells_y, |cx, cy| {
            let mut skin = 0u32;
            for y in cy * cell..(cy + 1) * cell {
                for x in cx * cell..(cx + 1) * cell {
                    if self.is_skin(buffer.rgb_at(x, y)) {
                        skin += 1;
                    }
                }
            }
            let fraction = skin as f64 / (cell * cell) as f64;
            Luma([if fraction >= self.config.cell_skin_fraction { 255 } else { 0 }])
        })
    }
}

impl FaceDetector for SkinRegionFaceDetector {
    fn detect(&self, frame: &AnalysisFrame<'_>) -> Vec<Region> {
        if !self.config.enabled {
            return Vec::new();
        }

        let cells = self.skin_cells(frame);
        let (cells_x, cells_y) = cells.dimensions();
        if cells_x == 0 || cells_y == 0 {
            return Vec::new();
        }

        let labels = connected_components(&cells, Connectivity::Eight, Luma([0u8]));

        // label -> (min_x, min_y, max_x, max_y, cell count)
        let mut components: Vec<Option<(u32, u32, u32, u32, usize)>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0] as usize;
            if label == 0 {
                continue;
            }
            if components.len() < label {
                components.resize(label, None);
            }
            let entry = &mut components[label - 1];
            *entry = Some(match *entry {
                None => (x, y, x, y, 1),
                Some((x0, y0, x1, y1, n)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y), n + 1),
            });
        }

        let cell = self.config.cell_size;
        let mut regions = components
            .into_iter()
            .flatten()
            .filter(|&(_, _, _, _, n)| n >= self.config.min_cells)
            .map(|(x0, y0, x1, y1, _)| Region {
                x: x0 * cell,
                y: y0 * cell,
                width: (x1 - x0 + 1) * cell,
                height: (y1 - y0 + 1) * cell,
            })
            .filter(|r| (self.config.min_aspect..=self.config.max_aspect).contains(&r.aspect_ratio()))
            .collect::<Vec<_>>();
        regions.sort_by_key(|r| (r.y, r.x));

        log::debug!("faces: {} candidate region(s)", regions.len());
        regions
    }
}

impl Default for SkinRegionFaceDetector {
    fn default() -> Self {
        Self::new()
    }
}
