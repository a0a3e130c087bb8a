use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::scoring::BandRamp,
    error::{ForensicsError, Result},
    image_utils::fractional_crop,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeRegion {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Default for EyeRegion {
    fn default() -> Self {
        Self {
            left: 0.25,
            top: 0.30,
            right: 0.75,
            bottom: 0.45,
        }
    }
}

impl EyeRegion {
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 <= self.left && self.left < self.right && self.right <= 1.0;
        let ordered = ordered && 0.0 <= self.top && self.top < self.bottom && self.bottom <= 1.0;
        if !ordered {
            return Err(ForensicsError::InvalidParameter(
                "eye region must be an ordered fraction box inside [0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn pixels<'a>(&self, gray: &'a GrayImage) -> impl Iterator<Item = u8> + 'a {
        let (width, height) = gray.dimensions();
        let (left, top, right, bottom) = fractional_crop(width, height, self.left, self.top, self.right, self.bottom);
        (top..bottom).flat_map(move |y| (left..right).map(move |x| gray.get_pixel(x, y)[0]))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub near_white: u8,
    pub near_black: u8,
    pub ear_base: f64,
    pub ear_span: f64,
    pub closed_below: f64,
    pub min_frames: usize,
    pub rate: BandRamp,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            near_white: 200,
            near_black: 50,
            ear_base: 0.15,
            ear_span: 0.25,
            closed_below: 0.21,
            min_frames: 6,
            rate: BandRamp::new(0.05, 0.2, 0.6, 1.0),
        }
    }
}

impl BlinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.near_black >= self.near_white {
            return Err(ForensicsError::InvalidParameter(
                "blink near_black must be below near_white".into(),
            ));
        }
        if self.min_frames < 3 {
            return Err(ForensicsError::InvalidParameter(
                "blink min_frames must be at least 3".into(),
            ));
        }
        self.rate.validate("blink.rate")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlinkAnalysis {
    pub blinks: usize,
    pub blinks_per_second: f64,
    pub score: f64,
}

pub fn eye_aspect_proxy(gray: &GrayImage, region: &EyeRegion, config: &BlinkConfig) -> f64 {
    let mut total = 0usize;
    let mut contrast = 0usize;
    for value in region.pixels(gray) {
        total += 1;
        if value > config.near_white || value < config.near_black {
            contrast += 1;
        }
    }

    let fraction = if total == 0 { 0.0 } else { contrast as f64 / total as f64 };
    config.ear_base + fraction * config.ear_span
}

/// Counts open -> closed -> open transitions. Leading closed frames are not
/// a blink, neither is a sequence that ends closed.
pub fn count_blinks(ears: &[f64], closed_below: f64) -> usize {
    let mut blinks = 0;
    let mut seen_open = false;
    let mut closed = false;

    for &ear in ears {
        let is_closed = ear < closed_below;
        match (closed, is_closed) {
            (false, true) if seen_open => closed = true,
            (true, false) => {
                blinks += 1;
                closed = false;
            }
            _ => {}
        }
        if !is_closed {
            seen_open = true;
        }
    }

    blinks
}

pub fn analyze_blinks(samples: &[(f64, f64)], config: &BlinkConfig) -> Option<BlinkAnalysis> {
    if samples.len() < config.min_frames {
        return None;
    }

    let first = samples.first()?.0;
    let last = samples.last()?.0;
    let span = last - first;
    if span <= 0.0 {
        return None;
    }

    let ears = samples.iter().map(|&(_, ear)| ear).collect::<Vec<_>>();
    let blinks = count_blinks(&ears, config.closed_below);
    let blinks_per_second = blinks as f64 / span;
    let score = config.rate.score(blinks_per_second);

    log::debug!("blink: {blinks} blink(s) over {span:.2}s -> {blinks_per_second:.3}/s score={score:.1}");

    Some(BlinkAnalysis {
        blinks,
        blinks_per_second,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blink_state_machine() {
        let t = 0.21;
        assert_eq!(count_blinks(&[0.3, 0.18, 0.3], t), 1);
        assert_eq!(count_blinks(&[0.3, 0.18, 0.18, 0.3, 0.18, 0.3], t), 2);
        // starts closed
        assert_eq!(count_blinks(&[0.18, 0.3, 0.3], t), 0);
        // ends closed
        assert_eq!(count_blinks(&[0.3, 0.3, 0.18], t), 0);
        assert_eq!(count_blinks(&[0.3; 6], t), 0);
    }

    #[test]
    fn test_eye_proxy_range() {
        let config = BlinkConfig::default();
        let region = EyeRegion::default();

        let flat = GrayImage::from_pixel(224, 224, image::Luma([128]));
        assert!((eye_aspect_proxy(&flat, &region, &config) - 0.15).abs() < 1e-12);

        let bright = GrayImage::from_pixel(224, 224, image::Luma([250]));
        assert!((eye_aspect_proxy(&bright, &region, &config) - 0.40).abs() < 1e-12);
    }

    #[test]
    fn test_needs_enough_frames_and_time() {
        let config = BlinkConfig::default();
        let few = [(0.0, 0.3), (1.0, 0.3), (2.0, 0.3)];
        assert!(analyze_blinks(&few, &config).is_none());

        let frozen = [(1.0, 0.3); 6];
        assert!(analyze_blinks(&frozen, &config).is_none());
    }

    #[test]
    fn test_blink_rate_scoring() {
        let config = BlinkConfig::default();

        // no blinks in 5 s: below the natural band
        let staring = (0..6).map(|i| (i as f64, 0.3)).collect::<Vec<_>>();
        let result = analyze_blinks(&staring, &config).unwrap();
        assert_eq!(result.blinks, 0);
        assert_eq!(result.score, 100.0);

        // two blinks in 5 s = 0.4/s: natural
        let natural = [(0.0, 0.3), (1.0, 0.18), (2.0, 0.3), (3.0, 0.18), (4.0, 0.3), (5.0, 0.3)];
        let result = analyze_blinks(&natural, &config).unwrap();
        assert_eq!(result.blinks, 2);
        assert_eq!(result.score, 0.0);
    }
}
