use image::{DynamicImage, GrayImage, Luma, RgbaImage, imageops::FilterType};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ForensicsError, Result};

pub const CANONICAL_SIZE: u32 = 224;
pub const MIN_DIMENSION: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl PixelBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self> {
        let buffer = Self {
            data,
            width,
            height,
            channels,
        };
        buffer.validate()?;
        Ok(buffer)
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = (0..width as usize * height as usize)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect();

        Self {
            data,
            width,
            height,
            channels: 4,
        }
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        Self::from_image_with_size(image, CANONICAL_SIZE, CANONICAL_SIZE)
    }

    pub fn from_image_with_size(image: &DynamicImage, width: u32, height: u32) -> Self {
        let rgba = image.to_rgba8();
        let resized = if rgba.dimensions() == (width, height) {
            rgba
        } else {
            image::imageops::resize(&rgba, width, height, FilterType::Triangle)
        };

        Self::from_rgba(resized)
    }

    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            channels: 4,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ForensicsError::Decode(format!(
                "buffer has zero dimension ({}x{})",
                self.width, self.height
            )));
        }

        if self.channels != 3 && self.channels != 4 {
            return Err(ForensicsError::Decode(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }

        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.data.len() != expected {
            return Err(ForensicsError::Decode(format!(
                "buffer holds {} bytes, expected {} for {}x{}x{}",
                self.data.len(),
                expected,
                self.width,
                self.height,
                self.channels
            )));
        }

        if self.width < MIN_DIMENSION || self.height < MIN_DIMENSION {
            return Err(ForensicsError::ImageTooSmall(MIN_DIMENSION));
        }

        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * self.channels as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    pub fn pixels_rgb(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data
            .chunks_exact(self.channels as usize)
            .map(|px| [px[0], px[1], px[2]])
    }

    pub fn to_gray(&self) -> GrayImage {
        rgb_to_gray(self)
    }
}

pub fn luma(rgb: [u8; 3]) -> u8 {
    (0.299 * rgb[0] as f64 + 0.587 * rgb[1] as f64 + 0.114 * rgb[2] as f64) as u8
}

pub fn rgb_to_gray(buffer: &PixelBuffer) -> GrayImage {
    let (width, height) = buffer.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (idx, rgb) in buffer.pixels_rgb().enumerate() {
        let x = (idx % width as usize) as u32;
        let y = (idx / width as usize) as u32;
        gray.put_pixel(x, y, Luma([luma(rgb)]));
    }

    gray
}

pub fn gray_to_array(image: &GrayImage) -> Array2<f64> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f64;
    }

    arr
}

pub fn fractional_crop(width: u32, height: u32, x0: f64, y0: f64, x1: f64, y1: f64) -> (u32, u32, u32, u32) {
    let left = ((width as f64 * x0.clamp(0.0, 1.0)) as u32).min(width - 1);
    let top = ((height as f64 * y0.clamp(0.0, 1.0)) as u32).min(height - 1);
    let right = ((width as f64 * x1.clamp(0.0, 1.0)) as u32).clamp(left + 1, width);
    let bottom = ((height as f64 * y1.clamp(0.0, 1.0)) as u32).clamp(top + 1, height);

    (left, top, right, bottom)
}
