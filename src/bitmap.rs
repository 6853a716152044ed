//! Rendered page image to thermal-head raster chunks.
//!
//! RGBA page → grayscale → binary bitmap → 24-dot strips. Inside a strip the
//! bytes are column-major, three per column, with the most significant bit of
//! each byte at the top:
//!
//! ```text
//! column x:  byte 0 = rows 0..8   byte 1 = rows 8..16   byte 2 = rows 16..24
//! ```

use std::path::Path;

use image::{GrayImage, Luma, RgbaImage};
use serde::Deserialize;

use crate::error::Result;

pub const CHUNK_HEIGHT: usize = 24;
pub const BYTES_PER_COLUMN: usize = CHUNK_HEIGHT / 8;

/// Gray levels below this print as black.
pub const DEFAULT_WHITE_THRESHOLD: u8 = 230;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrayscaleAlgorithm {
    /// Weighted sum of the encoded channels. Fast.
    #[default]
    Luminance,
    /// Linearize sRGB, weight, then re-encode.
    Gamma,
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    y.round().clamp(0.0, 255.0) as u8
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = f32::from(c) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(y: f32) -> u8 {
    let c = if y <= 0.003_130_8 {
        12.92 * y
    } else {
        1.055 * y.powf(1.0 / 2.4) - 0.055
    };
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

fn gamma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.2126 * srgb_to_linear(r) + 0.7152 * srgb_to_linear(g) + 0.0722 * srgb_to_linear(b);
    linear_to_srgb(y)
}

/// Blend a channel over white paper.
fn over_white(c: u8, alpha: u8) -> u8 {
    let a = u16::from(alpha);
    ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Decode a rendered page from disk.
pub fn load_page(path: impl AsRef<Path>) -> Result<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}

pub fn to_grayscale(img: &RgbaImage, algorithm: GrayscaleAlgorithm) -> GrayImage {
    let convert: fn(u8, u8, u8) -> u8 = match algorithm {
        GrayscaleAlgorithm::Luminance => luminance,
        GrayscaleAlgorithm::Gamma => gamma,
    };
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        Luma([convert(over_white(r, a), over_white(g, a), over_white(b, a))])
    })
}

/// Row-major black/white page. `true` means a dot is burned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryBitmap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<bool>,
}

impl BinaryBitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![false; width * height],
        }
    }

    pub fn from_grayscale(gray: &GrayImage, white_threshold: u8) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.pixels().map(|p| p.0[0] < white_threshold).collect(),
        }
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.data[y * self.width + x] = value;
    }
}

/// One 24-dot strip ready for `BUFFER_IMAGE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperHandlerBitmap {
    pub width: usize,
    /// `width * 3` bytes, or none when `empty`.
    pub data: Vec<u8>,
    pub empty: bool,
}

/// Split into `ceil(height / 24)` strips. The last strip is padded with
/// white rows.
pub fn chunk_binary_bitmap(bitmap: &BinaryBitmap) -> Vec<PaperHandlerBitmap> {
    let chunks = (bitmap.height + CHUNK_HEIGHT - 1) / CHUNK_HEIGHT;
    (0..chunks)
        .map(|chunk| {
            let top = chunk * CHUNK_HEIGHT;
            let mut data = vec![0u8; bitmap.width * BYTES_PER_COLUMN];
            let mut empty = true;
            for x in 0..bitmap.width {
                for row in 0..CHUNK_HEIGHT {
                    let y = top + row;
                    if y < bitmap.height && bitmap.get(x, y) {
                        data[x * BYTES_PER_COLUMN + row / 8] |= 0x80 >> (row % 8);
                        empty = false;
                    }
                }
            }
            if empty {
                data.clear();
            }
            PaperHandlerBitmap {
                width: bitmap.width,
                data,
                empty,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    pub algorithm: GrayscaleAlgorithm,
    pub white_threshold: u8,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            algorithm: GrayscaleAlgorithm::default(),
            white_threshold: DEFAULT_WHITE_THRESHOLD,
        }
    }
}

pub fn image_to_binary_bitmap(img: &RgbaImage, options: &ConversionOptions) -> BinaryBitmap {
    BinaryBitmap::from_grayscale(&to_grayscale(img, options.algorithm), options.white_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[test]
    fn luminance_weights() {
        assert_eq!(luminance(255, 255, 255), 255);
        assert_eq!(luminance(0, 0, 0), 0);
        assert_eq!(luminance(255, 0, 0), 76);
        assert_eq!(luminance(0, 255, 0), 150);
        assert_eq!(luminance(0, 0, 255), 29);
    }

    #[test]
    fn gamma_preserves_extremes_and_neutral_grays() {
        assert_eq!(gamma(255, 255, 255), 255);
        assert_eq!(gamma(0, 0, 0), 0);
        for v in [17u8, 128, 200] {
            let g = gamma(v, v, v);
            assert!((i16::from(g) - i16::from(v)).abs() <= 1, "{v} -> {g}");
        }
        // Pure green is brighter under the perceptual formula.
        assert!(gamma(0, 255, 0) > luminance(0, 255, 0));
    }

    #[test]
    fn transparent_pixels_are_white() {
        let img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        let gray = to_grayscale(&img, GrayscaleAlgorithm::Luminance);
        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
        assert_eq!(over_white(0, 128), 127);
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut gray = GrayImage::new(3, 1);
        gray.put_pixel(0, 0, Luma([229]));
        gray.put_pixel(1, 0, Luma([230]));
        gray.put_pixel(2, 0, Luma([0]));
        let bitmap = BinaryBitmap::from_grayscale(&gray, DEFAULT_WHITE_THRESHOLD);
        assert_eq!(bitmap.data, vec![true, false, true]);
    }

    #[test]
    fn chunk_count_and_widths() {
        for (height, expected) in [(1, 1), (24, 1), (25, 2), (48, 2), (100, 5)] {
            let bitmap = BinaryBitmap::new(7, height);
            let chunks = chunk_binary_bitmap(&bitmap);
            assert_eq!(chunks.len(), expected, "height {height}");
            assert!(chunks.iter().all(|c| c.width == 7 && c.empty && c.data.is_empty()));
        }
    }

    #[test]
    fn columns_are_packed_top_bit_first() {
        let mut bitmap = BinaryBitmap::new(2, 24);
        bitmap.set(0, 0, true);
        bitmap.set(0, 9, true);
        bitmap.set(1, 23, true);
        let chunks = chunk_binary_bitmap(&bitmap);
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].empty);
        assert_eq!(chunks[0].data, vec![0x80, 0x40, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn last_chunk_is_padded() {
        let mut bitmap = BinaryBitmap::new(1, 26);
        bitmap.set(0, 25, true);
        let chunks = chunk_binary_bitmap(&bitmap);
        assert!(chunks[0].empty);
        assert_eq!(chunks[1].data, vec![0x40, 0x00, 0x00]);
    }

    #[test]
    fn load_page_from_png() {
        let path =
            std::env::temp_dir().join(format!("paper-handler-page-{}.png", std::process::id()));
        let mut img = RgbaImage::from_pixel(3, 2, WHITE);
        img.put_pixel(2, 1, BLACK);
        img.save(&path).unwrap();
        let loaded = load_page(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, img);
    }

    #[test]
    fn missing_page_is_an_image_error() {
        let err = load_page("/nonexistent/page.png").unwrap_err();
        assert!(matches!(err, crate::error::Error::Image(_)));
    }

    #[test]
    fn image_pipeline_end_to_end() {
        let mut img = RgbaImage::from_pixel(4, 30, WHITE);
        img.put_pixel(3, 29, BLACK);
        let bitmap = image_to_binary_bitmap(&img, &ConversionOptions::default());
        let chunks = chunk_binary_bitmap(&bitmap);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].empty);
        assert_eq!(chunks[1].data.len(), 4 * BYTES_PER_COLUMN);
        assert_eq!(chunks[1].data[3 * BYTES_PER_COLUMN], 0x04);
    }
}
