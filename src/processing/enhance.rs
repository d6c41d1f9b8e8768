//! Brightness, contrast, saturation and sharpness adjustments.
//!
//! Every adjustment blends the image with a "degenerate" version of itself:
//! `out = degenerate + factor * (image - degenerate)`. A factor of 0.0 yields
//! the degenerate image, 1.0 the original, and larger values push further
//! away from the degenerate image.

use image::RgbaImage;

use crate::config::EnhancementSettings;

/// Apply all four adjustments in their fixed order. Alpha is left untouched.
pub fn apply_enhancement(image: &mut RgbaImage, settings: &EnhancementSettings) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    adjust_brightness(image, settings.brightness);
    adjust_contrast(image, settings.contrast);
    adjust_saturation(image, settings.saturation);
    adjust_sharpness(image, settings.sharpness);
}

fn is_identity(factor: f32) -> bool {
    (factor - 1.0).abs() <= f32::EPSILON
}

fn blend(degenerate: f32, value: f32, factor: f32) -> u8 {
    (degenerate + factor * (value - degenerate))
        .round()
        .clamp(0.0, 255.0) as u8
}

fn luma(rgb: &[u8]) -> f32 {
    (rgb[0] as f32 * 299.0 + rgb[1] as f32 * 587.0 + rgb[2] as f32 * 114.0) / 1000.0
}

/// Degenerate image: black.
pub fn adjust_brightness(image: &mut RgbaImage, factor: f32) {
    if is_identity(factor) {
        return;
    }
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = blend(0.0, *channel as f32, factor);
        }
    }
}

/// Degenerate image: flat grey at the mean luma of the whole image.
pub fn adjust_contrast(image: &mut RgbaImage, factor: f32) {
    if is_identity(factor) {
        return;
    }
    let total: f64 = image.pixels().map(|p| luma(&p.0) as f64).sum();
    let count = (image.width() as f64) * (image.height() as f64);
    let mean = (total / count).round() as f32;
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = blend(mean, *channel as f32, factor);
        }
    }
}

/// Degenerate image: per-pixel greyscale.
pub fn adjust_saturation(image: &mut RgbaImage, factor: f32) {
    if is_identity(factor) {
        return;
    }
    for pixel in image.pixels_mut() {
        let grey = luma(&pixel.0);
        for channel in &mut pixel.0[..3] {
            *channel = blend(grey, *channel as f32, factor);
        }
    }
}

/// Degenerate image: 3x3 smoothed copy; the one-pixel border is kept as-is.
pub fn adjust_sharpness(image: &mut RgbaImage, factor: f32) {
    if is_identity(factor) {
        return;
    }
    let smoothed = smooth(image);
    for (pixel, soft) in image.pixels_mut().zip(smoothed.pixels()) {
        for c in 0..3 {
            pixel.0[c] = blend(soft.0[c] as f32, pixel.0[c] as f32, factor);
        }
    }
}

// Kernel [[1,1,1],[1,5,1],[1,1,1]] / 13.
fn smooth(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0.0f32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let weight = if dx == 1 && dy == 1 { 5.0 } else { 1.0 };
                    let p = image.get_pixel(x + dx - 1, y + dy - 1);
                    for c in 0..3 {
                        acc[c] += p.0[c] as f32 * weight;
                    }
                }
            }
            let target = out.get_pixel_mut(x, y);
            for c in 0..3 {
                target.0[c] = (acc[c] / 13.0).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}
