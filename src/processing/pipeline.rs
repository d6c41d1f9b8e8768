use std::borrow::Cow;

use anyhow::{Context, Result, bail};
use fast_image_resize as fir;
use image::{RgbaImage, imageops};

use crate::config::{CropMode, DisplaySettings, EnhancementSettings, Orientation};
use crate::processing::enhance::apply_enhancement;
use crate::processing::layout::crop_to_aspect;

/// Fully resolved inputs for one pass through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    pub portrait_rotation: u16,
    pub crop_mode: CropMode,
    pub inverted: bool,
    pub enhancement: EnhancementSettings,
}

impl RenderSettings {
    /// Landscape, centered crop, no inversion, identity enhancement.
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_display(&DisplaySettings::default(), (width, height))
    }

    /// Combine configured settings with the sink's native resolution, which is
    /// used only when no resolution is configured.
    pub fn from_display(display: &DisplaySettings, native: (u32, u32)) -> Self {
        let (width, height) = display.resolution.unwrap_or(native);
        Self {
            width,
            height,
            orientation: display.orientation,
            portrait_rotation: display.portrait_rotation,
            crop_mode: display.crop_mode,
            inverted: display.inverted,
            enhancement: display.enhancement,
        }
    }

    fn rotation(&self) -> u16 {
        match self.orientation {
            Orientation::Landscape => 0,
            Orientation::Portrait => self.portrait_rotation,
        }
    }
}

/// Orientation, crop-to-aspect + resize, optional inversion, enhancement.
pub fn render(source: &RgbaImage, settings: &RenderSettings) -> Result<RgbaImage> {
    if settings.width == 0 || settings.height == 0 {
        bail!(
            "target resolution must be positive, got {}x{}",
            settings.width,
            settings.height
        );
    }
    let oriented = rotate_ccw(source, settings.rotation());
    let mut out = crop_and_resize(&oriented, settings.width, settings.height, settings.crop_mode)?;
    if settings.inverted {
        out = imageops::rotate180(&out);
    }
    apply_enhancement(&mut out, &settings.enhancement);
    Ok(out)
}

/// Rotate counter-clockwise by a multiple of 90 degrees, growing the canvas to fit.
pub fn rotate_ccw(image: &RgbaImage, degrees: u16) -> Cow<'_, RgbaImage> {
    match degrees % 360 {
        90 => Cow::Owned(imageops::rotate270(image)),
        180 => Cow::Owned(imageops::rotate180(image)),
        270 => Cow::Owned(imageops::rotate90(image)),
        _ => Cow::Borrowed(image),
    }
}

/// Crop to the target aspect ratio, then resize to exactly `width` x `height`.
pub fn crop_and_resize(
    image: &RgbaImage,
    width: u32,
    height: u32,
    mode: CropMode,
) -> Result<RgbaImage> {
    let rect = crop_to_aspect(image.width(), image.height(), width, height, mode);
    let cropped = imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
    resize_rgba(&cropped, width, height)
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resize failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .context("failed to construct resized RGBA image")
}
