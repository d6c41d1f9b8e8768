//! Output side of the refresh engine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use image::{ImageFormat, RgbaImage};
use tracing::{debug, info};

/// A panel that is first loaded with a bitmap and then told to show it.
///
/// Implementations may fail at any point; callers log and carry on.
pub trait DisplaySink: Send {
    /// Native panel resolution as `(width, height)`.
    fn resolution(&self) -> (u32, u32);

    fn set_image(&mut self, image: &RgbaImage) -> Result<()>;

    fn show(&mut self) -> Result<()>;
}

/// Sink that "shows" by writing the pending bitmap to a PNG file.
///
/// The file is replaced atomically so readers never see a partial image.
#[derive(Debug)]
pub struct PngFileSink {
    path: PathBuf,
    width: u32,
    height: u32,
    pending: Option<RgbaImage>,
}

impl PngFileSink {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("sink resolution must be positive, got {width}x{height}");
        }
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output directory {}", parent.display()))?;
        }
        Ok(Self {
            path,
            width,
            height,
            pending: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DisplaySink for PngFileSink {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_image(&mut self, image: &RgbaImage) -> Result<()> {
        debug!(width = image.width(), height = image.height(), "png sink: image staged");
        self.pending = Some(image.clone());
        Ok(())
    }

    fn show(&mut self) -> Result<()> {
        let Some(image) = self.pending.take() else {
            bail!("show called before set_image");
        };
        let tmp = self.path.with_extension("png.tmp");
        image
            .save_with_format(&tmp, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        info!(path = %self.path.display(), "png sink: frame written");
        Ok(())
    }
}
