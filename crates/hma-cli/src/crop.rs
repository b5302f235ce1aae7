use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CropError {
    #[error("failed to load screenshot {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("crop box {crop:?} does not overlap the {width}x{height} screenshot")]
    OutOfBounds {
        crop: CropBox,
        width: u32,
        height: u32,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Element bounding box in screenshot pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBox {
    /// Intersection with a `width` x `height` image, `None` when empty.
    pub fn clamp_to(self, width: u32, height: u32) -> Option<CropBox> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clamped = CropBox {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        };
        (clamped.width > 0 && clamped.height > 0).then_some(clamped)
    }
}

pub fn crop_screenshot(input: &Path, crop: CropBox, output: &Path) -> Result<CropBox, CropError> {
    let screenshot = image::open(input).map_err(|source| CropError::Load {
        path: input.to_path_buf(),
        source,
    })?;
    let (width, height) = (screenshot.width(), screenshot.height());
    let region = crop
        .clamp_to(width, height)
        .ok_or(CropError::OutOfBounds {
            crop,
            width,
            height,
        })?;

    screenshot
        .crop_imm(region.x, region.y, region.width, region.height)
        .save_with_format(output, ImageFormat::Png)
        .map_err(|source| CropError::Save {
            path: output.to_path_buf(),
            source,
        })?;

    info!(
        event = "heatmap_cropped",
        output = %output.display(),
        width = region.width,
        height = region.height
    );
    Ok(region)
}
