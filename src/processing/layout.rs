use crate::config::CropMode;

/// Region of the source image kept before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest window of `src` with the aspect ratio of `dst`.
///
/// Sources wider than the target lose width (centered, or anchored left for
/// [`CropMode::KeepWidth`]); taller sources lose height, centered.
pub fn crop_to_aspect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, mode: CropMode) -> CropRect {
    let sw = src_w.max(1);
    let sh = src_h.max(1);
    let src_ratio = sw as f64 / sh as f64;
    let dst_ratio = dst_w.max(1) as f64 / dst_h.max(1) as f64;

    if src_ratio > dst_ratio {
        let width = ((sh as f64 * dst_ratio).round() as u32).clamp(1, sw);
        let x = match mode {
            CropMode::Center => (sw - width) / 2,
            CropMode::KeepWidth => 0,
        };
        CropRect {
            x,
            y: 0,
            width,
            height: sh,
        }
    } else {
        let height = ((sw as f64 / dst_ratio).round() as u32).clamp(1, sh);
        CropRect {
            x: 0,
            y: (sh - height) / 2,
            width: sw,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_into_wide_crops_height() {
        let rect = crop_to_aspect(1000, 1000, 800, 400, CropMode::Center);
        assert_eq!(
            rect,
            CropRect {
                x: 0,
                y: 250,
                width: 1000,
                height: 500
            }
        );
    }

    #[test]
    fn wide_into_square_crops_width_centered() {
        let rect = crop_to_aspect(1600, 900, 600, 600, CropMode::Center);
        assert_eq!(rect.width, 900);
        assert_eq!(rect.height, 900);
        assert_eq!(rect.x, 350);
    }

    #[test]
    fn keep_width_anchors_left() {
        let rect = crop_to_aspect(1600, 900, 600, 600, CropMode::KeepWidth);
        assert_eq!(rect.x, 0);
        assert_eq!(rect.width, 900);
    }

    #[test]
    fn matching_aspect_keeps_everything() {
        let rect = crop_to_aspect(1600, 900, 800, 450, CropMode::Center);
        assert_eq!(
            rect,
            CropRect {
                x: 0,
                y: 0,
                width: 1600,
                height: 900
            }
        );
    }

    #[test]
    fn degenerate_sizes_stay_in_bounds() {
        let rect = crop_to_aspect(1, 1000, 1000, 1, CropMode::Center);
        assert!(rect.width >= 1 && rect.height >= 1);
        assert!(rect.y + rect.height <= 1000);
    }
}
