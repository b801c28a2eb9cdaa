//! Synthetic drop shadow under the placed artwork.

use image::imageops;
use image::{Rgba, RgbaImage};

use super::Layout;

/// A blurred shadow patch and where its top-left corner lands on the canvas.
///
/// Only the region the shadow can reach (plus blur margin) is materialised;
/// everything else on a canvas-sized layer would be transparent anyway.
#[derive(Debug, Clone)]
pub struct ShadowLayer {
    pub image: RgbaImage,
    pub x: i64,
    pub y: i64,
}

/// Shadow alpha for a canvas row: `peak` across the artwork footprint, then a
/// linear fade that reaches zero `wall_height` rows below the bottom edge.
pub fn shadow_alpha(row: i64, layout: &Layout, wall_height: i64, peak: u8) -> u8 {
    let top = layout.y;
    let bottom = layout.bottom();
    if row < top {
        return 0;
    }
    if row < bottom {
        return peak;
    }
    let distance = row.saturating_sub(bottom);
    if wall_height <= 0 || distance >= wall_height {
        return 0;
    }
    let fade = 1.0 - distance as f64 / wall_height as f64;
    (peak as f64 * fade).round().clamp(0.0, u8::MAX as f64) as u8
}

/// Builds the shadow for `layout` on a `canvas_width`×`canvas_height` canvas.
/// Returns `None` when the shadow would fall entirely off the canvas.
pub fn build_shadow_layer(
    canvas_width: u32,
    canvas_height: u32,
    layout: &Layout,
    wall_height: i64,
    peak: u8,
    blur_sigma: f32,
) -> Option<ShadowLayer> {
    if peak == 0 {
        return None;
    }

    let margin = if blur_sigma > 0.0 {
        (blur_sigma as f64 * 3.0).ceil() as i64
    } else {
        0
    };
    let tail = wall_height.max(0);
    let shadow_bottom = layout.bottom().saturating_add(tail);

    let left = layout.x.saturating_sub(margin).max(0);
    let top = layout.y.saturating_sub(margin).max(0);
    let right = layout.right().saturating_add(margin).min(canvas_width as i64);
    let bottom = shadow_bottom.saturating_add(margin).min(canvas_height as i64);
    if left >= right || top >= bottom {
        return None;
    }

    let width = (right - left) as u32;
    let height = (bottom - top) as u32;
    let mut patch = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

    let column_start = layout.x.max(left) - left;
    let column_end = layout.right().min(right) - left;
    for local_row in 0..height {
        let alpha = shadow_alpha(top + local_row as i64, layout, wall_height, peak);
        if alpha == 0 {
            continue;
        }
        for local_col in column_start.max(0)..column_end.max(0) {
            patch.put_pixel(local_col as u32, local_row, Rgba([0, 0, 0, alpha]));
        }
    }

    let image = if blur_sigma > 0.0 {
        imageops::blur(&patch, blur_sigma)
    } else {
        patch
    };

    Some(ShadowLayer {
        image,
        x: left,
        y: top,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout {
            x: 20,
            y: 10,
            width: 40,
            height: 30,
        }
    }

    #[test]
    fn alpha_is_graded_from_the_bottom_edge() {
        let layout = layout();
        assert_eq!(shadow_alpha(5, &layout, 100, 50), 0);
        assert_eq!(shadow_alpha(10, &layout, 100, 50), 50);
        assert_eq!(shadow_alpha(39, &layout, 100, 50), 50);
        assert_eq!(shadow_alpha(40, &layout, 100, 50), 50);
        assert_eq!(shadow_alpha(90, &layout, 100, 50), 25);
        assert_eq!(shadow_alpha(139, &layout, 100, 50), 1);
        assert_eq!(shadow_alpha(140, &layout, 100, 50), 0);
    }

    #[test]
    fn non_positive_wall_height_has_no_tail() {
        let layout = layout();
        assert_eq!(shadow_alpha(40, &layout, 0, 50), 0);
        assert_eq!(shadow_alpha(40, &layout, -10, 50), 0);
        assert_eq!(shadow_alpha(20, &layout, -10, 50), 50);
    }

    #[test]
    fn unblurred_layer_matches_footprint() {
        let layer = build_shadow_layer(200, 200, &layout(), 20, 50, 0.0).expect("layer");
        assert_eq!((layer.x, layer.y), (20, 10));
        assert_eq!(layer.image.dimensions(), (40, 50));
        assert_eq!(layer.image.get_pixel(0, 0)[3], 50);
        assert_eq!(layer.image.get_pixel(39, 49)[3], 3);
    }

    #[test]
    fn blurred_layer_softens_edges_and_stays_in_canvas() {
        let layer = build_shadow_layer(70, 60, &layout(), 100, 50, 5.0).expect("layer");
        assert_eq!((layer.x, layer.y), (5, 0));
        assert_eq!(layer.image.dimensions(), (65, 60));
        // Blur bleeds past the left edge and pulls the edge itself below peak.
        assert!(layer.image.get_pixel(13, 30)[3] > 0);
        assert!(layer.image.get_pixel(15, 30)[3] < 50);
        assert!(layer.image.pixels().all(|p| p[0] == 0 && p[3] <= 50));
    }

    #[test]
    fn off_canvas_shadow_is_skipped() {
        let layout = Layout {
            x: -500,
            y: -500,
            width: 10,
            height: 10,
        };
        assert!(build_shadow_layer(100, 100, &layout, 5, 50, 5.0).is_none());
        assert!(build_shadow_layer(100, 100, &self::layout(), 5, 0, 5.0).is_none());
    }
}
