//! Resizing and rotation of the artwork overlay.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

// Absorbs float noise such as cos(90°) ≈ 6e-17 before rounding up.
const EXTENT_EPSILON: f64 = 1e-6;

// Past this multiple of the canvas' longest side the overlay covers the whole
// canvas anyway, so larger sizes only cost time and memory.
const OVERLAY_CANVAS_FACTOR: u32 = 2;

fn clamp_dimension(value: f64, max_dimension: u32) -> u32 {
    let max_dimension = max_dimension.max(1);
    if !value.is_finite() || value < 1.0 {
        1
    } else if value >= max_dimension as f64 {
        max_dimension
    } else {
        value as u32
    }
}

/// Longest side the scaled artwork may reach on a `canvas_width`×`canvas_height`
/// canvas, never above `max_dimension`.
pub fn overlay_limit(canvas_width: u32, canvas_height: u32, max_dimension: u32) -> u32 {
    canvas_width
        .max(canvas_height)
        .saturating_mul(OVERLAY_CANVAS_FACTOR)
        .clamp(1, max_dimension.max(1))
}

/// `(round(w * scale), round(h * scale))` with each side at least 1. Scales that
/// would push the longest side past `limit` are reduced so it lands on `limit`,
/// keeping the aspect ratio.
pub fn scaled_dimensions(width: u32, height: u32, scale: f64, limit: u32) -> (u32, u32) {
    let limit = limit.max(1);
    let longest = width.max(height).max(1) as f64;
    let scale = if longest * scale > limit as f64 {
        limit as f64 / longest
    } else {
        scale
    };
    (
        clamp_dimension((width as f64 * scale).round(), limit),
        clamp_dimension((height as f64 * scale).round(), limit),
    )
}

/// Bounding box of a `width`×`height` rectangle rotated by `degrees`.
pub fn rotated_dimensions(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (w, h) = (width as f64, height as f64);
    let extent_w = (w * cos.abs() + h * sin.abs() - EXTENT_EPSILON).ceil();
    let extent_h = (w * sin.abs() + h * cos.abs() - EXTENT_EPSILON).ceil();
    (
        clamp_dimension(extent_w, u32::MAX),
        clamp_dimension(extent_h, u32::MAX),
    )
}

pub fn resize_overlay(artwork: &RgbaImage, scale: f64, limit: u32) -> RgbaImage {
    let (width, height) = scaled_dimensions(artwork.width(), artwork.height(), scale, limit);
    if (width, height) == artwork.dimensions() {
        return artwork.clone();
    }
    imageops::resize(artwork, width, height, FilterType::Lanczos3)
}

fn premultiply(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let alpha = pixel[3] as u16;
        for channel in 0..3 {
            pixel[channel] = ((pixel[channel] as u16 * alpha + 127) / 255) as u8;
        }
    }
    out
}

fn unpremultiply(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let alpha = pixel[3] as u32;
        if alpha == 0 {
            *pixel = Rgba([0, 0, 0, 0]);
            continue;
        }
        for channel in 0..3 {
            pixel[channel] = ((pixel[channel] as u32 * 255 + alpha / 2) / alpha).min(255) as u8;
        }
    }
}

/// Rotates counter-clockwise about the centre onto a canvas grown to fit the
/// rotated corners. Uncovered pixels are fully transparent.
///
/// Sampling happens on premultiplied colour so edge pixels fade in alpha
/// instead of blending towards the black of the transparent background.
pub fn rotate_expanded(image: &RgbaImage, degrees: f64) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (out_width, out_height) = rotated_dimensions(width, height, degrees);
    let mut out = RgbaImage::from_pixel(out_width, out_height, Rgba([0, 0, 0, 0]));

    // imageproc rotates clockwise in image space; negate for counter-clockwise.
    let theta = -(degrees.to_radians() as f32);
    let projection = Projection::translate(out_width as f32 / 2.0, out_height as f32 / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-(width as f32) / 2.0, -(height as f32) / 2.0);

    warp_into(
        &premultiply(image),
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
        &mut out,
    );
    unpremultiply(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_dimensions_round_to_nearest() {
        assert_eq!(scaled_dimensions(101, 51, 0.5, 16384), (51, 26));
        assert_eq!(scaled_dimensions(200, 100, 0.8, 16384), (160, 80));
    }

    #[test]
    fn degenerate_scales_keep_one_pixel() {
        assert_eq!(scaled_dimensions(200, 100, 0.001, 16384), (1, 1));
        assert_eq!(scaled_dimensions(200, 100, 0.0, 16384), (1, 1));
        assert_eq!(scaled_dimensions(200, 100, -1.0, 16384), (1, 1));
        assert_eq!(scaled_dimensions(200, 100, f64::NAN, 16384), (1, 1));
    }

    #[test]
    fn huge_scales_stop_at_the_limit_and_keep_aspect() {
        assert_eq!(scaled_dimensions(200, 100, 1e12, 4096), (4096, 2048));
        assert_eq!(scaled_dimensions(64, 64, f64::INFINITY, 200), (200, 200));
    }

    #[test]
    fn limit_follows_the_canvas() {
        assert_eq!(overlay_limit(100, 60, 16384), 200);
        assert_eq!(overlay_limit(1920, 1080, 16384), 3840);
        assert_eq!(overlay_limit(20000, 10, 16384), 16384);
        assert_eq!(overlay_limit(0, 0, 16384), 1);
    }

    #[test]
    fn right_angle_rotation_swaps_extents() {
        assert_eq!(rotated_dimensions(1000, 10, 90.0), (10, 1000));
        assert_eq!(rotated_dimensions(40, 20, 180.0), (40, 20));
    }

    #[test]
    fn small_rotation_grows_the_canvas() {
        let (w, h) = rotated_dimensions(200, 100, 5.0);
        assert!(w > 200 && h > 100, "got {w}x{h}");
    }

    #[test]
    fn rotated_extents_are_not_cut_at_the_overlay_limit() {
        let (w, h) = rotated_dimensions(16384, 16384, 45.0);
        assert!(w > 23000 && h > 23000, "got {w}x{h}");
    }

    #[test]
    fn resize_hits_target_dimensions() {
        let art = RgbaImage::from_pixel(40, 20, Rgba([10, 200, 30, 255]));
        let resized = resize_overlay(&art, 0.5, 16384);
        assert_eq!(resized.dimensions(), (20, 10));
        let pixel = resized.get_pixel(10, 5);
        assert!(pixel[1].abs_diff(200) <= 1 && pixel[3] >= 254, "got {pixel:?}");
    }

    #[test]
    fn rotation_keeps_corners_and_clears_background() {
        let art = RgbaImage::from_pixel(60, 20, Rgba([255, 0, 0, 255]));
        let rotated = rotate_expanded(&art, 30.0);
        let (w, h) = rotated.dimensions();
        assert!(w >= 60 && h >= 20);

        // Centre is still artwork, the canvas corners are transparent.
        assert!(rotated.get_pixel(w / 2, h / 2)[3] > 250);
        assert_eq!(rotated.get_pixel(0, 0)[3], 0);
        assert_eq!(rotated.get_pixel(w - 1, h - 1)[3], 0);

        // Total coverage stays close to the source area, so nothing was cropped.
        let coverage: f64 = rotated.pixels().map(|p| p[3] as f64 / 255.0).sum();
        assert!(coverage > 1000.0 && coverage < 1320.0, "coverage {coverage}");
    }

    #[test]
    fn rotated_edges_keep_the_artwork_colour() {
        let art = RgbaImage::from_pixel(50, 30, Rgba([255, 255, 255, 255]));
        let rotated = rotate_expanded(&art, 30.0);
        let mut edge_pixels = 0;
        for pixel in rotated.pixels().filter(|p| p[3] >= 32) {
            if pixel[3] < 250 {
                edge_pixels += 1;
            }
            assert!(pixel[0] >= 240 && pixel[1] >= 240 && pixel[2] >= 240, "dark fringe {pixel:?}");
        }
        assert!(edge_pixels > 0);
    }

    #[test]
    fn counter_clockwise_rotation_lifts_the_right_end() {
        // A wide bar rotated 45° CCW: its right end moves up, so the top-right
        // quadrant holds artwork while the top-left quadrant stays empty.
        let art = RgbaImage::from_pixel(100, 4, Rgba([0, 0, 255, 255]));
        let rotated = rotate_expanded(&art, 45.0);
        let (w, h) = rotated.dimensions();
        let top_right = rotated.get_pixel(w * 3 / 4, h / 4)[3];
        let top_left = rotated.get_pixel(w / 4, h / 4)[3];
        assert!(top_right > 0, "top-right alpha {top_right}");
        assert_eq!(top_left, 0);
    }
}
