//! Deterministic 2D composition of artwork onto an interior photo.
//!
//! The pipeline is: resize, rotate, anchor, shadow, paste, contrast. Every
//! step tolerates degenerate or off-canvas placements; nothing here fails.

mod shadow;
mod transform;

use image::imageops;
use image::{DynamicImage, GenericImageView, Pixel, RgbaImage};
use tracing::debug;

use crate::placement::Placement;

use shadow::build_shadow_layer;
use transform::{
    overlay_limit, resize_overlay, rotate_expanded, rotated_dimensions, scaled_dimensions,
};

/// Tunables for the compositing pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeOptions {
    /// Global contrast multiplier applied last.
    pub contrast_factor: f32,
    /// Shadow alpha right under the artwork, out of 255.
    pub shadow_peak_alpha: u8,
    /// Gaussian sigma used to soften the shadow.
    pub shadow_blur_sigma: f32,
    /// Keep the alpha channel in the output instead of flattening to RGB.
    pub keep_alpha: bool,
    /// Absolute upper bound for either side of the scaled artwork. The
    /// effective bound is also tied to the interior size.
    pub max_overlay_dimension: u32,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            contrast_factor: 1.1,
            shadow_peak_alpha: 50,
            shadow_blur_sigma: 5.0,
            keep_alpha: false,
            max_overlay_dimension: 16384,
        }
    }
}

/// Final position and size of the artwork on the interior canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Layout {
    /// Centres a `width`×`height` overlay on the placement anchor.
    pub fn anchored(placement: &Placement, width: u32, height: u32) -> Self {
        Self {
            x: placement.x.saturating_sub((width / 2) as i64),
            y: placement.y.saturating_sub((height / 2) as i64),
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.x.saturating_add(self.width as i64)
    }

    pub fn bottom(&self) -> i64 {
        self.y.saturating_add(self.height as i64)
    }
}

fn should_rotate(rotation: f64) -> bool {
    rotation != 0.0 && rotation.is_finite()
}

/// Computes where an artwork of size `artwork` lands on a canvas of size
/// `canvas`, without touching pixels.
pub fn plan_layout(
    artwork: (u32, u32),
    canvas: (u32, u32),
    placement: &Placement,
    options: &CompositeOptions,
) -> Layout {
    let limit = overlay_limit(canvas.0, canvas.1, options.max_overlay_dimension);
    let (mut width, mut height) = scaled_dimensions(artwork.0, artwork.1, placement.scale, limit);
    if should_rotate(placement.rotation) {
        (width, height) = rotated_dimensions(width, height, placement.rotation);
    }
    Layout::anchored(placement, width, height)
}

/// Mean luminance (ITU-R 601 weights), rounded to the nearest level.
pub fn mean_luminance(image: &RgbaImage) -> f32 {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let total: u64 = image
        .pixels()
        .map(|p| (p[0] as u64 * 299 + p[1] as u64 * 587 + p[2] as u64 * 114 + 500) / 1000)
        .sum();
    (total as f64 / count as f64).round() as f32
}

/// Scales each colour channel away from the mean luminance by `factor`:
/// `mean + factor * (value - mean)`. Alpha is left alone.
pub fn apply_contrast(image: &mut RgbaImage, factor: f32) {
    if (factor - 1.0).abs() < f32::EPSILON {
        return;
    }
    let mean = mean_luminance(image);
    let table: [u8; 256] = std::array::from_fn(|value| {
        (mean + factor * (value as f32 - mean))
            .round()
            .clamp(0.0, 255.0) as u8
    });
    for pixel in image.pixels_mut() {
        *pixel = pixel.map_with_alpha(|channel| table[channel as usize], |alpha| alpha);
    }
}

/// Composites `artwork` onto `interior` according to `placement`.
pub fn composite(
    interior: &DynamicImage,
    artwork: &DynamicImage,
    placement: &Placement,
    options: &CompositeOptions,
) -> DynamicImage {
    let artwork_has_alpha = artwork.color().has_alpha();

    let limit = overlay_limit(
        interior.width(),
        interior.height(),
        options.max_overlay_dimension,
    );

    let mut overlay = resize_overlay(&artwork.to_rgba8(), placement.scale, limit);
    let mut use_mask = artwork_has_alpha;
    if should_rotate(placement.rotation) {
        overlay = rotate_expanded(&overlay, placement.rotation);
        use_mask = true;
    }

    let layout = plan_layout(
        artwork.dimensions(),
        interior.dimensions(),
        placement,
        options,
    );
    debug_assert_eq!((layout.width, layout.height), overlay.dimensions());
    debug!(
        x = layout.x,
        y = layout.y,
        width = layout.width,
        height = layout.height,
        masked = use_mask,
        "Artwork layout"
    );

    let mut canvas = interior.to_rgba8();

    if let Some(shadow) = build_shadow_layer(
        canvas.width(),
        canvas.height(),
        &layout,
        placement.wall_height,
        options.shadow_peak_alpha,
        options.shadow_blur_sigma,
    ) {
        imageops::overlay(&mut canvas, &shadow.image, shadow.x, shadow.y);
    }

    if use_mask {
        imageops::overlay(&mut canvas, &overlay, layout.x, layout.y);
    } else {
        imageops::replace(&mut canvas, &overlay, layout.x, layout.y);
    }

    apply_contrast(&mut canvas, options.contrast_factor);

    if options.keep_alpha {
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
    }
}
