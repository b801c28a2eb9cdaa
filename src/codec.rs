use std::io::Cursor;

use base64::alphabet;
use base64::engine::general_purpose::{self, GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};

use crate::error::{ProcessError, Result};

// Browsers and scripts disagree about trailing padding; accept both.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Returns the base64 payload of a data URL, or the input itself when there is
/// no `<header>,` prefix.
pub fn strip_data_url_prefix(value: &str) -> &str {
    let trimmed = value.trim();
    match trimmed.split_once(',') {
        Some((_, data)) => data,
        None => trimmed,
    }
}

pub fn decode_base64_payload(value: &str) -> Result<Vec<u8>> {
    let payload: String = strip_data_url_prefix(value)
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(ProcessError::input(
            "Ошибка декодирования Base64: пустые данные изображения",
        ));
    }
    LENIENT_BASE64
        .decode(payload.as_bytes())
        .map_err(|err| ProcessError::input(format!("Ошибка декодирования Base64: {err}")))
}

/// An uploaded image: the raw encoded bytes, forwarded as-is to the vision
/// model, and the decoded raster used for compositing.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

pub fn decode_image(value: &str) -> Result<DecodedImage> {
    decode_image_bytes(decode_base64_payload(value)?)
}

pub fn decode_image_bytes(bytes: Vec<u8>) -> Result<DecodedImage> {
    let image = image::load_from_memory(&bytes)
        .map_err(|err| ProcessError::input(format!("Ошибка декодирования изображения: {err}")))?;
    Ok(DecodedImage { bytes, image })
}

/// Decodes a data URL or raw base64 string into an image.
#[cfg(test)]
pub fn base64_to_image(value: &str) -> Result<DynamicImage> {
    decode_image(value).map(|decoded| decoded.image)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

pub fn image_to_base64_png(image: &DynamicImage) -> Result<String> {
    let bytes = encode_png(image)?;
    Ok(general_purpose::STANDARD.encode(bytes))
}
