//! Pairing QR code rendering

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;

use crate::error::{ApiError, Result};

/// Minimum side length of the rendered image, in pixels
const MIN_DIMENSION: u32 = 256;

/// Render a pairing code as a PNG image
pub fn render_png(code: &str) -> Result<Vec<u8>> {
    let qr = QrCode::new(code.as_bytes()).map_err(|e| ApiError::QrRender(e.to_string()))?;
    let image = qr
        .render::<Luma<u8>>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ApiError::QrRender(e.to_string()))?;
    Ok(png)
}
