use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ExtendedColorType, Rgba, RgbaImage};
use tracing::{debug, info};

use crate::error::StudioError;
use crate::models::{AspectRatio, InlineImage, UploadedImage};

pub const NORMALIZED_MIME_TYPE: &str = "image/jpeg";
const JPEG_QUALITY: u8 = 90;
const MAX_CANVAS_SIDE: u64 = 32_767;
const MAX_CANVAS_AREA: u64 = 268_435_456;
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Target canvas for a source image, with the offset that centers the source on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Compute the padded canvas for a `width` x `height` source so that the canvas
/// matches `aspect`. The source is never scaled; padding goes on the short axis.
pub fn canvas_for(width: u32, height: u32, aspect: AspectRatio) -> Result<Canvas, StudioError> {
    if width == 0 || height == 0 {
        return Err(StudioError::RenderSurface(format!("source has empty dimensions {width}x{height}")));
    }
    let (w, h) = (width as f64, height as f64);
    let target = aspect.ratio();

    let (canvas_w, canvas_h) = if w / h > target {
        // wider than target: pad top and bottom
        (width as u64, ((w / target).round() as u64).max(height as u64))
    } else {
        (((h * target).round() as u64).max(width as u64), height as u64)
    };

    if canvas_w > MAX_CANVAS_SIDE || canvas_h > MAX_CANVAS_SIDE || canvas_w * canvas_h > MAX_CANVAS_AREA {
        return Err(StudioError::RenderSurface(format!(
            "canvas {canvas_w}x{canvas_h} exceeds the drawable surface limit"
        )));
    }

    Ok(Canvas {
        width: canvas_w as u32,
        height: canvas_h as u32,
        offset_x: ((canvas_w - width as u64) / 2) as u32,
        offset_y: ((canvas_h - height as u64) / 2) as u32,
    })
}

/// Decode `bytes`, center the image on a white canvas of the requested aspect
/// ratio and re-encode it as JPEG for transport.
pub fn normalize_to_aspect_ratio(bytes: &[u8], aspect: AspectRatio) -> Result<InlineImage, StudioError> {
    let source = image::load_from_memory(bytes).map_err(|e| StudioError::Decode(e.to_string()))?;
    let (width, height) = (source.width(), source.height());
    let canvas = canvas_for(width, height, aspect)?;

    let mut surface = RgbaImage::from_pixel(canvas.width, canvas.height, BACKGROUND);
    imageops::overlay(&mut surface, &source.to_rgba8(), canvas.offset_x as i64, canvas.offset_y as i64);
    let flattened = DynamicImage::ImageRgba8(surface).to_rgb8();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut encoded), JPEG_QUALITY)
        .encode(flattened.as_raw(), canvas.width, canvas.height, ExtendedColorType::Rgb8)
        .map_err(|e| StudioError::Encode(e.to_string()))?;
    if encoded.is_empty() {
        return Err(StudioError::Encode("encoder produced no data".into()));
    }

    info!(
        "🖼️ Normalized {}x{} image to {}x{} canvas ({}, {} bytes)",
        width, height, canvas.width, canvas.height, aspect, encoded.len()
    );
    Ok(InlineImage::from_bytes(NORMALIZED_MIME_TYPE, &encoded))
}

/// Runs [`normalize_to_aspect_ratio`] on the blocking pool.
pub async fn normalize_in_background(bytes: Bytes, aspect: AspectRatio) -> Result<InlineImage, StudioError> {
    tokio::task::spawn_blocking(move || normalize_to_aspect_ratio(&bytes, aspect))
        .await
        .map_err(|e| StudioError::RenderSurface(format!("image worker failed: {e}")))?
}

/// Transport-encode an upload as-is (no resizing).
pub fn transcode(image: &UploadedImage) -> Result<InlineImage, StudioError> {
    if image.bytes.is_empty() {
        return Err(StudioError::Decode(format!("{} image is empty", image.role)));
    }
    if image.media_type.trim().is_empty() {
        return Err(StudioError::Decode(format!("{} image has no media type", image.role)));
    }
    debug!("Transcoding {} image ({}, {} bytes)", image.role, image.media_type, image.bytes.len());
    Ok(InlineImage::from_bytes(image.media_type.trim(), &image.bytes))
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, color);
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
