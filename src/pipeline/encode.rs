//! Image encoding: uploaded png/jpg bytes → base64 PNG wrapped in `ImageData`.
//!
//! Vision APIs accept images as base64 data embedded in the JSON request
//! body. Uploads are decoded and re-encoded as PNG so the model always
//! receives a lossless image with a known MIME type, whatever the original
//! container was. Oversized photos are downscaled so the longest edge stays
//! within [`MAX_IMAGE_EDGE`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Longest edge, in pixels, of an image sent for OCR.
pub const MAX_IMAGE_EDGE: u32 = 2000;

/// Decode raw image bytes and encode them for a vision request.
pub fn encode_upload(bytes: &[u8]) -> Result<ImageData, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    encode_image(&bound_size(img))
}

/// Encode an in-memory image as a base64 PNG with `detail: "high"`.
pub fn encode_image(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

fn bound_size(img: DynamicImage) -> DynamicImage {
    if img.width().max(img.height()) > MAX_IMAGE_EDGE {
        img.resize(MAX_IMAGE_EDGE, MAX_IMAGE_EDGE, image::imageops::FilterType::Triangle)
    } else {
        img
    }
}
