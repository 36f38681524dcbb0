//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! PNG keeps digits crisp; JPEG ringing around small numerals is enough to
//! turn a 3 into an 8. Statements are effectively monochrome, so pages are
//! converted to grayscale by default, which roughly thirds the payload.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a prepared page image for a vision request.
pub fn encode_page(img: &DynamicImage, grayscale: bool) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    if grayscale {
        DynamicImage::ImageLuma8(img.to_luma8())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    } else {
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    }

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
