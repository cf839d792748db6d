//! Image format sniffing and PNG re-encoding.
//!
//! No pixel manipulation happens here: images are decoded and written back
//! out unchanged, only the container format differs.

use image::ImageFormat;
use std::io::Cursor;

pub const PNG_MIME_TYPE: &str = "image/png";

/// MIME type of the encoded image, if the bytes look like one we know.
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|format| format.to_mime_type())
}

/// Decode any supported format and re-encode it as PNG.
pub fn encode_png(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
