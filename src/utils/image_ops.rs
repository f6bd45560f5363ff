use base64::{engine::general_purpose, Engine};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageResult};
use std::io::Cursor;

/// Decode uploaded or captured bytes (format sniffed from the content).
///
/// CPU-bound; callers on the async runtime should wrap it in
/// `spawn_blocking`.
pub fn decode_image(bytes: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

/// Downscale to at most `max_width` pixels wide, keeping the aspect ratio.
/// Images already narrower are returned unchanged.
pub fn thumbnail(img: &DynamicImage, max_width: u32) -> DynamicImage {
    if img.width() <= max_width {
        return img.clone();
    }
    let scale = max_width as f64 / img.width() as f64;
    let height = ((img.height() as f64 * scale).round() as u32).max(1);
    img.resize_exact(max_width, height, FilterType::Triangle)
}

/// Encode an image to PNG bytes
pub fn encode_png(img: &DynamicImage) -> ImageResult<Vec<u8>> {
    let mut png_bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Thumbnail + PNG + base64 in one blocking pass, ready for an `<img src>`
pub fn thumbnail_data_url(img: &DynamicImage, max_width: u32) -> ImageResult<String> {
    let png = encode_png(&thumbnail(img, max_width))?;
    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png)
    ))
}

/// Lowercased extension of a file name, if any
pub fn file_extension(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
pub(crate) fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(width, height, image::Rgb(rgb)));
    encode_png(&img).unwrap()
}
