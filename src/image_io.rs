use image::ImageFormat;
use std::io::Cursor;

/// Returns `bytes` as PNG, transcoding other supported formats.
///
/// # Errors
///
/// Returns Err if the payload isn't a recognizable image or fails to decode/encode.
pub fn ensure_png(bytes: Vec<u8>) -> std::io::Result<Vec<u8>> {
    let format = image::guess_format(&bytes).map_err(err_other)?;
    if format == ImageFormat::Png {
        return Ok(bytes);
    }

    let img = image::load_from_memory_with_format(&bytes, format).map_err(err_other)?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).map_err(err_other)?;
    Ok(out.into_inner())
}

fn err_other<E: std::fmt::Display>(e: E) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([200, 80, 20])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn png_passes_through() {
        let png = encoded(ImageFormat::Png);
        assert_eq!(ensure_png(png.clone()).unwrap(), png);
    }

    #[test]
    fn jpeg_is_transcoded() {
        let out = ensure_png(encoded(ImageFormat::Jpeg)).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ensure_png(b"<html>rate limited</html>".to_vec()).is_err());
    }
}
