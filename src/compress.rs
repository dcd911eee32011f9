use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ImageError};

pub const MAX_EDGE: u32 = 1280;
pub const JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub max_edge: u32,
    pub quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { max_edge: MAX_EDGE, quality: JPEG_QUALITY }
    }
}

/// Target size keeping aspect ratio, longer edge at most `max_edge`. Never upscales.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width > height && width > max_edge {
        let h = (height as f64 * max_edge as f64 / width as f64).round().max(1.0) as u32;
        (max_edge, h)
    } else if height > max_edge {
        let w = (width as f64 * max_edge as f64 / height as f64).round().max(1.0) as u32;
        (w, max_edge)
    } else {
        (width, height)
    }
}

/// Decodes any supported image, downsizes it and re-encodes as JPEG.
/// Transparent pixels are flattened onto white.
pub fn normalize_image(bytes: &[u8], options: NormalizeOptions) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let (w, h) = fit_within(decoded.width(), decoded.height(), options.max_edge);
    let resized = if (w, h) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(w, h, FilterType::Lanczos3)
    };

    let rgba = resized.to_rgba8();
    let mut flattened = image::RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, options.quality).encode_image(&flattened)?;
    Ok(out)
}

/// `IMG_0001.PNG` -> `IMG_0001.jpg`
pub fn jpeg_file_name(original: &str) -> String {
    let stem = match original.rfind('.') {
        Some(idx) if idx > 0 => &original[..idx],
        _ => original,
    };
    format!("{stem}.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 128]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn fit_preserves_aspect_and_never_upscales() {
        assert_eq!(fit_within(2560, 1440, 1280), (1280, 720));
        assert_eq!(fit_within(1000, 3000, 1280), (427, 1280));
        assert_eq!(fit_within(640, 480, 1280), (640, 480));
        assert_eq!(fit_within(1280, 1280, 1280), (1280, 1280));
        assert_eq!(fit_within(1500, 1500, 1280), (1280, 1280));
    }

    #[test]
    fn large_png_becomes_bounded_jpeg() {
        let jpeg = normalize_image(&png(1600, 400), NormalizeOptions::default()).unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1280, 320));
    }

    #[test]
    fn small_image_keeps_its_size() {
        let jpeg = normalize_image(&png(300, 200), NormalizeOptions::default()).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 200));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(normalize_image(b"definitely not an image", NormalizeOptions::default()).is_err());
    }

    #[test]
    fn file_names_get_jpg_extension() {
        assert_eq!(jpeg_file_name("IMG_0001.PNG"), "IMG_0001.jpg");
        assert_eq!(jpeg_file_name("archive.tar.gz"), "archive.tar.jpg");
        assert_eq!(jpeg_file_name("noext"), "noext.jpg");
        assert_eq!(jpeg_file_name(".hidden"), ".hidden.jpg");
    }
}
