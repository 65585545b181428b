//! Image decoding and cleanup before a second OCR attempt.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageOutputFormat};

/// Images narrower than this are upscaled ×2 before the retry.
const MIN_WIDTH: u32 = 1000;

/// Decode any supported upload format.
pub fn decode(data: &[u8]) -> image::ImageResult<DynamicImage> {
    image::load_from_memory(data)
}

/// Re-encode as PNG, the format every provider is sent.
pub fn to_png(img: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)?;
    Ok(buf)
}

/// Grayscale, upscale small images and stretch contrast to the full range.
pub fn enhance_for_ocr(img: &DynamicImage) -> DynamicImage {
    let mut gray = img.to_luma8();

    if gray.width() > 0 && gray.width() < MIN_WIDTH {
        gray = image::imageops::resize(
            &gray,
            gray.width() * 2,
            gray.height() * 2,
            FilterType::Lanczos3,
        );
    }

    autocontrast(&mut gray);
    DynamicImage::ImageLuma8(gray)
}

/// Linear stretch of the observed luma range onto 0..=255.
fn autocontrast(gray: &mut GrayImage) {
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if hi <= lo {
        return;
    }

    let range = (hi - lo) as u32;
    for p in gray.pixels_mut() {
        p.0[0] = ((p.0[0] - lo) as u32 * 255 / range) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_enhance_upscales_and_stretches() {
        let mut gray = GrayImage::new(4, 2);
        for (x, _, p) in gray.enumerate_pixels_mut() {
            *p = Luma([100 + x as u8 * 10]);
        }

        let out = enhance_for_ocr(&DynamicImage::ImageLuma8(gray)).to_luma8();
        assert_eq!(out.dimensions(), (8, 4));

        let min = out.pixels().map(|p| p.0[0]).min().unwrap();
        let max = out.pixels().map(|p| p.0[0]).max().unwrap();
        assert_eq!((min, max), (0, 255));
    }

    #[test]
    fn test_autocontrast_leaves_flat_images() {
        let mut gray = GrayImage::from_pixel(3, 3, Luma([42]));
        autocontrast(&mut gray);
        assert!(gray.pixels().all(|p| p.0[0] == 42));
    }

    #[test]
    fn test_png_round_trip_and_bad_input() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([7])));
        let png = to_png(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(decode(&png).unwrap().to_luma8().dimensions(), (2, 2));

        assert!(decode(b"not an image").is_err());
    }
}
