// src/images/encode.rs
//
// Pixel-level normalization for cached images: flatten transparency onto an
// opaque background, bound the longest edge, re-encode as JPEG at a fixed
// quality. Watermarking produces a throwaway derived file next to the
// original; the caller deletes it after upload.

use anyhow::{Context, Result};
use image::{imageops::FilterType, ExtendedColorType, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Decode arbitrary image bytes and produce a bounded, opaque JPEG.
pub fn normalize_jpeg(bytes: &[u8], max_edge: u32, quality: u8) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes).context("decode image bytes")?;
    let mut rgb = flatten_to_rgb(&decoded);

    let (w, h) = rgb.dimensions();
    let (tw, th) = target_size(w, h, max_edge);
    if (tw, th) != (w, h) {
        rgb = image::imageops::resize(&rgb, tw, th, FilterType::Lanczos3);
    }

    encode_jpeg(&rgb, quality)
}

/// Produce a watermarked copy (`*_wm.jpg`) alongside `path`. The mark is a
/// translucent banner across the bottom of the frame.
pub fn watermark_copy(path: &Path, quality: u8) -> Result<PathBuf> {
    let decoded = image::open(path)
        .with_context(|| format!("open image for watermark: {}", path.display()))?;
    let mut rgb = flatten_to_rgb(&decoded);

    apply_banner(&mut rgb);

    let out_path = derived_path(path);
    let bytes = encode_jpeg(&rgb, quality)?;
    std::fs::write(&out_path, bytes)
        .with_context(|| format!("write watermarked copy: {}", out_path.display()))?;
    Ok(out_path)
}

fn derived_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    path.with_file_name(format!("{stem}_wm.jpg"))
}

fn flatten_to_rgb(img: &image::DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        // Composite over white, the opaque background of the feed page.
        let blend = |c: u8| -> u8 { ((c as u32 * a + 255 * (255 - a)) / 255) as u8 };
        out.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn apply_banner(img: &mut RgbImage) {
    let (w, h) = img.dimensions();
    if h < 16 {
        return;
    }
    let band = (h / 8).clamp(12, 96);
    let top = h - band;
    for y in top..h {
        for x in 0..w {
            let px = img.get_pixel_mut(x, y);
            for c in px.0.iter_mut() {
                // 55% toward black.
                *c = ((*c as u32 * 45) / 100) as u8;
            }
        }
    }
    // Thin light rule separating the banner from the frame.
    for y in top.saturating_sub(2)..top {
        for x in 0..w {
            let px = img.get_pixel_mut(x, y);
            for c in px.0.iter_mut() {
                *c = (*c as u32 * 30 / 100 + 255 * 70 / 100) as u8;
            }
        }
    }
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let (w, h) = rgb.dimensions();
    let mut out = Cursor::new(Vec::new());
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
        .context("encode jpeg")?;
    Ok(out.into_inner())
}

fn target_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }
    if width >= height {
        let scaled = ((height as f64) * (max_edge as f64) / (width as f64)).round() as u32;
        (max_edge, scaled.max(1))
    } else {
        let scaled = ((width as f64) * (max_edge as f64) / (height as f64)).round() as u32;
        (scaled.max(1), max_edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 200, 30, 128]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn normalize_bounds_longest_edge_and_flattens_alpha() {
        let jpeg = normalize_jpeg(&png_bytes(1600, 800), 800, 85).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 800);
        assert_eq!(decoded.height(), 400);
        assert_eq!(decoded.color().channel_count(), 3);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let jpeg = normalize_jpeg(&png_bytes(100, 60), 800, 85).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 60));
    }

    #[test]
    fn watermark_writes_a_derived_file_and_darkens_the_band() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("pic.jpg");
        let plain = normalize_jpeg(&png_bytes(200, 200), 800, 90).unwrap();
        std::fs::write(&src, plain).unwrap();

        let wm = watermark_copy(&src, 90).unwrap();
        assert!(wm.ends_with("pic_wm.jpg"));
        assert!(wm.exists());

        let orig = image::open(&src).unwrap().to_rgb8();
        let marked = image::open(&wm).unwrap().to_rgb8();
        let y = orig.height() - 5;
        assert!(marked.get_pixel(100, y).0[1] < orig.get_pixel(100, y).0[1]);
    }
}
