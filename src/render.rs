use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, Rgba, RgbaImage};

use crate::backmap::{DisplayPixel, RecoloredRaster};
use crate::color::{ColorLookup, Colormap};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("base image is {base_w}x{base_h} but the layer is {layer_w}x{layer_h}")]
    SizeMismatch {
        base_w: u32,
        base_h: u32,
        layer_w: u32,
        layer_h: u32,
    },
    #[error("overlay alpha {0} is outside 0..=1")]
    InvalidAlpha(f32),
    #[error("raster of {width}x{height} does not fit an image buffer")]
    TooLarge { width: usize, height: usize },
}

/// Turn a raster into an RGBA image; background pixels are fully transparent.
pub fn colorize<T: DisplayPixel>(
    raster: &RecoloredRaster<T>,
    colormap: Colormap,
) -> Result<RgbaImage, RenderError> {
    let too_large = || RenderError::TooLarge {
        width: raster.width(),
        height: raster.height(),
    };
    let width = u32::try_from(raster.width()).map_err(|_| too_large())?;
    let height = u32::try_from(raster.height()).map_err(|_| too_large())?;

    let lookup = ColorLookup::new(colormap, raster);
    let mut img = RgbaImage::new(width, height);
    for ((pixel, &value), &bg) in img
        .pixels_mut()
        .zip(raster.values())
        .zip(raster.background())
    {
        *pixel = if bg {
            Rgba([0, 0, 0, 0])
        } else {
            lookup.color_for(value)
        };
    }
    Ok(img)
}

/// Blend `layer` over `base` with the given opacity. Transparent layer pixels
/// leave the base untouched.
pub fn overlay(base: &DynamicImage, layer: &RgbaImage, alpha: f32) -> Result<RgbaImage, RenderError> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(RenderError::InvalidAlpha(alpha));
    }
    if base.width() != layer.width() || base.height() != layer.height() {
        return Err(RenderError::SizeMismatch {
            base_w: base.width(),
            base_h: base.height(),
            layer_w: layer.width(),
            layer_h: layer.height(),
        });
    }

    // Microscopy images are often 16-bit and dim; stretch to full 8-bit range.
    let mut out = stretch_to_rgba(base);
    for (dst, src) in out.pixels_mut().zip(layer.pixels()) {
        let a = alpha * f32::from(src[3]) / 255.0;
        for c in 0..3 {
            let blended = f32::from(dst[c]) * (1.0 - a) + f32::from(src[c]) * a;
            dst[c] = blended.round() as u8;
        }
        dst[3] = 255;
    }
    Ok(out)
}

fn stretch_to_rgba(base: &DynamicImage) -> RgbaImage {
    let gray = base.to_luma32f();
    let (min, max) = gray
        .pixels()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[0]), hi.max(p[0]))
        });
    let span = max - min;
    RgbaImage::from_fn(base.width(), base.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        let t = if span > 0.0 { (v - min) / span } else { 0.0 };
        let g = (t * 255.0).round() as u8;
        Rgba([g, g, g, 255])
    })
}

pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote {}x{} image to {}", img.width(), img.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backmap::backmap_u8;
    use crate::data::mask::LabelMask;
    use image::{ImageBuffer, Luma};

    fn raster() -> RecoloredRaster<u8> {
        let mask = LabelMask::from_rows(&[[0u32, 1, 1], [2, 2, 0]]).unwrap();
        backmap_u8(&mask, &[10.0, 20.0]).unwrap()
    }

    #[test]
    fn test_colorize_background_is_transparent() {
        let img = colorize(&raster(), Colormap::Grayscale).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(2, 1)[3], 0);
        assert_eq!(*img.get_pixel(1, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(0, 1), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_overlay_keeps_base_under_background() {
        let layer = colorize(&raster(), Colormap::Grayscale).unwrap();
        let base: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(3, 2, vec![0, 100, 100, 100, 100, 200]).unwrap();
        let out = overlay(&DynamicImage::ImageLuma16(base), &layer, 1.0).unwrap();

        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*out.get_pixel(2, 1), Rgba([255, 255, 255, 255]));
        // Fully opaque object pixel replaces the base.
        assert_eq!(*out.get_pixel(0, 1), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(1, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_overlay_half_alpha() {
        let layer = colorize(&raster(), Colormap::Grayscale).unwrap();
        let base: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_raw(3, 2, vec![0; 6]).unwrap();
        let out = overlay(&DynamicImage::ImageLuma8(base), &layer, 0.5).unwrap();
        // Object 2 is white; blended over black at 50%.
        assert_eq!(out.get_pixel(0, 1)[0], 128);
    }

    #[test]
    fn test_overlay_rejects_bad_input() {
        let layer = colorize(&raster(), Colormap::Viridis).unwrap();
        let base = DynamicImage::ImageLuma8(ImageBuffer::new(4, 4));
        assert!(matches!(
            overlay(&base, &layer, 0.5),
            Err(RenderError::SizeMismatch { .. })
        ));
        let base = DynamicImage::ImageLuma8(ImageBuffer::new(3, 2));
        assert_eq!(overlay(&base, &layer, 1.5), Err(RenderError::InvalidAlpha(1.5)));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let img = colorize(&raster(), Colormap::Viridis).unwrap();
        save_png(&img, &path).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back, img);
    }
}
