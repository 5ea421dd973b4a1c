//! Local raster back end: resvg renders the SVG onto an opaque pixmap and the
//! `image` encoders produce PNG or JPEG bytes.
use std::sync::{Arc, OnceLock};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use log::debug;
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg;

use crate::{ConversionStage, Error, RasterEncoding, Result};

// Avoid pathological allocations from hostile dimensions.
const MAX_DIM: u32 = 16_384;

/// System fonts, loaded once per process.
fn fonts() -> Arc<usvg::fontdb::Database> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            debug!("Loaded {} font faces for rasterization", db.len());
            Arc::new(db)
        })
        .clone()
}

fn raster_err(cause: impl std::fmt::Display) -> Error {
    Error::conversion(ConversionStage::Raster, cause)
}

/// Rasterize `svg` to exactly `width` x `height` pixels over an opaque
/// `background`, then encode. Any failure is fatal; there is no fallback.
pub fn rasterize(
    svg: &str,
    width: u32,
    height: u32,
    background: (u8, u8, u8),
    encoding: RasterEncoding,
    quality: u8,
) -> Result<Vec<u8>> {
    if width == 0 || height == 0 || width > MAX_DIM || height > MAX_DIM {
        return Err(raster_err(format!(
            "raster size {}x{} outside 1..={}",
            width, height, MAX_DIM
        )));
    }

    let options = usvg::Options {
        fontdb: fonts(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(svg, &options).map_err(|e| raster_err(format!("Failed to parse SVG: {}", e)))?;

    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| raster_err("failed to allocate pixmap"))?;
    let (r, g, b) = background;
    pixmap.fill(Color::from_rgba8(r, g, b, 255));

    let size = tree.size();
    let sx = width as f32 / size.width();
    let sy = height as f32 / size.height();
    resvg::render(&tree, Transform::from_scale(sx, sy), &mut pixmap.as_mut());

    // The backdrop is opaque, so premultiplied and straight alpha coincide.
    let rgba = RgbaImage::from_raw(width, height, pixmap.take())
        .ok_or_else(|| raster_err("pixmap size mismatch"))?;
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut out = Vec::new();
    match encoding {
        RasterEncoding::Png => {
            let compression = match quality {
                90..=u8::MAX => CompressionType::Best,
                50..=89 => CompressionType::Default,
                _ => CompressionType::Fast,
            };
            PngEncoder::new_with_quality(&mut out, compression, FilterType::Adaptive)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| raster_err(format!("PNG encoding failed: {}", e)))?;
        }
        RasterEncoding::Jpeg => {
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| raster_err(format!("JPEG encoding failed: {}", e)))?;
        }
    }
    Ok(out)
}
