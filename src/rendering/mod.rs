//! Output conversion: vector passthrough, local raster, or paginated PDF.

pub mod paginate;
pub mod raster;
pub mod vector;

use std::sync::Arc;

use crate::engine::EngineLifecycleManager;
use crate::templates::Theme;
use crate::{ConversionStage, Error, OutputFormat, RenderOptions, Result};

pub use paginate::{wrap_html, Paginated};
pub use raster::rasterize;
pub use vector::optimize_svg;

/// Bytes produced for one render, in the format actually delivered.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub format: OutputFormat,
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub bytes: Vec<u8>,
    /// Paginated output was requested but the SVG is returned instead
    pub fallback: bool,
}

pub struct Converter {
    engine: Arc<EngineLifecycleManager>,
    raster_quality: u8,
}

impl Converter {
    pub fn new(engine: Arc<EngineLifecycleManager>, raster_quality: u8) -> Self {
        Self {
            engine,
            raster_quality,
        }
    }

    /// Convert a composed SVG into the format requested by `options`.
    pub async fn convert(&self, svg: String, options: &RenderOptions) -> Result<Conversion> {
        let encoding = options.raster_encoding;
        match options.format {
            OutputFormat::Vector => Ok(vector_conversion(&svg, false)),
            OutputFormat::Raster => {
                let (width, height) = (options.width, options.height);
                let background = Theme::by_name(&options.theme).background_rgb();
                let quality = self.raster_quality;
                let bytes = tokio::task::spawn_blocking(move || {
                    rasterize(&svg, width, height, background, encoding, quality)
                })
                .await
                .map_err(|e| Error::conversion(ConversionStage::Raster, format!("raster task aborted: {}", e)))??;
                Ok(Conversion {
                    format: OutputFormat::Raster,
                    mime_type: OutputFormat::Raster.mime_type(encoding),
                    extension: OutputFormat::Raster.extension(encoding),
                    bytes,
                    fallback: false,
                })
            }
            OutputFormat::PaginatedDocument => match paginate::paginate(&svg, &self.engine).await? {
                Paginated::Pdf(bytes) => Ok(Conversion {
                    format: OutputFormat::PaginatedDocument,
                    mime_type: OutputFormat::PaginatedDocument.mime_type(encoding),
                    extension: OutputFormat::PaginatedDocument.extension(encoding),
                    bytes,
                    fallback: false,
                }),
                Paginated::Fallback { .. } => Ok(vector_conversion(&svg, true)),
            },
        }
    }

    pub fn engine(&self) -> &Arc<EngineLifecycleManager> {
        &self.engine
    }
}

fn vector_conversion(svg: &str, fallback: bool) -> Conversion {
    Conversion {
        format: OutputFormat::Vector,
        mime_type: "image/svg+xml",
        extension: "svg",
        bytes: optimize_svg(svg).into_bytes(),
        fallback,
    }
}
