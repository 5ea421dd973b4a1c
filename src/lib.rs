//! Canvas Render
//!
//! Turns structured business-canvas data into vector graphics and exports the
//! result as SVG, PNG/JPEG or PDF.
//!
//! # Pipeline
//!
//! - **Templates**: a canvas type and theme select a parametrized SVG template
//! - **Composition**: canvas sections are escaped and substituted into it
//! - **Conversion**: vector passthrough, local rasterization (resvg), or
//!   pagination through a lazily launched headless browser
//! - **Governor**: bounds the number of in-flight renders, FIFO queueing
//! - **Cache**: content-addressed, time-bounded artifact cache
//!
//! # Example
//!
//! ```no_run
//! use canvas_render::{CanvasDocument, CanvasRenderer, CanvasType, OutputFormat, RendererConfig};
//!
//! # async fn run() -> canvas_render::Result<()> {
//! let config = RendererConfig::default();
//! let renderer = CanvasRenderer::new(config.clone())?;
//!
//! let doc = CanvasDocument::new(CanvasType::BusinessModel)
//!     .with_list("key_partners", ["Acme", "Beta"]);
//! let mut options = canvas_render::RenderOptions::from_config(&config);
//! options.format = OutputFormat::Raster;
//!
//! let artifact = renderer.render(&doc, &options).await?;
//! println!("{} ({} bytes)", artifact.filename, artifact.size_bytes);
//! renderer.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{ConversionStage, Error, Result};

pub mod batch;
pub mod cache;
pub mod compose;
pub mod engine;
pub mod governor;
pub mod pipeline;
pub mod rendering;
pub mod templates;

// Chrome DevTools Protocol backend for paginated output
#[cfg(feature = "cdp")]
pub mod cdp;

pub use batch::{BatchOptions, BatchItemResult};
pub use cache::ArtifactCache;
pub use engine::{DocumentEngine, EngineLauncher, EngineLifecycleManager, EngineState, LaunchConfig, PageSize};
pub use governor::{ConcurrencyGovernor, RenderSlot};
pub use pipeline::{CanvasRenderer, RendererStats};
pub use templates::{TemplateStore, Theme};

/// The kind of business canvas being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanvasType {
    ValueProposition,
    BusinessModel,
    TestingBusinessIdeas,
}

impl CanvasType {
    pub const ALL: [CanvasType; 3] = [
        CanvasType::ValueProposition,
        CanvasType::BusinessModel,
        CanvasType::TestingBusinessIdeas,
    ];

    /// Wire name, as used in JSON and template override filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanvasType::ValueProposition => "valueProposition",
            CanvasType::BusinessModel => "businessModel",
            CanvasType::TestingBusinessIdeas => "testingBusinessIdeas",
        }
    }

    /// Human-readable title used when the document has no `title` section.
    pub fn display_name(&self) -> &'static str {
        match self {
            CanvasType::ValueProposition => "Value Proposition Canvas",
            CanvasType::BusinessModel => "Business Model Canvas",
            CanvasType::TestingBusinessIdeas => "Testing Business Ideas",
        }
    }

    /// Lenient lookup; unknown names resolve to `None` and callers pick
    /// the default canvas type.
    pub fn from_name(name: &str) -> Option<Self> {
        CanvasType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl Default for CanvasType {
    fn default() -> Self {
        CanvasType::BusinessModel
    }
}

impl fmt::Display for CanvasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single canvas section: free text or a list of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionValue {
    Text(String),
    List(Vec<String>),
}

impl SectionValue {
    /// Entries to lay out; a text section is a single entry.
    pub fn items(&self) -> Vec<&str> {
        match self {
            SectionValue::Text(s) => vec![s.as_str()],
            SectionValue::List(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// Structured canvas content produced upstream. Immutable input to rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    /// Optional caller-supplied reference, reported on batch failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub canvas_type: CanvasType,
    #[serde(default)]
    pub sections: BTreeMap<String, SectionValue>,
}

impl CanvasDocument {
    pub fn new(canvas_type: CanvasType) -> Self {
        Self {
            id: None,
            canvas_type,
            sections: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.sections.insert(key.into(), SectionValue::Text(value.into()));
        self
    }

    pub fn with_list<I, S>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.sections.insert(key.into(), SectionValue::List(items));
        self
    }

    /// The `title` section when it is plain text.
    pub fn title(&self) -> Option<&str> {
        match self.sections.get("title") {
            Some(SectionValue::Text(t)) if !t.trim().is_empty() => Some(t.as_str()),
            _ => None,
        }
    }
}

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    Vector,
    Raster,
    PaginatedDocument,
}

impl OutputFormat {
    pub fn extension(&self, encoding: RasterEncoding) -> &'static str {
        match self {
            OutputFormat::Vector => "svg",
            OutputFormat::Raster => encoding.extension(),
            OutputFormat::PaginatedDocument => "pdf",
        }
    }

    pub fn mime_type(&self, encoding: RasterEncoding) -> &'static str {
        match self {
            OutputFormat::Vector => "image/svg+xml",
            OutputFormat::Raster => encoding.mime_type(),
            OutputFormat::PaginatedDocument => "application/pdf",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Vector => "vector",
            OutputFormat::Raster => "raster",
            OutputFormat::PaginatedDocument => "paginatedDocument",
        };
        f.write_str(name)
    }
}

/// Parses a format name, returning the raster encoding it implies.
///
/// Accepts the canonical names plus the common aliases `svg`, `png`,
/// `jpeg`/`jpg` and `pdf`. Anything else is rejected before rendering starts.
impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_format(s).map(|(format, _)| format)
    }
}

pub fn parse_format(s: &str) -> Result<(OutputFormat, Option<RasterEncoding>)> {
    match s.trim().to_ascii_lowercase().as_str() {
        "vector" | "svg" => Ok((OutputFormat::Vector, None)),
        "raster" => Ok((OutputFormat::Raster, None)),
        "png" => Ok((OutputFormat::Raster, Some(RasterEncoding::Png))),
        "jpeg" | "jpg" => Ok((OutputFormat::Raster, Some(RasterEncoding::Jpeg))),
        "paginateddocument" | "pdf" => Ok((OutputFormat::PaginatedDocument, None)),
        other => Err(Error::ConfigError(format!("Unsupported format: {}", other))),
    }
}

/// Encoding used for raster output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterEncoding {
    #[default]
    Png,
    Jpeg,
}

impl RasterEncoding {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterEncoding::Png => "png",
            RasterEncoding::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            RasterEncoding::Png => "image/png",
            RasterEncoding::Jpeg => "image/jpeg",
        }
    }
}

/// Options that, together with the document, fully determine the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub theme: String,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub include_metadata: bool,
    #[serde(default)]
    pub raster_encoding: RasterEncoding,
}

impl RenderOptions {
    /// Defaults derived from the renderer configuration.
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            format: OutputFormat::Raster,
            theme: config.default_theme.clone(),
            width: 1200,
            height: 800,
            dpi: config.default_dpi,
            include_metadata: true,
            raster_encoding: RasterEncoding::Png,
        }
    }

    /// Reject options that cannot produce output.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::ConfigError(format!(
                "Dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.dpi == 0 {
            return Err(Error::ConfigError("DPI must be positive".into()));
        }
        Ok(())
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&RendererConfig::default())
    }
}

/// Configuration for the rendering pipeline
///
/// The defaults match a single-process deployment: caching on with a one hour
/// expiry, three concurrent renders and no durability write.
///
/// # Examples
///
/// ```
/// let cfg = canvas_render::RendererConfig::default();
/// assert_eq!(cfg.max_concurrent_renders, 3);
/// assert_eq!(cfg.default_dpi, 300);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    /// Directory of SVG template overrides
    pub templates_path: Option<PathBuf>,
    /// Directory each successful render is also written to
    pub output_path: Option<PathBuf>,
    /// Theme used when the caller does not pick one
    pub default_theme: String,
    pub default_dpi: u32,
    pub enable_caching: bool,
    /// Cache entry lifetime in milliseconds
    pub cache_expiry_ms: u64,
    /// Maximum number of renders in flight
    pub max_concurrent_renders: usize,
    /// Raster encoder quality, 1..=100
    pub raster_quality: u8,
    /// Maximum number of queued renders (`None` => unbounded)
    pub max_queue_depth: Option<usize>,
    /// Per-render timeout in milliseconds (`None` => no timeout)
    pub render_timeout_ms: Option<u64>,
    /// Headless browser launch settings
    pub engine: LaunchConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            templates_path: None,
            output_path: None,
            default_theme: "professional".to_string(),
            default_dpi: 300,
            enable_caching: true,
            cache_expiry_ms: 3_600_000,
            max_concurrent_renders: 3,
            raster_quality: 95,
            max_queue_depth: None,
            render_timeout_ms: None,
            engine: LaunchConfig::default(),
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_renders == 0 {
            return Err(Error::ConfigError("maxConcurrentRenders must be at least 1".into()));
        }
        if !(1..=100).contains(&self.raster_quality) {
            return Err(Error::ConfigError(format!(
                "rasterQuality must be within 1..=100, got {}",
                self.raster_quality
            )));
        }
        if self.default_dpi == 0 {
            return Err(Error::ConfigError("defaultDPI must be positive".into()));
        }
        Ok(())
    }
}

/// Descriptive metadata attached to every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMetadata {
    pub processing_time_ms: u64,
    pub requested_format: OutputFormat,
    pub format: OutputFormat,
    pub theme: String,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub generated_at: DateTime<Utc>,
    /// Served from the artifact cache
    pub cache_hit: bool,
    /// Paginated output was requested but the engine was unavailable
    pub fallback: bool,
}

/// The rendered bytes plus metadata. Owned by the caller once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedArtifact {
    /// Format actually produced; may differ from the request on fallback
    pub format: OutputFormat,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub filename: String,
    /// Where the durability copy was written, if it was
    pub filepath: Option<PathBuf>,
    pub size_bytes: usize,
    pub metadata: RenderMetadata,
}
