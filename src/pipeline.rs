//! Render entry point: governor -> cache -> compose -> convert -> cache.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::batch::{self, BatchItemResult, BatchOptions};
use crate::cache::{self, cache_key, ArtifactCache};
use crate::compose::compose;
use crate::engine::EngineLifecycleManager;
use crate::governor::ConcurrencyGovernor;
use crate::rendering::{Conversion, Converter};
use crate::templates::TemplateStore;
use crate::{
    CanvasDocument, Error, RenderMetadata, RenderOptions, RenderedArtifact, RendererConfig, Result,
};

/// Counters reported by `CanvasRenderer::stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererStats {
    pub renders: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub active_renders: usize,
    pub queued_renders: usize,
    pub cached_artifacts: usize,
}

/// The rendering pipeline. Owns the template store, governor and cache, and
/// shares the document engine manager with whoever created it.
pub struct CanvasRenderer {
    config: RendererConfig,
    templates: TemplateStore,
    converter: Converter,
    governor: ConcurrencyGovernor,
    cache: Option<ArtifactCache>,
    renders: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

impl CanvasRenderer {
    /// Build a renderer using the compiled-in browser backend.
    pub fn new(config: RendererConfig) -> Result<Self> {
        let engine = Arc::new(EngineLifecycleManager::with_default_launcher(config.engine.clone()));
        Self::with_engine(config, engine)
    }

    /// Build a renderer around an existing engine manager.
    pub fn with_engine(config: RendererConfig, engine: Arc<EngineLifecycleManager>) -> Result<Self> {
        config.validate()?;

        let templates = match &config.templates_path {
            Some(dir) => TemplateStore::load_from_dir(dir)?,
            None => TemplateStore::new(),
        };
        let cache = config
            .enable_caching
            .then(|| ArtifactCache::new(Duration::from_millis(config.cache_expiry_ms)));
        let governor =
            ConcurrencyGovernor::new(config.max_concurrent_renders).with_queue_limit(config.max_queue_depth);

        Ok(Self {
            converter: Converter::new(engine, config.raster_quality),
            templates,
            governor,
            cache,
            config,
            renders: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    /// Render one canvas.
    ///
    /// Options are validated before any work starts. The render then holds a
    /// governor slot until it returns, whatever the outcome.
    pub async fn render(&self, doc: &CanvasDocument, options: &RenderOptions) -> Result<RenderedArtifact> {
        options.validate()?;

        let slot = self.governor.acquire().await?;
        let result = match self.config.render_timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), self.render_in_slot(doc, options))
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(ms))),
            None => self.render_in_slot(doc, options).await,
        };
        slot.release();

        if let Err(e) = &result {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!("{} render failed: {}", doc.canvas_type, e);
        }
        result
    }

    async fn render_in_slot(&self, doc: &CanvasDocument, options: &RenderOptions) -> Result<RenderedArtifact> {
        let started = Instant::now();
        let key = cache_key(doc, options)?;

        if let Some(cache) = &self.cache {
            if let Some(mut artifact) = cache.get(&key) {
                debug!("Cache hit for {}", cache::short(&key));
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                artifact.metadata.cache_hit = true;
                return Ok(artifact);
            }
            debug!("Cache miss for {}", cache::short(&key));
        }

        let generated_at = Utc::now();
        let template = self.templates.get_template(doc.canvas_type, &options.theme);
        let svg = compose(&template, doc, options, generated_at);
        let conversion = self.converter.convert(svg, options).await?;

        let filename = artifact_filename(generated_at, &key, &conversion);
        let filepath = self.write_artifact(&filename, &conversion.bytes).await;

        let artifact = RenderedArtifact {
            format: conversion.format,
            mime_type: conversion.mime_type.to_string(),
            size_bytes: conversion.bytes.len(),
            bytes: conversion.bytes,
            filename,
            filepath,
            metadata: RenderMetadata {
                processing_time_ms: started.elapsed().as_millis() as u64,
                requested_format: options.format,
                format: conversion.format,
                theme: options.theme.clone(),
                width: options.width,
                height: options.height,
                dpi: options.dpi,
                generated_at,
                cache_hit: false,
                fallback: conversion.fallback,
            },
        };
        self.renders.fetch_add(1, Ordering::Relaxed);

        if let Some(cache) = &self.cache {
            cache.put(key, artifact.clone());
        }
        Ok(artifact)
    }

    /// Durability copy under `output_path`. Failures are logged, never raised.
    async fn write_artifact(&self, filename: &str, bytes: &[u8]) -> Option<PathBuf> {
        let dir = self.config.output_path.as_ref()?;
        let path = dir.join(filename);
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, bytes).await
        }
        .await;
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to write artifact {:?}: {}", path, e);
                None
            }
        }
    }

    /// Render many canvases in groups of `batch.concurrency`; see `batch`.
    pub async fn batch_render(&self, docs: &[CanvasDocument], batch: &BatchOptions) -> Vec<BatchItemResult> {
        batch::run_batch(self, docs, batch).await
    }

    /// Close the document engine. Idempotent.
    pub async fn shutdown(&self) {
        info!("Shutting down canvas renderer");
        self.converter.engine().shutdown().await;
    }

    pub fn engine(&self) -> &Arc<EngineLifecycleManager> {
        self.converter.engine()
    }

    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    pub fn cache(&self) -> Option<&ArtifactCache> {
        self.cache.as_ref()
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn stats(&self) -> RendererStats {
        RendererStats {
            renders: self.renders.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            active_renders: self.governor.active_count(),
            queued_renders: self.governor.queued_count(),
            cached_artifacts: self.cache.as_ref().map_or(0, ArtifactCache::len),
        }
    }
}

/// `canvas_<timestamp>_<key prefix>.<ext>`, with a `_fallback` marker when
/// paginated output degraded to SVG.
fn artifact_filename(generated_at: DateTime<Utc>, key: &str, conversion: &Conversion) -> String {
    let stamp = generated_at.format("%Y%m%d_%H%M%S_%3f");
    let marker = if conversion.fallback { "_fallback" } else { "" };
    format!("canvas_{}_{}{}.{}", stamp, cache::short(key), marker, conversion.extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutputFormat;
    use chrono::TimeZone;

    #[test]
    fn filename_carries_timestamp_and_marker() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let mut conv = Conversion {
            format: OutputFormat::Vector,
            mime_type: "image/svg+xml",
            extension: "svg",
            bytes: Vec::new(),
            fallback: false,
        };
        assert_eq!(artifact_filename(at, "abcdef0123", &conv), "canvas_20240506_070809_000_abcdef01.svg");
        conv.fallback = true;
        assert_eq!(
            artifact_filename(at, "abcdef0123", &conv),
            "canvas_20240506_070809_000_abcdef01_fallback.svg"
        );
    }

    #[tokio::test]
    async fn invalid_options_rejected_before_work() {
        let renderer = CanvasRenderer::new(RendererConfig::default()).unwrap();
        let opts = RenderOptions {
            height: 0,
            ..Default::default()
        };
        let doc = CanvasDocument::new(crate::CanvasType::BusinessModel);
        assert!(matches!(renderer.render(&doc, &opts).await, Err(Error::ConfigError(_))));
        assert_eq!(renderer.stats().renders, 0);
        assert_eq!(renderer.engine().stats().await.launch_attempts, 0);
    }
}
