//! Content-addressed, time-bounded artifact cache.
//!
//! Keys hash the full request (document + options), never the output, so
//! identical requests share one entry. Entries expire lazily: a stale entry
//! is dropped by the read that finds it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{CanvasDocument, RenderOptions, RenderedArtifact, Result};

#[derive(Serialize)]
struct KeyMaterial<'a> {
    document: &'a CanvasDocument,
    options: &'a RenderOptions,
}

/// Deterministic hex SHA-256 over the serialized request.
///
/// Sections are an ordered map, so equal documents serialize identically.
pub fn cache_key(document: &CanvasDocument, options: &RenderOptions) -> Result<String> {
    let material = serde_json::to_vec(&KeyMaterial { document, options })?;
    Ok(hex::encode(Sha256::digest(&material)))
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub artifact: RenderedArtifact,
    pub stored_at: Instant,
}

pub struct ArtifactCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    expiry: Duration,
}

impl ArtifactCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            expiry,
        }
    }

    /// Fresh artifact for `key`, if any. An entry older than the expiry is
    /// removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<RenderedArtifact> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<RenderedArtifact> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if now.saturating_duration_since(entry.stored_at) > self.expiry {
            debug!("Cache entry {} expired", short(key));
            entries.remove(key);
            return None;
        }
        Some(entry.artifact.clone())
    }

    /// Store `artifact`, replacing any previous entry for `key`.
    pub fn put(&self, key: impl Into<String>, artifact: RenderedArtifact) {
        let key = key.into();
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.clone(),
                CacheEntry {
                    key,
                    artifact,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.stored_at) <= self.expiry);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

pub(crate) fn short(key: &str) -> &str {
    &key[..key.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CanvasType, OutputFormat, RenderMetadata};
    use chrono::Utc;

    fn artifact(bytes: &[u8]) -> RenderedArtifact {
        RenderedArtifact {
            format: OutputFormat::Vector,
            mime_type: "image/svg+xml".into(),
            bytes: bytes.to_vec(),
            filename: "canvas.svg".into(),
            filepath: None,
            size_bytes: bytes.len(),
            metadata: RenderMetadata {
                processing_time_ms: 1,
                requested_format: OutputFormat::Vector,
                format: OutputFormat::Vector,
                theme: "professional".into(),
                width: 10,
                height: 10,
                dpi: 300,
                generated_at: Utc::now(),
                cache_hit: false,
                fallback: false,
            },
        }
    }

    #[test]
    fn key_is_deterministic_and_option_sensitive() {
        let doc = CanvasDocument::new(CanvasType::BusinessModel)
            .with_list("channels", ["Web", "Retail"])
            .with_text("title", "Acme");
        let same = CanvasDocument::new(CanvasType::BusinessModel)
            .with_text("title", "Acme")
            .with_list("channels", ["Web", "Retail"]);
        let opts = RenderOptions::default();

        let k1 = cache_key(&doc, &opts).unwrap();
        assert_eq!(k1, cache_key(&same, &opts).unwrap());
        assert_eq!(k1.len(), 64);

        let mut wider = opts.clone();
        wider.width += 1;
        assert_ne!(k1, cache_key(&doc, &wider).unwrap());
    }

    #[test]
    fn put_then_get_returns_same_bytes() {
        let cache = ArtifactCache::new(Duration::from_secs(60));
        cache.put("k", artifact(b"<svg/>"));
        assert_eq!(cache.get("k").unwrap().bytes, b"<svg/>");
        assert!(cache.get("other").is_none());

        cache.put("k", artifact(b"<svg></svg>"));
        assert_eq!(cache.get("k").unwrap().bytes, b"<svg></svg>");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stale_entry_is_evicted_on_read() {
        let cache = ArtifactCache::new(Duration::from_millis(100));
        cache.put("k", artifact(b"x"));
        let later = Instant::now() + Duration::from_millis(500);
        assert!(cache.get_at("k", later).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_removes_only_expired() {
        let cache = ArtifactCache::new(Duration::ZERO);
        cache.put("old", artifact(b"x"));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
