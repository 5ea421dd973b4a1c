//! Batch coordinator: fans canvases out in fixed-size groups.
//!
//! Group N+1 starts only after every item of group N has finished. Each item
//! succeeds or fails on its own; a failure never cancels siblings or later
//! groups.

use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::pipeline::CanvasRenderer;
use crate::{CanvasDocument, Error, RenderOptions, RenderedArtifact};

fn default_concurrency() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    /// Group size; zero is treated as one
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(flatten)]
    pub options: RenderOptions,
}

impl BatchOptions {
    pub fn new(concurrency: usize, options: RenderOptions) -> Self {
        Self { concurrency, options }
    }
}

/// Outcome of one batch item, in input order.
#[derive(Debug)]
pub enum BatchItemResult {
    Success {
        index: usize,
        artifact: RenderedArtifact,
    },
    Failure {
        index: usize,
        canvas_id: String,
        error: Error,
    },
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchItemResult::Success { .. })
    }

    pub fn index(&self) -> usize {
        match self {
            BatchItemResult::Success { index, .. } | BatchItemResult::Failure { index, .. } => *index,
        }
    }

    pub fn artifact(&self) -> Option<&RenderedArtifact> {
        match self {
            BatchItemResult::Success { artifact, .. } => Some(artifact),
            BatchItemResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            BatchItemResult::Failure { error, .. } => Some(error),
            BatchItemResult::Success { .. } => None,
        }
    }
}

fn canvas_id(doc: &CanvasDocument, index: usize) -> String {
    doc.id.clone().unwrap_or_else(|| format!("canvas-{}", index))
}

pub async fn run_batch(
    renderer: &CanvasRenderer,
    docs: &[CanvasDocument],
    batch: &BatchOptions,
) -> Vec<BatchItemResult> {
    let group_size = batch.concurrency.max(1);
    let mut results = Vec::with_capacity(docs.len());

    for (group, chunk) in docs.chunks(group_size).enumerate() {
        let base = group * group_size;
        let renders = chunk.iter().enumerate().map(|(offset, doc)| {
            let index = base + offset;
            async move {
                match renderer.render(doc, &batch.options).await {
                    Ok(artifact) => BatchItemResult::Success { index, artifact },
                    Err(error) => {
                        let canvas_id = canvas_id(doc, index);
                        warn!("Batch item {} ({}) failed: {}", index, canvas_id, error);
                        BatchItemResult::Failure {
                            index,
                            canvas_id,
                            error,
                        }
                    }
                }
            }
        });
        results.extend(join_all(renders).await);
    }

    let failed = results.iter().filter(|r| !r.is_success()).count();
    info!(
        "Batch of {} finished: {} succeeded, {} failed",
        docs.len(),
        docs.len() - failed,
        failed
    );
    results
}
