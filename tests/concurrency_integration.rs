use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use canvas_render::{
    CanvasDocument, CanvasRenderer, CanvasType, DocumentEngine, EngineLauncher, EngineLifecycleManager, Error,
    LaunchConfig, OutputFormat, PageSize, RenderOptions, RendererConfig,
};

/// Tracks how many documents are being printed at once.
struct GaugeEngine {
    in_flight: AtomicUsize,
    peak: Arc<AtomicUsize>,
}

impl DocumentEngine for GaugeEngine {
    fn print_pdf(&self, _html: &str, _page: PageSize) -> canvas_render::Result<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(40));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(b"%PDF-1.7".to_vec())
    }

    fn close(&self) -> canvas_render::Result<()> {
        Ok(())
    }
}

struct GaugeLauncher {
    peak: Arc<AtomicUsize>,
}

impl EngineLauncher for GaugeLauncher {
    fn launch(&self, _config: &LaunchConfig) -> canvas_render::Result<Arc<dyn DocumentEngine>> {
        Ok(Arc::new(GaugeEngine {
            in_flight: AtomicUsize::new(0),
            peak: self.peak.clone(),
        }))
    }
}

fn renderer(config: RendererConfig) -> (Arc<CanvasRenderer>, Arc<AtomicUsize>) {
    let peak = Arc::new(AtomicUsize::new(0));
    let launcher = GaugeLauncher { peak: peak.clone() };
    let engine = Arc::new(EngineLifecycleManager::new(Arc::new(launcher), LaunchConfig::default()));
    (Arc::new(CanvasRenderer::with_engine(config, engine).unwrap()), peak)
}

fn pdf_options() -> RenderOptions {
    RenderOptions {
        format: OutputFormat::PaginatedDocument,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engine_never_sees_more_than_max_concurrent() {
    let (renderer, peak) = renderer(RendererConfig {
        max_concurrent_renders: 2,
        enable_caching: false,
        ..Default::default()
    });

    let mut handles = Vec::new();
    for i in 0..8 {
        let renderer = renderer.clone();
        handles.push(tokio::spawn(async move {
            let doc = CanvasDocument::new(CanvasType::ValueProposition).with_list("gains", [format!("gain {}", i)]);
            renderer.render(&doc, &pdf_options()).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak was {}", peak);
    let stats = renderer.stats();
    assert_eq!(stats.renders, 8);
    assert_eq!(stats.active_renders, 0);
    assert_eq!(stats.queued_renders, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_queue_rejects_instead_of_waiting() {
    let (renderer, _) = renderer(RendererConfig {
        max_concurrent_renders: 1,
        max_queue_depth: Some(1),
        enable_caching: false,
        ..Default::default()
    });

    let mut handles = Vec::new();
    for i in 0..4 {
        let renderer = renderer.clone();
        handles.push(tokio::spawn(async move {
            let doc = CanvasDocument::new(CanvasType::BusinessModel).with_text("channels", format!("c{}", i));
            renderer.render(&doc, &pdf_options()).await
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut exhausted = 0;
    for h in handles {
        if let Err(Error::ResourceExhausted { .. }) = h.await.unwrap() {
            exhausted += 1;
        }
    }
    assert!(exhausted >= 1);
}
