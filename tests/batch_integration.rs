use std::sync::{Arc, Mutex};
use std::time::Duration;

use canvas_render::{
    BatchOptions, CanvasDocument, CanvasRenderer, CanvasType, DocumentEngine, EngineLauncher,
    EngineLifecycleManager, LaunchConfig, OutputFormat, PageSize, RenderOptions, RendererConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Start(usize),
    End(usize),
}

/// Records when each document starts and finishes printing.
struct RecordingEngine {
    events: Arc<Mutex<Vec<Event>>>,
}

fn marker(html: &str) -> usize {
    let at = html.find("marker-").expect("marker present") + "marker-".len();
    html[at..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap()
}

impl DocumentEngine for RecordingEngine {
    fn print_pdf(&self, html: &str, _page: PageSize) -> canvas_render::Result<Vec<u8>> {
        let index = marker(html);
        self.events.lock().unwrap().push(Event::Start(index));
        std::thread::sleep(Duration::from_millis(30));
        self.events.lock().unwrap().push(Event::End(index));
        Ok(b"%PDF-1.7".to_vec())
    }

    fn close(&self) -> canvas_render::Result<()> {
        Ok(())
    }
}

struct RecordingLauncher {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EngineLauncher for RecordingLauncher {
    fn launch(&self, _config: &LaunchConfig) -> canvas_render::Result<Arc<dyn DocumentEngine>> {
        Ok(Arc::new(RecordingEngine {
            events: self.events.clone(),
        }))
    }
}

fn renderer(config: RendererConfig) -> (CanvasRenderer, Arc<Mutex<Vec<Event>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let launcher = RecordingLauncher { events: events.clone() };
    let engine = Arc::new(EngineLifecycleManager::new(Arc::new(launcher), LaunchConfig::default()));
    (CanvasRenderer::with_engine(config, engine).unwrap(), events)
}

fn batch_options(concurrency: usize, format: OutputFormat) -> BatchOptions {
    BatchOptions::new(
        concurrency,
        RenderOptions {
            format,
            width: 600,
            height: 400,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn one_bad_item_does_not_sink_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("testingBusinessIdeas.svg"), "<svg><g>{{hypothesis}}</svg>").unwrap();
    let (renderer, _) = renderer(RendererConfig {
        templates_path: Some(dir.path().to_path_buf()),
        ..Default::default()
    });

    let docs = vec![
        CanvasDocument::new(CanvasType::BusinessModel).with_list("channels", ["Web"]),
        CanvasDocument::new(CanvasType::ValueProposition).with_list("gains", ["Speed"]),
        CanvasDocument::new(CanvasType::BusinessModel).with_list("channels", ["Retail"]),
        CanvasDocument::new(CanvasType::TestingBusinessIdeas)
            .with_id("experiment-7")
            .with_text("hypothesis", "Users pay"),
        CanvasDocument::new(CanvasType::ValueProposition).with_list("pains", ["Cost"]),
    ];

    let results = renderer.batch_render(&docs, &batch_options(2, OutputFormat::Raster)).await;

    assert_eq!(results.len(), 5);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.index(), i);
    }
    let failures: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(failures.len(), 1);
    match failures[0] {
        canvas_render::BatchItemResult::Failure {
            index,
            canvas_id,
            error,
        } => {
            assert_eq!(*index, 3);
            assert_eq!(canvas_id, "experiment-7");
            assert!(error.to_string().starts_with("Raster conversion failed"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(results[4].artifact().is_some());
    assert_eq!(renderer.governor().active_count(), 0);
}

#[tokio::test]
async fn groups_run_one_after_another() {
    let (renderer, events) = renderer(RendererConfig::default());
    let docs: Vec<_> = (0..5)
        .map(|i| CanvasDocument::new(CanvasType::BusinessModel).with_list("key_partners", [format!("marker-{}", i)]))
        .collect();

    let results = renderer
        .batch_render(&docs, &batch_options(2, OutputFormat::PaginatedDocument))
        .await;
    assert!(results.iter().all(|r| r.is_success()));

    let events = events.lock().unwrap().clone();
    assert_eq!(events.len(), 10);
    let position = |e: Event| events.iter().position(|x| *x == e).unwrap();
    let groups = [vec![0, 1], vec![2, 3], vec![4]];
    for pair in groups.windows(2) {
        let last_end = pair[0].iter().map(|&i| position(Event::End(i))).max().unwrap();
        let first_start = pair[1].iter().map(|&i| position(Event::Start(i))).min().unwrap();
        assert!(last_end < first_start, "group overlap in {:?}", events);
    }
}

#[tokio::test]
async fn empty_batch_is_empty() {
    let (renderer, _) = renderer(RendererConfig::default());
    let results = renderer.batch_render(&[], &batch_options(3, OutputFormat::Vector)).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn zero_concurrency_still_renders() {
    let (renderer, _) = renderer(RendererConfig::default());
    let docs = vec![
        CanvasDocument::new(CanvasType::BusinessModel),
        CanvasDocument::new(CanvasType::ValueProposition),
    ];
    let results = renderer.batch_render(&docs, &batch_options(0, OutputFormat::Vector)).await;
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 2);
}
