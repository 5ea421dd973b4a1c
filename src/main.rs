use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use canvas_render::{
    parse_format, BatchOptions, CanvasDocument, CanvasRenderer, RenderOptions, RendererConfig, TemplateStore,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(name = "canvas-render", version, about = "Render business canvases to SVG, PNG/JPEG or PDF")]
struct Cli {
    /// JSON renderer configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a single canvas document
    Render {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Render a JSON array of canvas documents
    Batch {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Items rendered per group (default: min(CPUs, maxConcurrentRenders))
        #[arg(short, long)]
        concurrency: Option<usize>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Print the SVG template for a canvas type and theme
    Templates {
        #[arg(long, default_value = "businessModel")]
        canvas_type: String,
        #[arg(long)]
        theme: Option<String>,
    },
}

#[derive(Args)]
struct OptionArgs {
    /// svg|vector, png|jpeg|raster, pdf|paginatedDocument
    #[arg(short, long)]
    format: Option<String>,
    #[arg(short, long)]
    theme: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    dpi: Option<u32>,
    /// Omit the embedded <metadata> element
    #[arg(long)]
    no_metadata: bool,
}

impl OptionArgs {
    fn apply(&self, config: &RendererConfig) -> anyhow::Result<RenderOptions> {
        let mut options = RenderOptions::from_config(config);
        if let Some(f) = &self.format {
            let (format, encoding) = parse_format(f)?;
            options.format = format;
            if let Some(encoding) = encoding {
                options.raster_encoding = encoding;
            }
        }
        if let Some(t) = &self.theme {
            options.theme = t.clone();
        }
        if let Some(w) = self.width {
            options.width = w;
        }
        if let Some(h) = self.height {
            options.height = h;
        }
        if let Some(d) = self.dpi {
            options.dpi = d;
        }
        options.include_metadata = !self.no_metadata;
        options.validate()?;
        Ok(options)
    }
}

fn load_config(path: Option<&Path>, output_dir: Option<PathBuf>) -> anyhow::Result<RendererConfig> {
    let mut config = match path {
        Some(p) => {
            let raw = fs::read_to_string(p).with_context(|| format!("reading config {:?}", p))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {:?}", p))?
        }
        None => RendererConfig::default(),
    };
    if let Some(dir) = output_dir {
        config.output_path = Some(dir);
    } else if config.output_path.is_none() {
        config.output_path = Some(PathBuf::from("output"));
    }
    config.validate()?;
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {:?}", path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            input,
            output_dir,
            options,
        } => {
            let config = load_config(cli.config.as_deref(), output_dir)?;
            let options = options.apply(&config)?;
            let doc: CanvasDocument = read_json(&input)?;

            let renderer = CanvasRenderer::new(config)?;
            let result = renderer.render(&doc, &options).await;
            renderer.shutdown().await;

            let artifact = result?;
            println!("{}", serde_json::to_string_pretty(&artifact)?);
        }
        Command::Batch {
            input,
            output_dir,
            concurrency,
            options,
        } => {
            let config = load_config(cli.config.as_deref(), output_dir)?;
            let options = options.apply(&config)?;
            let docs: Vec<CanvasDocument> = read_json(&input)?;
            let concurrency =
                concurrency.unwrap_or_else(|| num_cpus::get().min(config.max_concurrent_renders));

            let renderer = CanvasRenderer::new(config)?;
            let results = renderer
                .batch_render(&docs, &BatchOptions::new(concurrency, options))
                .await;
            renderer.shutdown().await;

            let report: Vec<_> = results
                .iter()
                .map(|r| match r {
                    canvas_render::BatchItemResult::Success { index, artifact } => {
                        json!({ "index": index, "success": true, "result": artifact })
                    }
                    canvas_render::BatchItemResult::Failure {
                        index,
                        canvas_id,
                        error,
                    } => json!({
                        "index": index,
                        "success": false,
                        "canvasId": canvas_id,
                        "error": error.to_string(),
                    }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Templates { canvas_type, theme } => {
            let config = match cli.config.as_deref() {
                Some(p) => read_json::<RendererConfig>(p)?,
                None => RendererConfig::default(),
            };
            let store = match &config.templates_path {
                Some(dir) => TemplateStore::load_from_dir(dir)?,
                None => TemplateStore::new(),
            };
            let theme = theme.unwrap_or(config.default_theme);
            print!("{}", store.get_template_by_name(&canvas_type, &theme));
        }
    }
    Ok(())
}
