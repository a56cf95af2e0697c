mod app;
mod http;
mod renderer;
mod worker;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lanescope_core::model::{GroupBy, SortKey, TraceModel, reorder};
use lanescope_core::svg::render_svg;
use lanescope_core::views::{render_lane_labels, render_time_axis, render_timeline};
use lanescope_core::{
    BatchSource, BatchStream, RecordedSource, SyntheticConfig, SyntheticSource, ViewerConfig,
    ViewportController,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::http::HttpSource;
use crate::worker::FetchWorker;

/// Height of the time axis in exported SVGs.
const EXPORT_AXIS_HEIGHT: f64 = 20.0;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GroupArg {
    Id,
    Name,
}

impl From<GroupArg> for GroupBy {
    fn from(arg: GroupArg) -> Self {
        match arg {
            GroupArg::Id => GroupBy::Id,
            GroupArg::Name => GroupBy::Name,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Start,
    Duration,
    Running,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Start => SortKey::Start,
            SortArg::Duration => SortKey::Duration,
            SortArg::Running => SortKey::Running,
        }
    }
}

/// Stream a goroutine trace and browse it in the terminal.
#[derive(Debug, Parser)]
#[command(name = "lanescope", version)]
struct Args {
    /// Base URL of the trace server. Defaults to the configured endpoint.
    #[arg(long, conflicts_with_all = ["file", "synthetic"])]
    url: Option<String>,

    /// Replay batches recorded as concatenated JSON documents.
    #[arg(long, conflicts_with = "synthetic")]
    file: Option<PathBuf>,

    /// Generate a random trace locally instead of fetching one.
    #[arg(long)]
    synthetic: bool,

    /// Seed for `--synthetic`.
    #[arg(long, default_value_t = 1234)]
    seed: u32,

    /// TOML file with viewer settings.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    group_by: Option<GroupArg>,

    #[arg(long, value_enum)]
    sort_by: Option<SortArg>,

    /// Write logs here; the interactive view otherwise discards them.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Load the whole trace, write it as SVG to this path and exit.
    #[arg(long)]
    export_svg: Option<PathBuf>,

    /// Width of the exported SVG in pixels.
    #[arg(long, default_value_t = 1600.0)]
    width: f64,
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_env("LANESCOPE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        builder.with_writer(Mutex::new(file)).with_ansi(false).init();
    } else if args.export_svg.is_some() {
        builder.with_writer(io::stderr).init();
    } else {
        // The terminal belongs to the viewer.
        builder.with_writer(io::sink).init();
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ViewerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let src = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ViewerConfig::from_toml_str(&src)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => ViewerConfig::default(),
    };
    if let Some(group_by) = args.group_by {
        config.group_by = group_by.into();
    }
    if let Some(sort_by) = args.sort_by {
        config.sort_by = sort_by.into();
    }
    Ok(config)
}

fn open_source(args: &Args, config: &ViewerConfig) -> Result<Box<dyn BatchSource + Send>> {
    if let Some(path) = &args.file {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let source = RecordedSource::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(path = %path.display(), batches = source.len(), "replaying recorded trace");
        return Ok(Box::new(source));
    }
    if args.synthetic {
        let synthetic = SyntheticConfig {
            seed: args.seed,
            ..SyntheticConfig::default()
        };
        info!(seed = synthetic.seed, units = synthetic.units, "generating synthetic trace");
        return Ok(Box::new(SyntheticSource::new(synthetic)));
    }
    let base = args.url.as_deref().unwrap_or(&config.endpoint);
    info!(%base, "streaming from trace server");
    Ok(Box::new(HttpSource::new(base)?))
}

/// Render the complete trace at full height, one lane per row.
fn export_svg(
    mut source: Box<dyn BatchSource + Send>,
    config: &ViewerConfig,
    path: &Path,
    width: f64,
) -> Result<()> {
    let mut model = TraceModel::new();
    let batches = BatchStream::new()
        .drain(&mut source, &mut model)
        .context("failed to load trace")?;
    let lanes = reorder(&model, config.group_by, config.sort_by);

    let mut controller = ViewportController::new(config);
    let height = lanes.len() as f64 * controller.lane_pitch();
    controller.resize(width, height);
    controller.sync(model.time_range(), lanes.len());

    let timeline = render_timeline(&model, &lanes, &controller)?;
    let mut commands = render_time_axis(&controller, EXPORT_AXIS_HEIGHT, config.min_tick_spacing);
    commands.extend(
        timeline
            .commands
            .iter()
            .chain(&render_lane_labels(&lanes, &controller))
            .map(|c| c.translated(0.0, EXPORT_AXIS_HEIGHT)),
    );

    let svg = render_svg(&commands, width, height + EXPORT_AXIS_HEIGHT);
    std::fs::write(path, svg).with_context(|| format!("failed to write {}", path.display()))?;
    info!(
        batches,
        lanes = lanes.len(),
        spans = timeline.stats.spans_drawn,
        path = %path.display(),
        "exported svg"
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    let config = load_config(&args)?;
    let source = open_source(&args, &config)?;

    if let Some(path) = &args.export_svg {
        return export_svg(source, &config, path, args.width);
    }

    let worker = FetchWorker::spawn(source).context("failed to start fetch thread")?;
    let mut app = App::new(&config, false);
    renderer::run(&mut app, &worker)
}
