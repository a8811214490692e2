use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use retext_core::{
    extract_runs, DocumentSnapshot, DrawFailurePolicy, EditorConfig, EditorSession, LoadOutcome,
    NativeDelta, NativePoint, OverlayStore, PageGeometry, PageRenderer, ReinsertionPolicy, Rgb,
    RunId, SaveOutcome, StyleChange, TextRun,
};
use retext_pdf::{decode_all_pages, save_png, LopdfCodec, MediaBoxRenderer};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "retext",
    version,
    about = "Extract, edit and reinsert the text runs of a PDF page"
)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the text runs of a page as JSON
    Inspect {
        file: PathBuf,
        /// Page to inspect (0-based)
        #[arg(short = 'p', long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        scale: Option<f32>,
        /// Extract every page instead of one
        #[arg(long)]
        all_pages: bool,
    },
    /// Apply edits to one page and write a new document
    Edit(EditArgs),
    /// Render a page to PNG
    Render {
        file: PathBuf,
        #[arg(short = 'p', long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        scale: Option<f32>,
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
struct EditArgs {
    file: PathBuf,
    #[arg(short = 'p', long, default_value_t = 0)]
    page: usize,
    /// Replace the text of a run
    #[arg(long = "set", value_name = "ORDER=TEXT")]
    set: Vec<String>,
    /// Change the font family of a run
    #[arg(long = "font", value_name = "ORDER=FAMILY")]
    font: Vec<String>,
    /// Change the colour of a run
    #[arg(long = "color", value_name = "ORDER=#RRGGBB")]
    color: Vec<String>,
    /// Change the font size of a run
    #[arg(long = "size", value_name = "ORDER=POINTS")]
    size: Vec<String>,
    /// Move a run by a native offset
    #[arg(long = "move", value_name = "ORDER=DX,DY", allow_hyphen_values = true)]
    moves: Vec<String>,
    /// Delete a run
    #[arg(long = "remove", value_name = "ORDER")]
    remove: Vec<u32>,
    /// Add a run at a native position
    #[arg(long = "add", value_name = "X,Y=TEXT")]
    add: Vec<String>,
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
    /// Skip runs that cannot be drawn instead of failing the save
    #[arg(long)]
    skip_failed: bool,
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Repaint,
    Overlay,
}

impl From<PolicyArg> for ReinsertionPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Repaint => ReinsertionPolicy::Repaint,
            PolicyArg::Overlay => ReinsertionPolicy::Overlay,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunView {
    order: u32,
    id: RunId,
    content: String,
    native_x: f32,
    native_y: f32,
    font_size: f32,
    width: f32,
    height: f32,
    viewport_x: f32,
    viewport_y: f32,
    viewport_font_size: f32,
    font_family: String,
    color: String,
}

impl From<&TextRun> for RunView {
    fn from(run: &TextRun) -> Self {
        let native = run.native_position();
        let viewport = run.viewport_position();
        Self {
            order: run.order(),
            id: run.id(),
            content: run.content().to_owned(),
            native_x: native.x,
            native_y: native.y,
            font_size: run.effective_font_size(),
            width: run.native_width(),
            height: run.native_height(),
            viewport_x: viewport.x,
            viewport_y: viewport.y,
            viewport_font_size: run.viewport_font_size(),
            font_family: run.font_family().to_owned(),
            color: run.color().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PageView {
    page_index: usize,
    page_count: usize,
    native_width: f32,
    native_height: f32,
    scale: f32,
    runs: Vec<RunView>,
}

impl PageView {
    fn new(page_index: usize, page_count: usize, geometry: PageGeometry, runs: &[TextRun]) -> Self {
        Self {
            page_index,
            page_count,
            native_width: geometry.native_width,
            native_height: geometry.native_height,
            scale: geometry.scale,
            runs: runs.iter().map(RunView::from).collect(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "retext", "retext");
    let _log_guard = init_logging(project_dirs.as_ref())?;

    let config_path = args.config.clone().or_else(EditorConfig::default_path);
    let config = EditorConfig::load_or_default(config_path.as_deref())?;

    match args.command {
        Command::Inspect {
            file,
            page,
            scale,
            all_pages,
        } => inspect(&file, page, scale, all_pages, config).await,
        Command::Edit(edit_args) => edit(edit_args, config).await,
        Command::Render {
            file,
            page,
            scale,
            output,
        } => render(&file, page, scale, &output, &config),
    }
}

fn read_document(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {:?}", path))
}

async fn open_session(path: &Path, page: usize, config: EditorConfig) -> Result<EditorSession> {
    let bytes = read_document(path)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let session = EditorSession::new(Arc::new(LopdfCodec::new()), config);
    session
        .load(&name, &bytes)
        .await
        .with_context(|| format!("failed to open {:?}", path))?;
    if page != 0 {
        match session.goto_page(page).await? {
            LoadOutcome::Loaded(_) => {}
            LoadOutcome::Superseded => bail!("page {page} load was superseded"),
        }
    }
    Ok(session)
}

async fn inspect(
    path: &Path,
    page: usize,
    scale: Option<f32>,
    all_pages: bool,
    config: EditorConfig,
) -> Result<()> {
    let scale = config.scale.clamp(scale.unwrap_or(config.scale.initial));

    let views = if all_pages {
        let bytes = read_document(path)?;
        let defaults = config.default_style();
        decode_all_pages(&bytes)
            .with_context(|| format!("failed to decode {:?}", path))?
            .into_iter()
            .map(|decoded| {
                let geometry = decoded.geometry(scale);
                let extraction = extract_runs(decoded.records, geometry, &defaults);
                PageView::new(
                    decoded.page_index,
                    decoded.page_count,
                    extraction.geometry,
                    &extraction.runs,
                )
            })
            .collect()
    } else {
        let session = open_session(path, page, config).await?;
        session.set_scale(scale);
        vec![PageView::new(
            session.page_index(),
            session.page_count().unwrap_or_default(),
            session.geometry()?,
            &session.runs()?,
        )]
    };

    let json = serde_json::to_string_pretty(&views)?;
    println!("{json}");
    Ok(())
}

async fn edit(args: EditArgs, mut config: EditorConfig) -> Result<()> {
    if let Some(policy) = args.policy {
        config.policy = policy.into();
    }
    if args.skip_failed {
        config.draw_failure = DrawFailurePolicy::Skip;
    }

    let session = open_session(&args.file, args.page, config).await?;
    let default_style = session.config().default_style();
    session.edit(|store| Ok(apply_edits(store, &args, default_style)))??;

    let saved = match session.save().await? {
        SaveOutcome::Saved(saved) => saved,
        SaveOutcome::Superseded => bail!("document changed while saving"),
    };
    let output = args.output.clone().unwrap_or_else(|| {
        args.file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&saved.file_name)
    });
    fs::write(&output, &saved.bytes).with_context(|| format!("failed to write {:?}", output))?;
    info!(output = %output.display(), bytes = saved.bytes.len(), "wrote edited document");
    println!("{}", output.display());
    Ok(())
}

fn run_id(store: &OverlayStore, order: u32) -> Result<RunId> {
    store
        .by_order(order)
        .map(TextRun::id)
        .ok_or_else(|| anyhow!("page has no run with order {order}"))
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {raw:?}"))
}

fn parse_order(raw: &str) -> Result<u32> {
    raw.trim()
        .parse()
        .with_context(|| format!("invalid run order {raw:?}"))
}

fn parse_pair(raw: &str) -> Result<(f32, f32)> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| anyhow!("expected X,Y, got {raw:?}"))?;
    let parse = |v: &str| -> Result<f32> {
        v.trim()
            .parse()
            .with_context(|| format!("invalid number {v:?}"))
    };
    Ok((parse(x)?, parse(y)?))
}

fn apply_edits(
    store: &mut OverlayStore,
    args: &EditArgs,
    default_style: retext_core::RunStyle,
) -> Result<()> {
    for raw in &args.set {
        let (order, text) = split_assignment(raw)?;
        let id = run_id(store, parse_order(order)?)?;
        store.begin_edit(id)?;
        store.commit_edit(id, text)?;
    }
    for raw in &args.font {
        let (order, family) = split_assignment(raw)?;
        let id = run_id(store, parse_order(order)?)?;
        store.set_style(id, StyleChange::FontFamily(family.trim().to_owned()))?;
    }
    for raw in &args.color {
        let (order, color) = split_assignment(raw)?;
        let id = run_id(store, parse_order(order)?)?;
        let color: Rgb = color.parse()?;
        store.set_style(id, StyleChange::Color(color))?;
    }
    for raw in &args.size {
        let (order, size) = split_assignment(raw)?;
        let id = run_id(store, parse_order(order)?)?;
        let size: f32 = size
            .trim()
            .parse()
            .with_context(|| format!("invalid font size {size:?}"))?;
        if !(size.is_finite() && size > 0.0) {
            bail!("font size must be positive, got {size}");
        }
        store.set_style(id, StyleChange::FontSize(size))?;
    }
    for raw in &args.moves {
        let (order, delta) = split_assignment(raw)?;
        let id = run_id(store, parse_order(order)?)?;
        let (dx, dy) = parse_pair(delta)?;
        store.move_run(id, NativeDelta::new(dx, dy))?;
    }
    for raw in &args.add {
        let (position, text) = split_assignment(raw)?;
        let (x, y) = parse_pair(position)?;
        store.add_run(text, NativePoint::new(x, y), default_style.clone());
    }
    for order in &args.remove {
        let id = run_id(store, *order)?;
        store.remove_run(id)?;
    }
    Ok(())
}

fn render(
    path: &Path,
    page: usize,
    scale: Option<f32>,
    output: &Path,
    config: &EditorConfig,
) -> Result<()> {
    let bytes = read_document(path)?;
    let snapshot = DocumentSnapshot::capture(&bytes)?;
    let scale = config.scale.clamp(scale.unwrap_or(config.scale.initial));

    let renderer = page_renderer();
    let mut buffer = snapshot.clone_for_use();
    let rendered = renderer
        .render(&mut buffer, page, scale)
        .with_context(|| format!("failed to render page {page} of {:?}", path))?;
    save_png(&rendered, output)?;
    info!(
        width = rendered.image.width,
        height = rendered.image.height,
        output = %output.display(),
        "rendered page"
    );
    println!("{}", output.display());
    Ok(())
}

fn page_renderer() -> Box<dyn PageRenderer> {
    #[cfg(feature = "pdfium")]
    {
        match retext_pdf::PdfiumRenderer::new() {
            Ok(renderer) => return Box::new(renderer),
            Err(err) => warn!(%err, "pdfium unavailable; rendering blank pages"),
        }
    }
    Box::new(MediaBoxRenderer)
}

fn init_logging(project_dirs: Option<&ProjectDirs>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let log_dir = project_dirs
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .filter(|dir| fs::create_dir_all(dir).is_ok());
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, "retext.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    if guard.is_none() {
        warn!("file logging disabled: no writable data directory");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_split_on_first_equals() {
        assert_eq!(split_assignment("1=a=b").unwrap(), ("1", "a=b"));
        assert!(split_assignment("no-equals").is_err());
    }

    #[test]
    fn pairs_accept_negative_numbers() {
        assert_eq!(parse_pair("-4.5, 10").unwrap(), (-4.5, 10.0));
        assert!(parse_pair("4").is_err());
    }

    #[test]
    fn args_parse_repeated_edits() {
        let args = Args::try_parse_from([
            "retext", "edit", "in.pdf", "--set", "1=Goodbye", "--move", "0=-5,2", "--add",
            "100,100=Stamp", "--policy", "overlay", "-o", "out.pdf",
        ])
        .unwrap();
        let Command::Edit(edit) = args.command else {
            panic!("expected edit command");
        };
        assert_eq!(edit.set, vec!["1=Goodbye"]);
        assert_eq!(edit.moves, vec!["0=-5,2"]);
        assert_eq!(edit.add, vec!["100,100=Stamp"]);
        assert!(matches!(edit.policy, Some(PolicyArg::Overlay)));
    }
}
