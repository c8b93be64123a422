use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use marginalia_core::config::{project_dirs, ZOOM_STEP};
use marginalia_core::{
    persist_session, restore_session, DocumentProvider, FileAnnotationStore, HistoryOutcome,
    KeyChord, Point, PointerOutcome, Tool, ViewerConfig, ZoomMode,
};
use marginalia_render::{DocumentViewer, PdfiumDocumentProvider};
use marginalia_tty::{write_status_line, EventMapper, InputMode, KittyRenderer, Placement, UiEvent};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Document pixels scrolled per wheel line.
const LINE_HEIGHT: f32 = 40.0;

#[derive(Debug, Parser)]
#[command(
    name = "marginalia",
    version,
    about = "annotate PDFs in a kitty-compatible terminal"
)]
struct Args {
    /// PDF file to open
    file: PathBuf,

    /// Page to open on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Configuration file; defaults to config.toml in the platform config directory
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Upper bound on pages holding rendered surfaces
    #[arg(long = "max-pages")]
    max_pages: Option<usize>,

    /// Start in dark mode
    #[arg(long)]
    dark: bool,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

/// Pointer drag state kept by the front-end, in document coordinates.
#[derive(Debug, Default)]
struct DragState {
    start: Option<Point>,
    last: Option<Point>,
}

struct App {
    viewer: DocumentViewer,
    mapper: EventMapper,
    placement: Option<(usize, Placement)>,
    drag: DragState,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs =
        project_dirs().ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .or_else(ViewerConfig::default_path)
        .ok_or_else(|| anyhow!("unable to resolve a configuration path"))?;
    let mut config = ViewerConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {:?}", config_path))?;
    if let Some(max_pages) = args.max_pages {
        config.lifecycle.max_materialized_pages = max_pages.max(1);
    }
    config.dark_mode |= args.dark;

    let store = FileAnnotationStore::new(project_dirs.data_local_dir().join("annotations"))?;
    let provider = PdfiumDocumentProvider::new()?;
    let rasterizer = provider
        .open(&args.file)
        .await
        .with_context(|| format!("failed to open {:?}", args.file))?;

    let mut viewer = DocumentViewer::new(rasterizer, &config);
    let info = viewer.info().clone();
    let restored = restore_session(&store, &info, viewer.session_mut())
        .with_context(|| format!("failed to restore annotations for {:?}", info.path))?;
    viewer.sync_session();
    info!(restored, "annotations restored");

    sync_display_size(&mut viewer).context("failed to read the terminal size")?;
    if let Some(page) = args.page {
        viewer.scroll_to_page(page.clamp(1, info.page_count.max(1)));
    }

    let mut app = App {
        viewer,
        mapper: EventMapper::new(),
        placement: None,
        drag: DragState::default(),
    };
    let sweep_interval = config.lifecycle.sweep_interval();

    let result = {
        let _raw = RawModeGuard::new()?;
        let mut renderer = KittyRenderer::new(io::stdout());
        renderer.clear_all()?;
        let result = run(&mut app, &mut renderer, sweep_interval).await;
        renderer.clear_all()?;
        result
    };

    app.viewer.commit_editor();
    app.viewer.shutdown();
    persist_session(&store, &info, app.viewer.session())
        .with_context(|| format!("failed to save annotations for {:?}", info.path))?;
    result
}

async fn run(
    app: &mut App,
    renderer: &mut KittyRenderer<io::Stdout>,
    sweep_interval: Duration,
) -> Result<()> {
    let mut dirty = true;
    let mut last_sweep = Instant::now();

    loop {
        if app.viewer.drain_completions() > 0 {
            dirty = true;
        }
        if last_sweep.elapsed() >= sweep_interval {
            app.viewer.sweep();
            last_sweep = Instant::now();
        }
        if dirty {
            redraw(app, renderer)?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(50))? {
            let ui_event = app.mapper.map_event(event::read()?);
            match handle_event(app, ui_event) {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
            let mode = if app.viewer.input().editor().is_some() {
                InputMode::TextEntry
            } else {
                InputMode::Normal
            };
            if mode != app.mapper.mode() {
                app.mapper.set_mode(mode);
                dirty = true;
            }
        } else {
            tokio::task::yield_now().await;
        }
    }
    Ok(())
}

fn handle_event(app: &mut App, event: UiEvent) -> LoopAction {
    match event {
        UiEvent::SelectTool(tool) => {
            app.viewer.select_tool(tool);
        }
        UiEvent::ClearTool => app.viewer.tools_mut().clear(),
        UiEvent::CycleColor => {
            app.viewer.tools_mut().cycle_color();
        }
        UiEvent::AdjustStrokeWidth { delta } => {
            let tools = app.viewer.tools_mut();
            let width = tools.stroke_width + delta;
            tools.set_stroke_width(width);
        }
        UiEvent::AdjustAlpha { delta } => {
            let tools = app.viewer.tools_mut();
            let alpha = tools.alpha + delta;
            tools.set_alpha(alpha);
        }
        UiEvent::AdjustTextSize { delta } => {
            let tools = app.viewer.tools_mut();
            let size = tools.text_size + delta;
            tools.set_text_size(size);
        }
        UiEvent::ToggleBold => {
            app.viewer.tools_mut().toggle_bold();
        }
        UiEvent::ToggleItalic => {
            app.viewer.tools_mut().toggle_italic();
        }
        UiEvent::ZoomBy { steps } => {
            app.viewer.zoom_by(steps as f32 * ZOOM_STEP);
        }
        UiEvent::SetZoomMode(mode) => {
            app.viewer.set_zoom_mode(mode);
        }
        UiEvent::ScrollPages { count } => {
            let target = (app.viewer.current_page() as isize + count)
                .clamp(1, app.viewer.info().page_count.max(1) as isize);
            app.viewer.scroll_to_page(target as usize);
        }
        UiEvent::ScrollLines { count } => app.viewer.scroll_by(count as f32 * LINE_HEIGHT),
        UiEvent::ToggleDarkMode => {
            app.viewer.toggle_dark_mode();
        }
        UiEvent::Shortcut(chord) => return shortcut(&mut app.viewer, chord),
        UiEvent::PointerDown { column, row } => {
            let Some(point) = app.cell_to_document(column, row) else {
                return LoopAction::Continue;
            };
            app.drag = DragState {
                start: Some(point),
                last: Some(point),
            };
            let outcome = app.viewer.pointer_down(point);
            log_outcome(&outcome);
        }
        UiEvent::PointerDrag { column, row } => {
            let Some(point) = app.cell_to_document(column, row) else {
                app.viewer.pointer_leave();
                return LoopAction::ContinueRedraw;
            };
            app.drag.last = Some(point);
            app.viewer.pointer_move(point);
        }
        UiEvent::PointerUp { column, row } => {
            let end = app.cell_to_document(column, row).or(app.drag.last);
            let start = app.drag.start.take();
            app.drag.last = None;
            let outcome = app.viewer.pointer_up();
            log_outcome(&outcome);
            if app.viewer.input().tools().active() == Tool::Highlight {
                if let (Some(start), Some(end)) = (start, end) {
                    let outcome = app.viewer.select_text(start, end);
                    log_outcome(&outcome);
                }
            }
        }
        UiEvent::EditorInput(c) => {
            app.viewer.editor_insert(c);
        }
        UiEvent::EditorNewline => {
            app.viewer.editor_newline();
        }
        UiEvent::EditorBackspace => {
            app.viewer.editor_backspace();
        }
        UiEvent::EditorCommit => {
            app.viewer.commit_editor();
        }
        UiEvent::Resize => {
            app.placement = None;
            if let Err(err) = sync_display_size(&mut app.viewer) {
                warn!(%err, "failed to read the terminal size");
            }
        }
        UiEvent::Quit => return LoopAction::Quit,
        UiEvent::None => return LoopAction::Continue,
    }
    LoopAction::ContinueRedraw
}

fn shortcut(viewer: &mut DocumentViewer, chord: KeyChord) -> LoopAction {
    match viewer.handle_shortcut(chord) {
        Some(HistoryOutcome::NothingToUndo) | Some(HistoryOutcome::NothingToRedo) | None => {
            LoopAction::Continue
        }
        Some(_) => LoopAction::ContinueRedraw,
    }
}

fn log_outcome(outcome: &PointerOutcome) {
    if let PointerOutcome::StrokeDiscarded { page } = outcome {
        warn!(page, "stroke too short, discarded");
    }
}

impl App {
    /// Document point under a terminal cell of the displayed page.
    fn cell_to_document(&self, column: u16, row: u16) -> Option<Point> {
        let (page, placement) = self.placement?;
        let (x, y) = placement.cell_to_image(column, row)?;
        let bounds = self.viewer.lifecycle().layout().page_bounds(page)?;
        Some(Point::new(bounds.left + x, bounds.top + y))
    }
}

/// Reports the page area, the window minus the status line, to the viewer.
fn sync_display_size(viewer: &mut DocumentViewer) -> Result<()> {
    let window = terminal::window_size()?;
    let grid = (u32::from(window.columns).max(1), u32::from(window.rows).max(1));
    let available = (grid.0, grid.1.saturating_sub(1).max(1));
    let window_pixels = Some((u32::from(window.width), u32::from(window.height)));
    let (width, height) = Placement::area_pixels(available, grid, window_pixels);
    viewer.set_display_size(width, height);
    Ok(())
}

fn redraw(app: &mut App, renderer: &mut KittyRenderer<io::Stdout>) -> Result<()> {
    let window = terminal::window_size()?;
    let total_cols = u32::from(window.columns).max(1);
    let total_rows = u32::from(window.rows).max(1);
    let image_rows = total_rows.saturating_sub(1).max(1);
    let window_pixels = Some((u32::from(window.width), u32::from(window.height)));

    let page = app.viewer.current_page();
    renderer.begin_sync_update()?;
    if let Some(image) = app.viewer.composite_page(page) {
        let placement = Placement::fit(
            image.width,
            image.height,
            (total_cols, image_rows),
            (total_cols, total_rows),
            window_pixels,
        );
        if app.placement.map(|(_, p)| p) != Some(placement) {
            renderer.clear_all()?;
        }
        crossterm::execute!(
            renderer.writer(),
            cursor::MoveTo(placement.column as u16, placement.row as u16)
        )?;
        renderer.draw(&image, placement.draw_params())?;
        app.placement = Some((page, placement));
    }
    draw_status_line(renderer, &status_text(app, page), total_rows)?;
    renderer.end_sync_update()?;
    Ok(())
}

fn status_text(app: &App, page: usize) -> String {
    let viewer = &app.viewer;
    let tools = viewer.input().tools();
    let session = viewer.session();
    let title = viewer
        .info()
        .metadata
        .title
        .clone()
        .unwrap_or_else(|| viewer.info().path.display().to_string());
    let mut text = format!(
        "{} | page {}/{} | {:.0}%",
        title,
        page,
        viewer.info().page_count,
        viewer.zoom() * 100.0,
    );
    if viewer.zoom_mode() != ZoomMode::Custom {
        text.push_str(&format!(" {}", viewer.zoom_mode().label()));
    }
    text.push_str(&format!(
        " | {} {} w{:.0} a{:.1}",
        tools.active().label(),
        tools.color,
        tools.stroke_width,
        tools.alpha,
    ));
    if tools.active() == Tool::Text {
        text.push_str(&format!(" {:.0}pt", tools.text_size));
    }
    if session.can_undo() || session.can_redo() {
        text.push_str(&format!(
            " | undo {} redo {}",
            session.undo_len(),
            session.redo_len()
        ));
    }
    if viewer.lifecycle().is_degraded(page) {
        text.push_str(" | render failed");
    }
    if let Some(editor) = viewer.input().editor() {
        text.push_str(&format!(" | text: {}", editor.content().replace('\n', "⏎")));
    }
    if let Some(pending) = app.mapper.pending_input() {
        text.push_str(&format!(" | {}", pending));
    }
    text
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    status: &str,
    total_rows: u32,
) -> Result<()> {
    let writer = renderer.writer();
    crossterm::execute!(
        writer,
        cursor::MoveTo(0, total_rows.saturating_sub(1) as u16),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(writer, status)?;
    writer.flush()?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "marginalia.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal is in raw mode while the viewer runs, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
