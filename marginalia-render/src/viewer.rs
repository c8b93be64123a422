//! Document viewer: ties the annotation session, input controller and page lifecycle to
//! page surfaces and asynchronous base renders.
//!
//! All state is owned by the viewer and mutated from one task. Render tasks run on the
//! tokio runtime and report back over a channel; results are applied only while their
//! ticket is still the page's current one.

use std::collections::HashMap;
use std::sync::Arc;

use marginalia_core::{
    AnnotationSession, DocumentInfo, EditorOutcome, HistoryOutcome, InputController, KeyChord,
    LifecycleAction, PageLifecycleManager, PageNumber, PageRasterizer, PageRenderState, Point,
    PointerOutcome, PointerTarget, RasterOutput, RasterRequest, RenderCompletion, RenderError,
    RenderImage, RenderTicket, SelectionEnd, SessionEvent, Tool, ToolState, ViewerConfig,
    Viewport, ZoomMode,
};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::layer::{LayerRenderer, PageSurfaces};

#[derive(Debug)]
struct RenderResult {
    ticket: RenderTicket,
    result: Result<RasterOutput, RenderError>,
}

pub struct DocumentViewer {
    rasterizer: Arc<dyn PageRasterizer>,
    info: DocumentInfo,
    session: AnnotationSession,
    input: InputController,
    lifecycle: PageLifecycleManager,
    renderer: LayerRenderer,
    surfaces: HashMap<PageNumber, PageSurfaces>,
    viewport: Viewport,
    /// Pixel size of the area pages are shown in; zero until the front-end reports it.
    display: (f32, f32),
    zoom_mode: ZoomMode,
    dark_mode: bool,
    completions_tx: mpsc::UnboundedSender<RenderResult>,
    completions_rx: mpsc::UnboundedReceiver<RenderResult>,
}

impl DocumentViewer {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, config: &ViewerConfig) -> Self {
        let info = rasterizer.info().clone();
        let lifecycle = PageLifecycleManager::new(
            config.lifecycle.clone(),
            &info.page_sizes,
            config.zoom,
            config.page_gap,
        );
        let mut input = InputController::new(ToolState::new(&config.annotation));
        input.set_scale(lifecycle.zoom());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        info!(
            path = %info.path.display(),
            pages = info.page_count,
            zoom = lifecycle.zoom(),
            "viewer session started"
        );
        Self {
            rasterizer,
            session: AnnotationSession::new(info.page_count),
            info,
            input,
            lifecycle,
            renderer: LayerRenderer::new(),
            surfaces: HashMap::new(),
            viewport: Viewport::new(0.0, 0.0),
            display: (0.0, 0.0),
            zoom_mode: config.zoom_mode,
            dark_mode: config.dark_mode,
            completions_tx,
            completions_rx,
        }
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn session(&self) -> &AnnotationSession {
        &self.session
    }

    /// Direct session access, e.g. to restore saved annotations. Call
    /// [`DocumentViewer::sync_session`] afterwards so dirty pages are replayed.
    pub fn session_mut(&mut self) -> &mut AnnotationSession {
        &mut self.session
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn lifecycle(&self) -> &PageLifecycleManager {
        &self.lifecycle
    }

    pub fn surfaces(&self, page: PageNumber) -> Option<&PageSurfaces> {
        self.surfaces.get(&page)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn zoom(&self) -> f32 {
        self.lifecycle.zoom()
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn toggle_dark_mode(&mut self) -> bool {
        self.dark_mode = !self.dark_mode;
        self.dark_mode
    }

    pub fn current_page(&self) -> PageNumber {
        self.lifecycle.layout().current_page(self.viewport)
    }

    pub fn page_state(&self, page: PageNumber) -> PageRenderState {
        self.lifecycle.state(page)
    }

    /// Moves the viewport and runs a materialization pass.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        let max_top = (self.lifecycle.layout().total_height() - viewport.height).max(0.0);
        self.viewport = Viewport::new(viewport.scroll_top.clamp(0.0, max_top), viewport.height);
        let actions = self.lifecycle.update(self.viewport);
        self.apply_actions(actions);
    }

    pub fn scroll_by(&mut self, delta: f32) {
        let viewport = Viewport::new(self.viewport.scroll_top + delta, self.viewport.height);
        self.set_viewport(viewport);
    }

    pub fn scroll_to_page(&mut self, page: PageNumber) {
        if let Some(top) = self.lifecycle.layout().scroll_offset_for(page) {
            self.set_viewport(Viewport::new(top, self.viewport.height));
        }
    }

    /// Periodic eviction sweep. Never interleaves with a pass since both take `&mut self`.
    pub fn sweep(&mut self) -> usize {
        let actions = self.lifecycle.sweep(self.viewport);
        let evicted = actions.len();
        self.apply_actions(actions);
        evicted
    }

    /// Re-lays the document at a manually chosen `zoom`, keeping the current page in view.
    /// Leaves any fit mode.
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        self.zoom_mode = ZoomMode::Custom;
        self.apply_zoom(zoom)
    }

    pub fn zoom_by(&mut self, delta: f32) -> f32 {
        self.set_zoom(self.zoom() + delta)
    }

    pub fn zoom_mode(&self) -> ZoomMode {
        self.zoom_mode
    }

    /// Switches zoom mode and applies it if the display size is known.
    pub fn set_zoom_mode(&mut self, mode: ZoomMode) -> f32 {
        self.zoom_mode = mode;
        debug!(mode = mode.label(), "zoom mode selected");
        self.refit()
    }

    /// Records the size of the display area in pixels. Fit modes recompute the zoom and
    /// the viewport height follows.
    pub fn set_display_size(&mut self, width: f32, height: f32) {
        self.display = (width.max(0.0), height.max(0.0));
        self.refit();
    }

    fn refit(&mut self) -> f32 {
        let (width, height) = self.display;
        let fitted = self
            .info
            .page_size(1)
            .and_then(|page| self.zoom_mode.fit(page, width, height));
        match fitted {
            Some(zoom) => self.apply_zoom(zoom),
            None => {
                self.reframe(self.current_page(), self.viewport.scroll_top);
                self.zoom()
            }
        }
    }

    fn apply_zoom(&mut self, zoom: f32) -> f32 {
        let anchor = self.current_page();
        let zoom = self.lifecycle.set_zoom(zoom);
        self.input.set_scale(zoom);
        let top = self
            .lifecycle
            .layout()
            .scroll_offset_for(anchor)
            .unwrap_or(self.viewport.scroll_top);
        self.reframe(anchor, top);
        zoom
    }

    /// Re-derives the viewport height at the current zoom. The front-end shows at least
    /// the whole current page, so the height never drops below it.
    fn reframe(&mut self, anchor: PageNumber, top: f32) {
        let page_height = self
            .lifecycle
            .layout()
            .page_bounds(anchor)
            .map(|bounds| bounds.height)
            .unwrap_or(0.0);
        let height = self.display.1.max(page_height);
        self.set_viewport(Viewport::new(top, height));
    }

    pub fn select_tool(&mut self, tool: Tool) -> Tool {
        self.input.select_tool(tool)
    }

    pub fn tools_mut(&mut self) -> &mut ToolState {
        self.input.tools_mut()
    }

    pub fn pointer_down(&mut self, point: Point) -> PointerOutcome {
        let target = self.hit(point);
        let outcome = self.input.pointer_down(&mut self.session, target);
        self.after_pointer(&outcome);
        outcome
    }

    pub fn pointer_move(&mut self, point: Point) -> PointerOutcome {
        let target = self.hit(point);
        let outcome = self.input.pointer_move(&mut self.session, target);
        self.after_pointer(&outcome);
        outcome
    }

    pub fn pointer_up(&mut self) -> PointerOutcome {
        let outcome = self.input.pointer_up(&mut self.session);
        self.after_pointer(&outcome);
        outcome
    }

    pub fn pointer_leave(&mut self) -> PointerOutcome {
        let outcome = self.input.pointer_leave(&mut self.session);
        self.after_pointer(&outcome);
        outcome
    }

    /// Selects the text-layer runs between two document points on one page and, with the
    /// highlight tool active, turns them into a highlight.
    pub fn select_text(&mut self, start: Point, end: Point) -> PointerOutcome {
        let (Some(from), Some(to)) = (self.hit(start), self.hit(end)) else {
            return PointerOutcome::Ignored;
        };
        if from.page != to.page {
            return PointerOutcome::Ignored;
        }
        let (rects, text) = self
            .surfaces
            .get(&from.page)
            .map(|surfaces| {
                let layer = &surfaces.text_layer;
                (
                    layer.select(from.point, to.point),
                    layer.selected_text(from.point, to.point),
                )
            })
            .unwrap_or_default();
        debug!(page = from.page, runs = rects.len(), %text, "text selected");
        let selection = SelectionEnd {
            page: Some(from.page),
            page_origin: Point::new(0.0, 0.0),
            client_rects: rects,
        };
        let outcome = self.input.selection_end(&mut self.session, selection);
        self.sync_session();
        outcome
    }

    pub fn editor_insert(&mut self, ch: char) -> bool {
        match self.input.editor_mut() {
            Some(editor) => {
                editor.insert(ch);
                true
            }
            None => false,
        }
    }

    pub fn editor_newline(&mut self) -> bool {
        match self.input.editor_mut() {
            Some(editor) => {
                editor.newline();
                true
            }
            None => false,
        }
    }

    pub fn editor_backspace(&mut self) -> bool {
        self.input
            .editor_mut()
            .map(|editor| editor.backspace().is_some())
            .unwrap_or(false)
    }

    /// Commits the open text editor, if any.
    pub fn commit_editor(&mut self) -> Option<EditorOutcome> {
        self.input.editor()?;
        let outcome = self.input.commit_editor(&mut self.session).ok();
        self.sync_session();
        outcome
    }

    pub fn undo(&mut self) -> HistoryOutcome {
        let outcome = self.session.undo();
        self.sync_session();
        outcome
    }

    pub fn redo(&mut self) -> HistoryOutcome {
        let outcome = self.session.redo();
        self.sync_session();
        outcome
    }

    pub fn handle_shortcut(&mut self, chord: KeyChord) -> Option<HistoryOutcome> {
        let outcome = self.input.handle_shortcut(&mut self.session, chord);
        self.sync_session();
        outcome
    }

    /// Replays every materialized page the session reported dirty. Returns the latest
    /// history availability, if it changed.
    pub fn sync_session(&mut self) -> Option<(bool, bool)> {
        let mut history = None;
        for event in self.session.take_events() {
            match event {
                SessionEvent::PageDirty(page) => self.redraw_page(page),
                SessionEvent::HistoryChanged { can_undo, can_redo } => {
                    history = Some((can_undo, can_redo));
                }
            }
        }
        history
    }

    /// Replays the page's commands onto its layers. Unmaterialized pages are skipped;
    /// they replay when materialized.
    pub fn redraw_page(&mut self, page: PageNumber) {
        if let Some(surfaces) = self.surfaces.get_mut(&page) {
            self.renderer
                .redraw_page(surfaces, self.session.commands(page));
        }
    }

    /// Flattened page image for display.
    pub fn composite_page(&self, page: PageNumber) -> Option<RenderImage> {
        self.surfaces
            .get(&page)
            .map(|surfaces| surfaces.composite(self.dark_mode))
    }

    /// Applies every render result that has already arrived.
    pub fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(result) = self.completions_rx.try_recv() {
            if self.apply_completion(result) == RenderCompletion::Applied {
                applied += 1;
            }
        }
        applied
    }

    /// Waits for the next render result and applies it.
    pub async fn next_completion(&mut self) -> Option<RenderCompletion> {
        let result = self.completions_rx.recv().await?;
        Some(self.apply_completion(result))
    }

    /// Waits until no current render task is outstanding.
    #[instrument(skip(self))]
    pub async fn settle(&mut self) {
        while self.lifecycle.outstanding_renders() > 0 {
            if self.next_completion().await.is_none() {
                break;
            }
        }
    }

    /// Cancels every in-flight render.
    pub fn shutdown(&mut self) {
        let cancelled = self.lifecycle.shutdown();
        info!(cancelled, "viewer session closed");
    }

    fn hit(&self, point: Point) -> Option<PointerTarget> {
        self.lifecycle
            .layout()
            .hit(point)
            .map(|(page, local)| PointerTarget::new(page, local))
    }

    fn after_pointer(&mut self, outcome: &PointerOutcome) {
        match outcome {
            PointerOutcome::StrokeStarted { page, point, style } => {
                if let Some(surfaces) = self.surfaces.get_mut(page) {
                    self.renderer.paint_preview(surfaces, *point, *point, style);
                }
            }
            PointerOutcome::StrokeExtended {
                page,
                from,
                to,
                style,
            } => {
                if let Some(surfaces) = self.surfaces.get_mut(page) {
                    self.renderer.paint_preview(surfaces, *from, *to, style);
                }
            }
            PointerOutcome::StrokeDiscarded { page } => self.redraw_page(*page),
            _ => {}
        }
        self.sync_session();
    }

    fn apply_actions(&mut self, actions: Vec<LifecycleAction>) {
        for action in actions {
            match action {
                LifecycleAction::Materialize { ticket, size } => {
                    let mut surfaces = PageSurfaces::new(size.0, size.1, ticket.scale);
                    self.renderer
                        .redraw_page(&mut surfaces, self.session.commands(ticket.page));
                    self.surfaces.insert(ticket.page, surfaces);
                    self.spawn_render(ticket);
                }
                LifecycleAction::Rerender { ticket, size } => {
                    let surfaces = self
                        .surfaces
                        .entry(ticket.page)
                        .or_insert_with(|| PageSurfaces::new(size.0, size.1, ticket.scale));
                    surfaces.resize(size.0, size.1, ticket.scale);
                    self.renderer
                        .redraw_page(surfaces, self.session.commands(ticket.page));
                    self.spawn_render(ticket);
                }
                LifecycleAction::Evict { page } => {
                    self.surfaces.remove(&page);
                }
            }
        }
    }

    fn spawn_render(&self, ticket: RenderTicket) {
        let rasterizer = Arc::clone(&self.rasterizer);
        let tx = self.completions_tx.clone();
        let request = RasterRequest {
            page: ticket.page,
            scale: ticket.scale,
        };
        tokio::spawn(async move {
            let result = rasterizer.rasterize(request, ticket.token()).await;
            // The receiver only goes away with the viewer.
            let _ = tx.send(RenderResult { ticket, result });
        });
    }

    fn apply_completion(&mut self, result: RenderResult) -> RenderCompletion {
        let RenderResult { ticket, result } = result;
        let completion = self.lifecycle.finish_render(&ticket, &result);
        if completion == RenderCompletion::Applied {
            if let (Ok(output), Some(surfaces)) = (result, self.surfaces.get_mut(&ticket.page)) {
                surfaces.apply_base(output);
                debug!(page = ticket.page, generation = ticket.generation, "base render applied");
            }
        }
        completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use marginalia_core::{
        document_id_for_path, CancellationToken, Command, DocumentMetadata, LifecycleConfig,
        PageSize, Rect, TextLayout, TextRun,
    };
    use parking_lot::Mutex;
    use std::path::PathBuf;

    const SHADE: u8 = 200;

    /// Solid gray pages; pages listed in `failing` fail to render.
    struct FakeRasterizer {
        info: DocumentInfo,
        failing: Vec<PageNumber>,
        requests: Mutex<Vec<RasterRequest>>,
    }

    impl FakeRasterizer {
        fn new(pages: usize) -> Self {
            let path = PathBuf::from("/tmp/fake.pdf");
            Self {
                info: DocumentInfo {
                    id: document_id_for_path(&path),
                    path,
                    page_count: pages,
                    page_sizes: vec![PageSize::new(100.0, 100.0); pages],
                    metadata: DocumentMetadata::default(),
                },
                failing: Vec::new(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageRasterizer for FakeRasterizer {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        async fn rasterize(
            &self,
            request: RasterRequest,
            cancel: CancellationToken,
        ) -> Result<RasterOutput, RenderError> {
            self.requests.lock().push(request);
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                return Err(RenderError::Cancelled(request.page));
            }
            if self.failing.contains(&request.page) {
                return Err(RenderError::Failed {
                    page: request.page,
                    reason: "broken content stream".into(),
                });
            }
            let (width, height) = self.info.page_sizes[request.page - 1].pixels(request.scale);
            Ok(RasterOutput {
                image: RenderImage {
                    width,
                    height,
                    pixels: [SHADE, SHADE, SHADE, 255].repeat((width * height) as usize),
                },
                text: TextLayout {
                    runs: vec![TextRun {
                        text: format!("page {}", request.page),
                        bounds: Rect::new(10.0, 10.0, 40.0, 10.0).scaled(request.scale),
                    }],
                },
            })
        }
    }

    fn config(max_pages: usize) -> ViewerConfig {
        ViewerConfig {
            zoom: 1.0,
            page_gap: 0.0,
            lifecycle: LifecycleConfig {
                max_materialized_pages: max_pages,
                ..LifecycleConfig::default()
            },
            ..ViewerConfig::default()
        }
    }

    fn viewer(pages: usize, max_pages: usize) -> DocumentViewer {
        DocumentViewer::new(Arc::new(FakeRasterizer::new(pages)), &config(max_pages))
    }

    fn draw(viewer: &mut DocumentViewer, points: &[(f32, f32)]) {
        let mut iter = points.iter();
        if let Some(&(x, y)) = iter.next() {
            viewer.pointer_down(Point::new(x, y));
        }
        for &(x, y) in iter {
            viewer.pointer_move(Point::new(x, y));
        }
        viewer.pointer_up();
    }

    #[tokio::test]
    async fn pages_render_and_show_base_content() {
        let mut viewer = viewer(3, 10);
        viewer.set_viewport(Viewport::new(0.0, 100.0));
        assert_eq!(viewer.page_state(1), PageRenderState::Rendering);
        viewer.settle().await;
        assert_eq!(viewer.page_state(1), PageRenderState::Clean);
        let image = viewer.composite_page(1).unwrap();
        assert_eq!(&image.pixels[0..4], &[SHADE, SHADE, SHADE, 255]);
        assert_eq!(viewer.surfaces(1).unwrap().text_layer.runs().len(), 1);
    }

    #[tokio::test]
    async fn drawing_replays_onto_the_annotation_layer() {
        let mut viewer = viewer(2, 10);
        viewer.set_viewport(Viewport::new(0.0, 100.0));
        viewer.settle().await;
        viewer.select_tool(Tool::Draw);
        draw(&mut viewer, &[(10.0, 50.0), (90.0, 50.0)]);

        assert_eq!(viewer.session().commands(1).len(), 1);
        let surfaces = viewer.surfaces(1).unwrap();
        assert_eq!(surfaces.annotation.pixel(50, 49)[3], 255);
        assert_eq!(surfaces.base.pixel(50, 49), [SHADE, SHADE, SHADE, 255]);

        viewer.undo();
        assert!(viewer.surfaces(1).unwrap().annotation.is_blank());
        viewer.redo();
        assert_eq!(viewer.surfaces(1).unwrap().annotation.pixel(50, 49)[3], 255);
    }

    #[tokio::test]
    async fn evict_and_rematerialize_keeps_annotations() {
        // A cap of four crowds out the first page once it leaves the window.
        let mut viewer = viewer(40, 4);
        viewer.set_viewport(Viewport::new(0.0, 100.0));
        viewer.settle().await;
        viewer.select_tool(Tool::Draw);
        draw(&mut viewer, &[(5.0, 5.0), (60.0, 60.0)]);
        let before = viewer.surfaces(1).unwrap().annotation.image().clone();
        let commands = viewer.session().commands(1).to_vec();

        viewer.set_viewport(Viewport::new(3000.0, 100.0));
        viewer.settle().await;
        assert!(viewer.surfaces(1).is_none());
        assert_eq!(viewer.page_state(1), PageRenderState::Unmaterialized);
        assert_eq!(viewer.session().commands(1), commands.as_slice());

        viewer.set_viewport(Viewport::new(0.0, 100.0));
        viewer.settle().await;
        assert_eq!(viewer.surfaces(1).unwrap().annotation.image(), &before);
    }

    #[tokio::test]
    async fn superseded_renders_are_discarded() {
        let mut viewer = viewer(1, 10);
        viewer.set_viewport(Viewport::new(0.0, 100.0));
        // A zoom before the first render lands supersedes it.
        viewer.set_zoom(2.0);
        viewer.settle().await;
        viewer.drain_completions();
        let surfaces = viewer.surfaces(1).unwrap();
        assert_eq!(surfaces.size(), (200, 200));
        assert_eq!(surfaces.base.width(), 200);
        assert_eq!(viewer.page_state(1), PageRenderState::Clean);
    }

    #[tokio::test]
    async fn failed_render_leaves_page_degraded() {
        let mut rasterizer = FakeRasterizer::new(2);
        rasterizer.failing.push(2);
        let mut viewer = DocumentViewer::new(Arc::new(rasterizer), &config(10));
        viewer.set_viewport(Viewport::new(0.0, 100.0));
        viewer.settle().await;
        assert!(viewer.lifecycle().is_degraded(2));
        assert!(viewer.lifecycle().is_materialized(2));
        let image = viewer.composite_page(2).unwrap();
        assert_eq!(&image.pixels[0..4], &[255, 255, 255, 255]);
        assert!(!viewer.lifecycle().is_degraded(1));
    }

    #[tokio::test]
    async fn zoom_rescales_existing_annotations() {
        let mut viewer = viewer(1, 10);
        viewer.set_viewport(Viewport::new(0.0, 100.0));
        viewer.settle().await;
        viewer.select_tool(Tool::Draw);
        draw(&mut viewer, &[(10.0, 20.0), (30.0, 20.0)]);

        viewer.set_zoom(2.0);
        viewer.settle().await;
        let surfaces = viewer.surfaces(1).unwrap();
        assert_eq!(surfaces.annotation.pixel(40, 39)[3], 255);
        assert_eq!(surfaces.annotation.pixel(40, 19)[3], 0);
    }

    #[tokio::test]
    async fn text_selection_becomes_highlight() {
        let mut viewer = viewer(1, 10);
        viewer.set_viewport(Viewport::new(0.0, 100.0));
        viewer.settle().await;
        viewer.select_tool(Tool::Highlight);
        let outcome = viewer.select_text(Point::new(5.0, 5.0), Point::new(30.0, 15.0));
        assert!(matches!(outcome, PointerOutcome::Committed { page: 1, .. }));
        assert!(matches!(
            &viewer.session().commands(1)[0].command,
            Command::Highlight { rects, .. } if rects == &vec![Rect::new(10.0, 10.0, 40.0, 10.0)]
        ));
        assert!(viewer.surfaces(1).unwrap().highlight.pixel(20, 15)[3] > 0);
    }

    #[tokio::test]
    async fn fit_width_follows_display_resize() {
        let mut viewer = viewer(3, 10);
        viewer.set_display_size(200.0, 150.0);
        assert_eq!(viewer.zoom(), 1.0);
        assert_eq!(viewer.viewport().height, 150.0);

        assert_eq!(viewer.set_zoom_mode(ZoomMode::FitWidth), 2.0);
        assert_eq!(viewer.viewport().height, 200.0);
        viewer.set_display_size(50.0, 150.0);
        assert_eq!(viewer.zoom(), 0.5);
        assert_eq!(viewer.viewport().height, 150.0);
        viewer.settle().await;
        assert_eq!(viewer.surfaces(1).unwrap().size(), (50, 50));

        viewer.zoom_by(0.5);
        assert_eq!(viewer.zoom_mode(), ZoomMode::Custom);
        viewer.set_display_size(400.0, 400.0);
        assert_eq!(viewer.zoom(), 1.0);
    }

    #[tokio::test]
    async fn fit_page_uses_the_tighter_dimension() {
        let mut viewer = viewer(2, 10);
        assert_eq!(viewer.set_zoom_mode(ZoomMode::FitPage), 1.0);
        viewer.set_display_size(300.0, 150.0);
        assert_eq!(viewer.zoom(), 1.5);
        assert_eq!(viewer.viewport().height, 150.0);
    }

    #[tokio::test]
    async fn viewport_height_tracks_zoom() {
        let mut viewer = viewer(5, 10);
        viewer.set_display_size(80.0, 60.0);
        assert_eq!(viewer.viewport().height, 100.0);
        viewer.set_zoom(2.0);
        assert_eq!(viewer.viewport().height, 200.0);
        viewer.scroll_to_page(3);
        assert_eq!(viewer.current_page(), 3);

        viewer.set_zoom(0.5);
        assert_eq!(viewer.viewport(), Viewport::new(100.0, 60.0));
    }

    #[tokio::test]
    async fn shutdown_cancels_outstanding_renders() {
        let mut viewer = viewer(5, 10);
        viewer.set_viewport(Viewport::new(0.0, 100.0));
        assert!(viewer.lifecycle().outstanding_renders() > 0);
        viewer.shutdown();
        assert_eq!(viewer.lifecycle().outstanding_renders(), 0);
    }
}
