//! Page lifecycle: which pages hold surfaces, and when they are rendered or reclaimed.
//!
//! A page is materialized once it comes within `proximity_threshold` viewport heights
//! of the visible area and the cap allows it. Pages that drift out of that window are
//! evicted only once the materialized set is crowded, and the periodic sweep trims pages
//! that are far away. The cap is soft: pages inside the window are never evicted.
//! Eviction never touches the page annotation set.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::{clamp_zoom, LifecycleConfig};
use crate::error::RenderError;
use crate::geometry::{Point, Rect};
use crate::raster::PageSize;
use crate::task::{RenderTaskTracker, RenderTicket};
use crate::PageNumber;

/// Distance in pixels a page's bottom must reach below the viewport top to count as
/// the current page.
const CURRENT_PAGE_MARGIN: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageRenderState {
    #[default]
    Unmaterialized,
    /// Surfaces allocated, base content render in flight.
    Rendering,
    Clean,
    /// Surfaces no longer match the current zoom; a re-render is due.
    Stale,
}

impl PageRenderState {
    pub fn is_materialized(self) -> bool {
        !matches!(self, PageRenderState::Unmaterialized)
    }
}

/// Visible region of the scroll container, in document pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_top: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(scroll_top: f32, height: f32) -> Self {
        Self { scroll_top, height }
    }
}

/// Vertical stack of pages at the current zoom, each horizontally centered.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    sizes: Vec<PageSize>,
    bounds: Vec<Rect>,
    total_height: f32,
    total_width: f32,
}

impl PageLayout {
    pub fn new(sizes: &[PageSize], zoom: f32, gap: f32) -> Self {
        let total_width = sizes
            .iter()
            .map(|s| s.pixels(zoom).0 as f32)
            .fold(0.0, f32::max);
        let mut bounds = Vec::with_capacity(sizes.len());
        let mut top = 0.0;
        for size in sizes {
            let (width, height) = size.pixels(zoom);
            let (width, height) = (width as f32, height as f32);
            bounds.push(Rect::new((total_width - width) / 2.0, top, width, height));
            top += height + gap * zoom;
        }
        let total_height = bounds.last().map(|r| r.bottom()).unwrap_or(0.0);
        Self {
            sizes: sizes.to_vec(),
            bounds,
            total_height,
            total_width,
        }
    }

    pub fn page_count(&self) -> usize {
        self.bounds.len()
    }

    pub fn sizes(&self) -> &[PageSize] {
        &self.sizes
    }

    pub fn total_height(&self) -> f32 {
        self.total_height
    }

    pub fn total_width(&self) -> f32 {
        self.total_width
    }

    pub fn page_bounds(&self, page: PageNumber) -> Option<Rect> {
        page.checked_sub(1).and_then(|idx| self.bounds.get(idx)).copied()
    }

    pub fn page_pixels(&self, page: PageNumber) -> Option<(u32, u32)> {
        self.page_bounds(page)
            .map(|r| (r.width as u32, r.height as u32))
    }

    /// Page under a document-space point, with the point translated to page-local pixels.
    pub fn hit(&self, point: Point) -> Option<(PageNumber, Point)> {
        self.bounds
            .iter()
            .position(|bounds| bounds.contains(point))
            .map(|idx| {
                let bounds = self.bounds[idx];
                (
                    idx + 1,
                    Point::new(point.x - bounds.left, point.y - bounds.top),
                )
            })
    }

    /// First page whose top is in the upper half of the viewport and whose bottom is
    /// still clearly visible.
    pub fn current_page(&self, viewport: Viewport) -> PageNumber {
        self.bounds
            .iter()
            .position(|bounds| {
                let rel_top = bounds.top - viewport.scroll_top;
                let rel_bottom = bounds.bottom() - viewport.scroll_top;
                rel_top < viewport.height / 2.0 && rel_bottom > CURRENT_PAGE_MARGIN
            })
            .map(|idx| idx + 1)
            .unwrap_or(1)
    }

    /// Scroll offset that puts the top of `page` at the top of the viewport.
    pub fn scroll_offset_for(&self, page: PageNumber) -> Option<f32> {
        self.page_bounds(page).map(|r| r.top)
    }

    /// Whether the page lies within `threshold` viewport heights of the visible area.
    pub fn within_window(&self, page: PageNumber, viewport: Viewport, threshold: f32) -> bool {
        let Some(bounds) = self.page_bounds(page) else {
            return false;
        };
        let rel_top = bounds.top - viewport.scroll_top;
        let rel_bottom = bounds.bottom() - viewport.scroll_top;
        let h = viewport.height;
        rel_bottom > -h * threshold && rel_top < h * (1.0 + threshold)
    }

    /// Distance from the page to the viewport's vertical center.
    fn distance_to(&self, page: PageNumber, viewport: Viewport) -> f32 {
        let Some(bounds) = self.page_bounds(page) else {
            return f32::MAX;
        };
        let center = viewport.scroll_top + viewport.height / 2.0;
        if center < bounds.top {
            bounds.top - center
        } else if center > bounds.bottom() {
            center - bounds.bottom()
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub enum LifecycleAction {
    /// Allocate surfaces of `size` pixels, replay annotations, start `ticket`.
    Materialize {
        ticket: RenderTicket,
        size: (u32, u32),
    },
    /// Surfaces are kept but must be resized to `size`; replay annotations and start `ticket`.
    Rerender {
        ticket: RenderTicket,
        size: (u32, u32),
    },
    /// Drop the page's surfaces. Its render task is already cancelled.
    Evict { page: PageNumber },
}

impl LifecycleAction {
    pub fn page(&self) -> PageNumber {
        match self {
            LifecycleAction::Materialize { ticket, .. }
            | LifecycleAction::Rerender { ticket, .. } => ticket.page,
            LifecycleAction::Evict { page } => *page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCompletion {
    /// The result belongs to the page's current task and may be painted.
    Applied,
    /// A newer task or an eviction claimed the page first; discard the result.
    Superseded,
    Cancelled,
    /// Base content is unavailable; the page stays blank until re-materialized.
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
struct PageSlot {
    state: PageRenderState,
    degraded: bool,
}

pub struct PageLifecycleManager {
    config: LifecycleConfig,
    layout: PageLayout,
    zoom: f32,
    gap: f32,
    slots: Vec<PageSlot>,
    materialized: BTreeSet<PageNumber>,
    tasks: RenderTaskTracker,
}

impl PageLifecycleManager {
    pub fn new(config: LifecycleConfig, sizes: &[PageSize], zoom: f32, gap: f32) -> Self {
        let zoom = clamp_zoom(zoom);
        Self {
            config,
            layout: PageLayout::new(sizes, zoom, gap),
            zoom,
            gap,
            slots: vec![PageSlot::default(); sizes.len()],
            materialized: BTreeSet::new(),
            tasks: RenderTaskTracker::new(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn page_count(&self) -> usize {
        self.slots.len()
    }

    pub fn state(&self, page: PageNumber) -> PageRenderState {
        self.slot(page).map(|s| s.state).unwrap_or_default()
    }

    pub fn is_degraded(&self, page: PageNumber) -> bool {
        self.slot(page).is_some_and(|s| s.degraded)
    }

    pub fn is_materialized(&self, page: PageNumber) -> bool {
        self.materialized.contains(&page)
    }

    pub fn materialized_pages(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.materialized.iter().copied()
    }

    pub fn materialized_count(&self) -> usize {
        self.materialized.len()
    }

    pub fn outstanding_renders(&self) -> usize {
        self.tasks.outstanding()
    }

    /// Materialization pass, run on scroll, zoom and layout changes.
    pub fn update(&mut self, viewport: Viewport) -> Vec<LifecycleAction> {
        let threshold = self.config.proximity_threshold;
        let mut actions = Vec::new();

        let crowding = self.config.crowding_threshold();
        let outside = self.farthest_first(viewport, |layout, page| {
            !layout.within_window(page, viewport, threshold)
        });
        for page in outside {
            if self.materialized.len() as f32 <= crowding {
                break;
            }
            actions.push(self.evict(page));
        }

        let stale: Vec<PageNumber> = self
            .materialized
            .iter()
            .copied()
            .filter(|&page| {
                self.state(page) == PageRenderState::Stale
                    && self.layout.within_window(page, viewport, threshold)
            })
            .collect();
        for page in stale {
            if let Some(action) = self.rerender(page) {
                actions.push(action);
            }
        }

        let mut candidates: Vec<PageNumber> = (1..=self.page_count())
            .filter(|&page| {
                !self.materialized.contains(&page)
                    && self.layout.within_window(page, viewport, threshold)
            })
            .collect();
        candidates.sort_by(|a, b| {
            self.layout
                .distance_to(*a, viewport)
                .total_cmp(&self.layout.distance_to(*b, viewport))
        });
        for page in candidates {
            if self.materialized.len() >= self.config.max_materialized_pages {
                debug!(page, "materialization cap reached, skipping page");
                continue;
            }
            if let Some(action) = self.materialize(page) {
                actions.push(action);
            }
        }

        actions
    }

    /// Periodic sweep: evicts pages beyond twice the proximity window while the
    /// materialized set is larger than the sweep threshold.
    pub fn sweep(&mut self, viewport: Viewport) -> Vec<LifecycleAction> {
        let far = self.config.proximity_threshold * 2.0;
        let limit = self.config.sweep_threshold();
        debug!(
            outstanding = self.tasks.outstanding(),
            materialized = self.materialized.len(),
            "eviction sweep"
        );
        let candidates =
            self.farthest_first(viewport, |layout, page| !layout.within_window(page, viewport, far));
        let mut actions = Vec::new();
        for page in candidates {
            if self.materialized.len() as f32 <= limit {
                break;
            }
            actions.push(self.evict(page));
        }
        actions
    }

    /// Re-lays the document at `zoom`. Materialized pages become stale and are
    /// re-rendered by the next pass.
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        let zoom = clamp_zoom(zoom);
        if (zoom - self.zoom).abs() < f32::EPSILON {
            return self.zoom;
        }
        self.zoom = zoom;
        self.layout = PageLayout::new(self.layout.sizes(), zoom, self.gap);
        for page in self.materialized.iter().copied().collect::<Vec<_>>() {
            self.tasks.cancel(page);
            if let Some(slot) = self.slot_mut(page) {
                slot.state = PageRenderState::Stale;
            }
        }
        debug!(zoom, "layout rebuilt");
        zoom
    }

    /// Records the outcome of a render task. Only a current task changes page state.
    pub fn finish_render<T>(
        &mut self,
        ticket: &RenderTicket,
        result: &Result<T, RenderError>,
    ) -> RenderCompletion {
        if !self.tasks.finish(ticket) {
            debug!(
                page = ticket.page,
                generation = ticket.generation,
                "discarding superseded render result"
            );
            return if result.as_ref().is_err_and(RenderError::is_cancelled) {
                RenderCompletion::Cancelled
            } else {
                RenderCompletion::Superseded
            };
        }
        let page = ticket.page;
        match result {
            Ok(_) => {
                if let Some(slot) = self.slot_mut(page) {
                    slot.state = PageRenderState::Clean;
                    slot.degraded = false;
                }
                RenderCompletion::Applied
            }
            Err(err) if err.is_cancelled() => {
                debug!(page, "render cancelled");
                if let Some(slot) = self.slot_mut(page) {
                    slot.state = PageRenderState::Stale;
                }
                RenderCompletion::Cancelled
            }
            Err(err) => {
                warn!(page, %err, "page render failed");
                if let Some(slot) = self.slot_mut(page) {
                    slot.state = PageRenderState::Clean;
                    slot.degraded = true;
                }
                RenderCompletion::Failed
            }
        }
    }

    /// Cancels every outstanding render, e.g. when the viewer closes.
    pub fn shutdown(&mut self) -> usize {
        self.tasks.cancel_all()
    }

    fn materialize(&mut self, page: PageNumber) -> Option<LifecycleAction> {
        let size = self.layout.page_pixels(page)?;
        let ticket = self.tasks.issue(page, self.zoom);
        self.materialized.insert(page);
        if let Some(slot) = self.slot_mut(page) {
            slot.state = PageRenderState::Rendering;
            slot.degraded = false;
        }
        debug!(page, generation = ticket.generation, "page materialized");
        Some(LifecycleAction::Materialize { ticket, size })
    }

    fn rerender(&mut self, page: PageNumber) -> Option<LifecycleAction> {
        let size = self.layout.page_pixels(page)?;
        let ticket = self.tasks.issue(page, self.zoom);
        if let Some(slot) = self.slot_mut(page) {
            slot.state = PageRenderState::Rendering;
            slot.degraded = false;
        }
        Some(LifecycleAction::Rerender { ticket, size })
    }

    fn evict(&mut self, page: PageNumber) -> LifecycleAction {
        self.tasks.cancel(page);
        self.materialized.remove(&page);
        if let Some(slot) = self.slot_mut(page) {
            *slot = PageSlot::default();
        }
        debug!(page, "page evicted");
        LifecycleAction::Evict { page }
    }

    fn farthest_first(
        &self,
        viewport: Viewport,
        predicate: impl Fn(&PageLayout, PageNumber) -> bool,
    ) -> Vec<PageNumber> {
        let mut pages: Vec<PageNumber> = self
            .materialized
            .iter()
            .copied()
            .filter(|&page| predicate(&self.layout, page))
            .collect();
        pages.sort_by(|a, b| {
            self.layout
                .distance_to(*b, viewport)
                .total_cmp(&self.layout.distance_to(*a, viewport))
        });
        pages
    }

    fn slot(&self, page: PageNumber) -> Option<&PageSlot> {
        page.checked_sub(1).and_then(|idx| self.slots.get(idx))
    }

    fn slot_mut(&mut self, page: PageNumber) -> Option<&mut PageSlot> {
        page.checked_sub(1).and_then(|idx| self.slots.get_mut(idx))
    }
}
