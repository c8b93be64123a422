//! Render task handles.
//!
//! Every render request for a page gets a fresh generation. A result is applied only
//! while its generation is still the page's current one, so a slow task that finishes
//! after a newer request never overwrites the newer surface. The cancellation flag lets
//! the rasterizer stop early, but correctness does not depend on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::PageNumber;

/// Cooperative cancellation flag shared between the tracker and a running task.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub page: PageNumber,
    pub generation: u64,
    pub scale: f32,
    token: CancellationToken,
}

impl RenderTicket {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// At most one outstanding render per page.
#[derive(Debug, Default)]
pub struct RenderTaskTracker {
    next_generation: u64,
    current: HashMap<PageNumber, RenderTicket>,
}

impl RenderTaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new task for `page`, cancelling the one it supersedes.
    pub fn issue(&mut self, page: PageNumber, scale: f32) -> RenderTicket {
        self.cancel(page);
        self.next_generation += 1;
        let ticket = RenderTicket {
            page,
            generation: self.next_generation,
            scale,
            token: CancellationToken::new(),
        };
        self.current.insert(page, ticket.clone());
        ticket
    }

    pub fn cancel(&mut self, page: PageNumber) -> bool {
        match self.current.remove(&page) {
            Some(previous) => {
                previous.token.cancel();
                debug!(page, generation = previous.generation, "render task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.current.len();
        for (_, ticket) in self.current.drain() {
            ticket.token.cancel();
        }
        count
    }

    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        self.current
            .get(&ticket.page)
            .is_some_and(|current| current.generation == ticket.generation)
    }

    /// Retires `ticket` if it is still current. Returns whether its result may be applied.
    pub fn finish(&mut self, ticket: &RenderTicket) -> bool {
        if self.is_current(ticket) {
            self.current.remove(&ticket.page);
            true
        } else {
            false
        }
    }

    pub fn outstanding(&self) -> usize {
        self.current.len()
    }
}
