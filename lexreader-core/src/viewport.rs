//! Current-page tracking from page visibility reports.
//!
//! The tracker never reads a clock itself; every call carries `now`, which
//! keeps debouncing deterministic for hosts and tests alike.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::text_layer::PageNumber;

/// Visibility of one mounted page container in a report batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityEntry {
    pub page: PageNumber,
    pub is_intersecting: bool,
    /// Visible fraction of the page, `0.0..=1.0`.
    pub ratio: f32,
}

impl VisibilityEntry {
    pub fn visible(page: PageNumber, ratio: f32) -> Self {
        Self {
            page,
            is_intersecting: ratio > 0.0,
            ratio,
        }
    }
}

/// Page with the highest visible ratio among intersecting entries.
pub fn most_visible(entries: &[VisibilityEntry]) -> Option<PageNumber> {
    entries
        .iter()
        .filter(|entry| entry.is_intersecting)
        .fold(None::<&VisibilityEntry>, |best, entry| match best {
            Some(best) if best.ratio >= entry.ratio => Some(best),
            _ => Some(entry),
        })
        .map(|entry| entry.page)
}

#[derive(Debug, Clone, Copy)]
struct ProgrammaticScroll {
    target: PageNumber,
    /// Set by the latest report; the scroll counts as settled once reports
    /// have been quiet until then.
    quiet_until: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct ViewportTracker {
    debounce: Duration,
    scroll_idle: Duration,
    pending: Option<(PageNumber, Instant)>,
    programmatic: Option<ProgrammaticScroll>,
    user_scroll_until: Option<Instant>,
}

impl ViewportTracker {
    pub fn new(debounce: Duration, scroll_idle: Duration) -> Self {
        Self {
            debounce,
            scroll_idle,
            pending: None,
            programmatic: None,
            user_scroll_until: None,
        }
    }

    /// Feeds one visibility batch. While a programmatic scroll is in flight
    /// the batch is ignored, except that seeing the scroll target as the most
    /// visible page ends the programmatic phase.
    pub fn observe(&mut self, entries: &[VisibilityEntry], now: Instant) {
        let page = most_visible(entries);
        if let Some(programmatic) = self.programmatic.as_mut() {
            if page == Some(programmatic.target) {
                trace!(page = programmatic.target, "programmatic scroll arrived");
                self.programmatic = None;
            } else {
                programmatic.quiet_until = Some(now + self.scroll_idle);
            }
            return;
        }
        if let Some(page) = page {
            self.pending = Some((page, now + self.debounce));
        }
    }

    /// Debounced user-driven page, once its quiet period has elapsed.
    ///
    /// A programmatic scroll that never reaches its target ends once no
    /// report has arrived for the scroll-idle window.
    pub fn poll(&mut self, now: Instant) -> Option<PageNumber> {
        if let Some(programmatic) = self.programmatic {
            match programmatic.quiet_until {
                Some(until) if now >= until => {
                    trace!(page = programmatic.target, "programmatic scroll went quiet");
                    self.programmatic = None;
                }
                _ => return None,
            }
        }
        match self.pending {
            Some((page, due)) if now >= due => {
                self.pending = None;
                Some(page)
            }
            _ => None,
        }
    }

    pub fn begin_programmatic(&mut self, target: PageNumber) {
        self.pending = None;
        self.programmatic = Some(ProgrammaticScroll {
            target,
            quiet_until: None,
        });
    }

    pub fn end_programmatic(&mut self) {
        self.programmatic = None;
    }

    pub fn is_programmatic(&self) -> bool {
        self.programmatic.is_some()
    }

    pub fn note_user_scroll(&mut self, now: Instant) {
        self.user_scroll_until = Some(now + self.scroll_idle);
    }

    pub fn is_user_scrolling(&self, now: Instant) -> bool {
        self.user_scroll_until.is_some_and(|until| now < until)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
