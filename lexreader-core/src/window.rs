//! Progressive render window: how many pages are mounted.

use tracing::debug;

use crate::config::ReaderConfig;
use crate::text_layer::PageNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    /// Grow once the current page is this close to the window edge.
    pub lookahead: u32,
    /// Pages added per growth step.
    pub batch: u32,
    /// Pages mounted past the start page on load.
    pub initial_lead: u32,
    /// Minimum window size on load.
    pub initial_min: u32,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            lookahead: 5,
            batch: 10,
            initial_lead: 6,
            initial_min: 10,
        }
    }
}

impl From<&ReaderConfig> for WindowParams {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            lookahead: config.lookahead_pages,
            batch: config.batch_pages.max(1),
            initial_lead: config.initial_lead_pages,
            initial_min: config.initial_min_pages.max(1),
        }
    }
}

/// Highest readable page: the access ceiling capped by the page count, or
/// the whole document when unrestricted.
pub fn allowed_max_page(ceiling: Option<PageNumber>, total_pages: PageNumber) -> PageNumber {
    let total = total_pages.max(1);
    ceiling.map_or(total, |ceiling| ceiling.clamp(1, total))
}

/// Monotonic window `1..=render_limit` bounded by `allowed_max_page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    params: WindowParams,
    render_limit: PageNumber,
    allowed_max_page: PageNumber,
}

impl PageWindow {
    pub fn open(params: WindowParams, allowed_max_page: PageNumber, initial_page: PageNumber) -> Self {
        let allowed_max_page = allowed_max_page.max(1);
        let wanted = initial_page
            .saturating_add(params.initial_lead)
            .max(params.initial_min);
        Self {
            params,
            render_limit: wanted.clamp(1, allowed_max_page),
            allowed_max_page,
        }
    }

    pub fn render_limit(&self) -> PageNumber {
        self.render_limit
    }

    pub fn allowed_max_page(&self) -> PageNumber {
        self.allowed_max_page
    }

    pub fn is_mounted(&self, page: PageNumber) -> bool {
        page >= 1 && page <= self.render_limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.render_limit >= self.allowed_max_page
    }

    /// Grows by one batch when `current` nears the edge. Returns whether the
    /// window grew.
    pub fn on_page_change(&mut self, current: PageNumber) -> bool {
        if self.is_exhausted() {
            return false;
        }
        if current.saturating_add(self.params.lookahead) < self.render_limit {
            return false;
        }
        let next = self
            .render_limit
            .saturating_add(self.params.batch)
            .min(self.allowed_max_page);
        self.grow_to(next)
    }

    /// Grows so that `page` and its lead are mounted. Returns whether the
    /// window grew.
    pub fn ensure_includes(&mut self, page: PageNumber) -> bool {
        if self.is_mounted(page) && page.saturating_add(self.params.lookahead) < self.render_limit {
            return false;
        }
        let next = page
            .saturating_add(self.params.initial_lead)
            .min(self.allowed_max_page);
        self.grow_to(next)
    }

    fn grow_to(&mut self, next: PageNumber) -> bool {
        if next <= self.render_limit {
            return false;
        }
        debug!(from = self.render_limit, to = next, "growing render window");
        self.render_limit = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_max_page_caps_ceiling_by_total() {
        assert_eq!(allowed_max_page(Some(10), 50), 10);
        assert_eq!(allowed_max_page(Some(80), 50), 50);
        assert_eq!(allowed_max_page(None, 50), 50);
        assert_eq!(allowed_max_page(Some(0), 50), 1);
        assert_eq!(allowed_max_page(None, 0), 1);
    }

    #[test]
    fn initial_window_follows_start_page() {
        let params = WindowParams::default();
        assert_eq!(PageWindow::open(params, 200, 1).render_limit(), 10);
        assert_eq!(PageWindow::open(params, 200, 30).render_limit(), 36);
        assert_eq!(PageWindow::open(params, 8, 1).render_limit(), 8);
    }

    #[test]
    fn grows_in_batches_near_the_edge() {
        let mut window = PageWindow::open(WindowParams::default(), 200, 1);
        assert!(!window.on_page_change(3));
        assert_eq!(window.render_limit(), 10);
        assert!(window.on_page_change(5));
        assert_eq!(window.render_limit(), 20);
        assert!(window.on_page_change(16));
        assert_eq!(window.render_limit(), 30);
    }

    #[test]
    fn growth_is_clamped_and_monotonic() {
        let mut window = PageWindow::open(WindowParams::default(), 23, 1);
        let mut last = window.render_limit();
        for page in (1..=23).chain((1..=23).rev()) {
            window.on_page_change(page);
            assert!(window.render_limit() >= last);
            assert!(window.render_limit() <= window.allowed_max_page());
            last = window.render_limit();
        }
        assert_eq!(window.render_limit(), 23);
        assert!(window.is_exhausted());
        assert!(!window.on_page_change(23));
    }

    #[test]
    fn jump_target_is_brought_into_the_window() {
        let mut window = PageWindow::open(WindowParams::default(), 40, 1);
        window.on_page_change(6);
        assert_eq!(window.render_limit(), 20);

        assert!(window.ensure_includes(35));
        assert_eq!(window.render_limit(), 40);
        assert!(window.is_mounted(35));

        assert!(!window.ensure_includes(3));
        assert_eq!(window.render_limit(), 40);
    }
}
