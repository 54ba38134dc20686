//! Fixed-size pages over a sorted result set.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_LINKS: usize = 7;

/// `max(1, ceil(count / page_size))`
pub fn total_pages(count: usize, page_size: usize) -> usize {
    let size = page_size.max(1);
    count.div_ceil(size).max(1)
}

/// Position of one page inside the full result set. Indices are 1-based and
/// both zero for an empty set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub current: usize,
    pub total_pages: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub count: usize,
}

impl PageWindow {
    pub fn compute(count: usize, page_size: usize, requested: usize) -> Self {
        let size = page_size.max(1);
        let total = total_pages(count, size);
        let current = requested.clamp(1, total);
        let (start_index, end_index) = if count == 0 {
            (0, 0)
        } else {
            ((current - 1) * size + 1, (current * size).min(count))
        };
        Self { current, total_pages: total, start_index, end_index, count }
    }

    /// Zero-based slice range.
    pub fn range(&self) -> std::ops::Range<usize> {
        if self.count == 0 { 0..0 } else { self.start_index - 1..self.end_index }
    }
}

/// Rows of the requested page plus its window. Out-of-range requests clamp.
pub fn paginate<T>(items: &[T], page_size: usize, requested: usize) -> (&[T], PageWindow) {
    let w = PageWindow::compute(items.len(), page_size, requested);
    (&items[w.range()], w)
}

/// Page cursor that re-clamps whenever the result count changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page_size: usize,
    current: usize,
    count: usize,
}

impl Default for Pager {
    fn default() -> Self { Self::new(DEFAULT_PAGE_SIZE) }
}

impl Pager {
    pub fn new(page_size: usize) -> Self { Self { page_size: page_size.max(1), current: 1, count: 0 } }

    pub fn page_size(&self) -> usize { self.page_size }
    pub fn current(&self) -> usize { self.current }
    pub fn total_pages(&self) -> usize { total_pages(self.count, self.page_size) }

    pub fn set_count(&mut self, count: usize) {
        self.count = count;
        self.current = self.current.clamp(1, self.total_pages());
    }

    /// Navigate; returns the clamped page actually selected.
    pub fn go_to(&mut self, page: usize) -> usize {
        self.current = page.clamp(1, self.total_pages());
        self.current
    }

    pub fn reset(&mut self) { self.current = 1; }

    pub fn window(&self) -> PageWindow { PageWindow::compute(self.count, self.page_size, self.current) }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let w = PageWindow::compute(items.len(), self.page_size, self.current);
        &items[w.range()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "page", rename_all = "lowercase")]
pub enum PageLink {
    Page(usize),
    Ellipsis,
}

/// Page-button model: every page when there are at most seven, otherwise
/// first, current +/- 1, last, with ellipses over the gaps. A single page
/// produces no links.
pub fn page_links(current: usize, total: usize) -> Vec<PageLink> {
    if total <= 1 { return Vec::new(); }
    if total <= MAX_LINKS { return (1..=total).map(PageLink::Page).collect(); }
    let current = current.clamp(1, total);
    let left = current.saturating_sub(1).max(2);
    let right = (current + 1).min(total - 1);
    let mut out = vec![PageLink::Page(1)];
    if left > 2 { out.push(PageLink::Ellipsis); }
    out.extend((left..=right).map(PageLink::Page));
    if right < total - 1 { out.push(PageLink::Ellipsis); }
    out.push(PageLink::Page(total));
    out
}
