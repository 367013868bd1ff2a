//! Windowed slicing for large ordered collections.
//!
//! Variable views show big tables a page at a time; the caller keeps
//! asking for the next window starting at the previous `to`.

use serde::Serialize;

/// A window `[from, to)` into a collection of `total` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    /// First index of the window (inclusive).
    pub from: usize,
    /// End of the window (exclusive).
    pub to: usize,
    /// Items left after `to`.
    pub remaining: usize,
}

impl PageRange {
    /// Number of items inside the window.
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    /// Whether the window holds no items.
    pub fn is_empty(&self) -> bool {
        self.to == self.from
    }

    /// Whether more items follow this window.
    pub fn has_more(&self) -> bool {
        self.remaining > 0
    }
}

/// Compute the window starting at `from` holding at most `page_size` items.
///
/// Returns `None` when the collection is empty or `from` is past its end.
/// A negative `from` is clamped to zero.
pub fn range(total: usize, from: i64, page_size: usize) -> Option<PageRange> {
    if total == 0 {
        return None;
    }
    let from = usize::try_from(from.max(0)).unwrap_or(usize::MAX);
    if from >= total {
        return None;
    }
    let to = from.saturating_add(page_size).min(total);
    Some(PageRange {
        from,
        to,
        remaining: total - to,
    })
}

/// Slice `items` by the window computed with [`range`].
pub fn page<T>(items: &[T], from: i64, page_size: usize) -> Option<(&[T], PageRange)> {
    let window = range(items.len(), from, page_size)?;
    Some((&items[window.from..window.to], window))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_first_page() {
        assert_eq!(
            range(25, 0, 10),
            Some(PageRange {
                from: 0,
                to: 10,
                remaining: 15
            })
        );
    }

    #[test]
    fn range_from_at_end_is_none() {
        assert_eq!(range(5, 5, 10), None);
        assert_eq!(range(5, 5, 1), None);
        assert_eq!(range(5, 9, 3), None);
    }

    #[test]
    fn range_empty_collection_is_none() {
        assert_eq!(range(0, 0, 10), None);
    }

    #[test]
    fn range_negative_from_is_clamped() {
        assert_eq!(
            range(4, -3, 2),
            Some(PageRange {
                from: 0,
                to: 2,
                remaining: 2
            })
        );
    }

    #[test]
    fn range_last_partial_page() {
        let window = range(25, 20, 10).unwrap();
        assert_eq!(window.to, 25);
        assert_eq!(window.remaining, 0);
        assert_eq!(window.len(), 5);
        assert!(!window.has_more());
    }

    #[test]
    fn range_zero_page_size_is_empty_window() {
        let window = range(3, 1, 0).unwrap();
        assert!(window.is_empty());
        assert_eq!(window.remaining, 2);
    }

    #[test]
    fn range_huge_page_size_does_not_overflow() {
        let window = range(7, 2, usize::MAX).unwrap();
        assert_eq!(window.to, 7);
    }

    #[test]
    fn repeated_paging_walks_whole_collection() {
        let mut from = 0i64;
        let mut seen = 0;
        while let Some(window) = range(23, from, 10) {
            seen += window.len();
            from = window.to as i64;
        }
        assert_eq!(seen, 23);
    }

    #[test]
    fn page_slices_items() {
        let items: Vec<u32> = (0..12).collect();
        let (slice, window) = page(&items, 10, 5).unwrap();
        assert_eq!(slice, &[10, 11]);
        assert_eq!(window.remaining, 0);
    }
}
