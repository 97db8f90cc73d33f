use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PAGE_SIZE;

/// `{page, size}` as sent by clients.
///
/// - `size == 0` uses [`DEFAULT_PAGE_SIZE`]
/// - `size < 0` means unlimited, and `page` is taken as a raw offset
/// - otherwise the offset is `page * size`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub size: i64,
}

impl Pagination {
    pub fn new(page: i64, size: i64) -> Self {
        Self { page, size }
    }

    pub fn unlimited() -> Self {
        Self { page: 0, size: -1 }
    }

    /// Saturates instead of overflowing on huge client-supplied pages.
    pub fn offset(&self) -> usize {
        let page = self.page.max(0);
        let offset = match self.size {
            s if s < 0 => page,
            0 => page.saturating_mul(DEFAULT_PAGE_SIZE),
            s => page.saturating_mul(s),
        };
        to_usize(offset)
    }

    /// `None` means no limit.
    pub fn limit(&self) -> Option<usize> {
        match self.size {
            s if s < 0 => None,
            0 => Some(to_usize(DEFAULT_PAGE_SIZE)),
            s => Some(to_usize(s)),
        }
    }
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size() {
        let p = Pagination::new(2, 0);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.limit(), Some(10));
    }

    #[test]
    fn test_negative_size_is_raw_offset() {
        let p = Pagination::new(7, -1);
        assert_eq!(p.offset(), 7);
        assert_eq!(p.limit(), None);
    }

    #[test]
    fn test_explicit_size() {
        let p = Pagination::new(3, 25);
        assert_eq!(p.offset(), 75);
        assert_eq!(p.limit(), Some(25));
    }

    #[test]
    fn test_huge_page_saturates() {
        let p = Pagination::new(i64::MAX / 2, 10);
        assert_eq!(p.offset(), usize::try_from(i64::MAX).unwrap_or(usize::MAX));
        assert_eq!(p.limit(), Some(10));

        let p = Pagination::new(i64::MAX, 0);
        assert_eq!(p.offset(), usize::try_from(i64::MAX).unwrap_or(usize::MAX));
    }
}
