pub mod auth;
pub mod conversation;
pub mod message;
pub mod notification;
pub mod platform;
pub mod push;
pub mod realtime;
pub mod user;

use serde::Serialize;

/// Page metadata returned alongside paginated listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    #[must_use]
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        Self { page, limit, total, pages: total.div_ceil(u64::from(limit.max(1))) }
    }

    /// Rows to skip for this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// Takes at most `max_chars` characters of `text` without splitting a code point.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("مرحبا بك", 5), "مرحبا");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_pagination_rounds_pages_up() {
        let page = Pagination::new(3, 20, 41);
        assert_eq!(page.pages, 3);
        assert_eq!(page.offset(), 40);
        assert_eq!(Pagination::new(1, 20, 0).pages, 0);
    }
}
