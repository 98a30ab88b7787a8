//! Page/size pagination for listing queries.

use serde::Deserialize;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Check page and size are within bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.page == 0 {
            return Err("page must be greater than zero".to_string());
        }
        if self.size == 0 {
            return Err("size must be greater than zero".to_string());
        }
        if self.size > MAX_PAGE_SIZE {
            return Err(format!("size exceeds maximum of {}", MAX_PAGE_SIZE));
        }
        Ok(())
    }

    /// SQL-style (offset, limit) for this page.
    pub fn offset_limit(&self) -> (u64, u64) {
        let limit = self.size as u64;
        let offset = limit * (self.page.max(1) as u64 - 1);
        (offset, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_default() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.size, 30);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_offset_limit() {
        assert_eq!(Pagination::new(1, 25).offset_limit(), (0, 25));
        assert_eq!(Pagination::new(3, 25).offset_limit(), (50, 25));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(Pagination::new(0, 10).validate().is_err());
        assert!(Pagination::new(1, 0).validate().is_err());
        assert!(Pagination::new(1, 101).validate().is_err());
        assert!(Pagination::new(1, 100).validate().is_ok());
    }
}
