//! Postgres persistence.
//!
//! Every function takes a connection so callers decide the transaction
//! boundary: `&mut *tx` inside a transaction, an acquired connection otherwise.

pub mod analytics;
pub mod cart;
pub mod catalog;
pub mod conversations;
pub mod invoices;
pub mod notifications;
pub mod orders;
pub mod quotations;
pub mod registrations;
pub mod reviews;
pub mod sellers;
pub mod users;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct Page {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl Page {
    pub fn number(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn limit(&self) -> u32 { self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE) }
    pub fn offset(&self) -> i64 { i64::from(self.number() - 1) * i64::from(self.limit()) }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        let p = Page { page: Some(0), per_page: Some(500) };
        assert_eq!(p.number(), 1);
        assert_eq!(p.limit(), MAX_PER_PAGE);
        assert_eq!(p.offset(), 0);
        let p = Page { page: Some(3), per_page: None };
        assert_eq!(p.offset(), 40);
    }
}
