//! Linkzur Marketplace
//!
//! B2B marketplace backend for laboratory chemicals, instruments and
//! consumables.
//!
//! ## Features
//! - Product catalog with variants and bulk sheet import
//! - Cart, wishlist and recently viewed products
//! - Order placement with frozen prices and per-order invoices
//! - Delivery confirmation by one-time code
//! - Quotation requests and buyer/seller conversations
//! - Reviews, seller dashboards and notifications

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod notify;
pub mod render;
pub mod storage;

pub use error::ApiError;

pub type Result<T> = std::result::Result<T, ApiError>;
