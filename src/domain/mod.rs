//! Marketplace domain: pure decisions, no I/O.
pub mod aggregates;
pub mod analytics;
pub mod bulk_upload;
pub mod events;
pub mod pricing;
pub mod value_objects;
