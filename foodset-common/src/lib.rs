//! # Foodset Common Library
//!
//! Shared code for the foodset dataset tooling:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Category registry (food classes, labels, aliases)

pub mod categories;
pub mod config;
pub mod error;

pub use categories::{Category, CategoryRegistry, UNKNOWN_LABEL};
pub use error::{Error, Result};
