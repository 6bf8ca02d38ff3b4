//! lektor: sentence-aligned read-aloud engine for markdown guide articles.

pub mod api;
pub mod config;
pub mod error;
pub mod library;
pub mod narration;
pub mod reader;

pub use error::{Error, Result};
