//! Scholar Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the scholarly-dataset loader.
//!
//! # Overview
//!
//! - **Error Handling**: [`ScholarError`] and the [`Result`] alias used at the
//!   document-store and enrichment-service seams
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`] on top of
//!   `tracing-subscriber`
//!
//! # Example
//!
//! ```no_run
//! use scholar_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, ScholarError};
