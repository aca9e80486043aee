#![forbid(unsafe_code)]

//! Driver for the TFVC annotate tool.
//!
//! The tool is started as a child process and driven over a line-based
//! protocol on its standard streams: a credential handshake, then one
//! request per file answered with one record per source line. See
//! [`protocol`] for the wire details and [`provider`] for the entry point.

pub mod config;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod provider;

pub use config::AnnotateConfig;
pub use errors::{AppError, Disposition, Result};
