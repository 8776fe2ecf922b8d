//! CLI utilities for dailycast.
//!
//! This crate provides common utilities for CLI applications: context
//! configuration, input loading and result output.

pub mod config;
pub mod output;
pub mod request;

pub use config::{Config, Context, VolcengineCredentials};
pub use output::{audio_extension, format_bytes, Output, OutputFormat};
pub use request::{load_request, RequestError};
