//! # prodscan Common Library
//!
//! Shared code for the prodscan services:
//! - Error type
//! - TOML configuration model and loading
//! - Pipeline event wire types (NDJSON stream)

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{PipelineEvent, ResolutionMethod};
