//! qaz-core - Core types and traits for the retrieval engine
//!
//! This crate provides the foundational types, traits, configuration and
//! error handling used throughout the qazsearch workspace.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{QazError, Result};
pub use traits::*;
pub use types::*;
