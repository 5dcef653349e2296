//! # Julius Common Library
//!
//! Shared code for the Julius attribution workspace:
//! - Error type shared by every crate
//! - TOML configuration loading and output folder resolution
//! - Pipeline progress events and the broadcast event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
