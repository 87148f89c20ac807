//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the FieldSync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other `core-*` crate depends on this one for its logging
//! conventions, its typed events and the validated [`CoreConfig`](config::CoreConfig)
//! it is constructed from.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
