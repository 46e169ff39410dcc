//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the credential and cache core:
//! - Logging and tracing bootstrap
//! - Configuration and capability injection
//! - Event bus
//!
//! Every other core crate depends on this one for its configuration types and
//! event definitions.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
