//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the OneDrive client core:
//! - Logging and tracing infrastructure
//! - Service configuration
//! - Event bus for authentication lifecycle events
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the auth and provider layers
//! depend on. It owns the immutable [`ServiceConfig`](config::ServiceConfig),
//! the logging conventions and the broadcast channel hosts subscribe to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
