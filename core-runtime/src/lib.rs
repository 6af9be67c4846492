//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the content core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its logging conventions,
//! its validated [`CoreConfig`](config::CoreConfig), and the
//! [`EventBus`](events::EventBus) used to broadcast listing, download and
//! action events to observers outside the merged listing.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
