//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the library scanner:
//! - Logging and tracing bootstrap
//! - Library configuration
//! - Event bus and progress event types
//! - Update lock side-channel
//!
//! ## Overview
//!
//! Everything here is shared by the engine crates and the binary. It holds no
//! catalog or network logic of its own.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod update_lock;

pub use error::{Error, Result};
