//! # Sitecache Common
//!
//! Shared plumbing for the sitecache workspace.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Wall-clock abstraction so freshness checks can be driven by tests

pub mod clock;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use logging::{init_logging, LogConfig, LogFormat, LogInitError};
