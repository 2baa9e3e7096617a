//! # Insight Common Library
//!
//! Shared code for the Insight services including:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Clock abstraction used for stale-lock detection
//! - Analysis lifecycle events (EventBus)
//! - Settings table initialization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
