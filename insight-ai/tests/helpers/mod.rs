//! Test Helper Utilities
//!
//! Shared utilities for testing insight-ai

#![allow(dead_code, unused_imports)]

pub mod db_utils;
pub mod fake_backend;
pub mod fixtures;
pub mod log_capture;

// Re-export commonly used items
pub use db_utils::{create_test_db, get_table_names, has_column};
pub use fake_backend::{Reply, ScriptedBackend};
pub use fixtures::{
    completed_image, document_record, image_record, owner_record, profile_record,
    test_retry_policy, Harness,
};
pub use log_capture::{init_test_logging, LogCapture};
