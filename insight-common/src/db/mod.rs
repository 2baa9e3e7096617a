//! Shared database helpers

pub mod init;

pub use init::*;
