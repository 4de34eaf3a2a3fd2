//! # ratings-common
//!
//! Shared code for the ratings engine: database bootstrap/schema-sync,
//! the common error type, and atomic-file utilities used by the
//! progress reporter.

pub mod atomic_file;
pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
