//! Shared utilities for musterd
//!
//! This crate provides:
//! - ID types (ActivityId, SignupId, StudentId, ClientId)
//! - Time utilities (wall clock, injectable clocks, mock time)
//! - Error types
//! - Default paths for socket, data, and log directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
