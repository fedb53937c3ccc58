//! Domain and protocol types for musterd
//!
//! This crate defines the stable API between musterd and clients:
//! - Domain records (activities, signups, attendance)
//! - Commands (requests from clients)
//! - Responses
//! - Events (service -> clients)

mod attendance;
mod commands;
mod events;
mod types;

pub use attendance::*;
pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
