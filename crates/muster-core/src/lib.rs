//! Enrollment and attendance engine for musterd
//!
//! This crate is the heart of musterd, containing:
//! - The admission gate (deadline, capacity and grade checks)
//! - The signup state machine (pending -> confirmed -> attended, revoke, cancel)
//! - The attendance window calculator (weekly schedule to check-in verdict)
//! - Attendance marking, bulk operations and statistics
//! - The notification sink seam

mod admission;
mod attendance;
mod notify;
mod signups;
mod window;

pub use admission::*;
pub use attendance::*;
pub use notify::*;
pub use signups::*;
pub use window::*;
