pub mod batch;
pub mod guard;
pub mod kv;
pub mod reconcile;
pub mod snapshot;

use derive_more::Display;

/// Rejections produced by the decision layer before any write is attempted.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[display(fmt = "Already checked in today")]
    AlreadyCheckedIn,

    #[display(fmt = "No active check-in found for today")]
    NotCheckedIn,

    #[display(fmt = "Attendance already complete for today")]
    AlreadyComplete,
}

impl std::error::Error for ClockError {}
