use thiserror::Error;

use crate::models::Stage;

/// Typed failures surfaced by the core.
///
/// None of these are fatal to the process; every one is scoped to a single
/// order/stage and is returned to the caller, which re-renders on the next
/// tick anyway. The core performs no retries itself.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A transition was requested on a stage whose current status does not
    /// satisfy the precondition. No mutation has taken place.
    #[error("cannot {action} the {stage} stage of OF {of}: stage is {status}")]
    InvalidTransition {
        of: String,
        stage: Stage,
        status: String,
        action: &'static str,
    },

    /// A quality session would push the controlled total past what is left
    /// to control.
    #[error("session of {requested} pairs exceeds the {remaining} remaining to control")]
    QuantityOverflow { requested: i64, remaining: i64 },

    /// An optimistic update lost the race against another client. The row
    /// is untouched; re-read and retry if needed.
    #[error("concurrent modification on the {stage} stage of OF {of}")]
    ConcurrentModification { of: String, stage: Stage },

    #[error("order {0} not found")]
    NotFound(String),
}
