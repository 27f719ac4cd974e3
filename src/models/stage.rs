use serde::{Deserialize, Serialize};

/// Production stage of a work order. Ordering is fixed and hard-coded:
/// cut -> quality control -> stitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Cut,
    Control,
    Stitch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Cut => "cut",
            Stage::Control => "control",
            Stage::Stitch => "stitch",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cut" => Some(Stage::Cut),
            "control" => Some(Stage::Control),
            "stitch" => Some(Stage::Stitch),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timer status of one stage.
///
/// A Pending timer has never run; an Active timer is ticking (into the
/// active or the pause accumulator depending on the paused flag); a Done
/// timer is frozen. Control carries richer terminal substates in
/// [`ControlOutcome`] alongside this status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Active,
    Done,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Active => "active",
            StageStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StageStatus::Pending),
            "active" => Some(StageStatus::Active),
            "done" => Some(StageStatus::Done),
            _ => None,
        }
    }
}

/// Terminal substate of the quality-control stage, resolved when a session
/// completes. `PartiallyDone` means more pairs remain to control; the timer
/// is frozen until the operator continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlOutcome {
    PartiallyDone,
    Approved,
    ReworkRequired,
    ApprovedWithRework,
}

impl ControlOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlOutcome::PartiallyDone => "partial",
            ControlOutcome::Approved => "approved",
            ControlOutcome::ReworkRequired => "rework",
            ControlOutcome::ApprovedWithRework => "approved_with_rework",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "partial" => Some(ControlOutcome::PartiallyDone),
            "approved" => Some(ControlOutcome::Approved),
            "rework" => Some(ControlOutcome::ReworkRequired),
            "approved_with_rework" => Some(ControlOutcome::ApprovedWithRework),
            _ => None,
        }
    }
}

/// One stage timer, as persisted. Three instances per order (the stitch one
/// is created on demand), structurally identical across stages.
///
/// Invariant: true elapsed time since `started_ts` equals
/// `active_secs + pause_secs` plus whatever has accrued since
/// `last_reconciled_ts`. Accumulators are only trustworthy after a
/// reconciliation pass; stale reads undercount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTimer {
    pub id: i64,
    pub order_id: i64,
    pub stage: Stage,
    pub status: StageStatus,
    pub paused: bool,
    /// Seconds spent producing. Grows only while Active and not paused.
    pub active_secs: i64,
    /// Seconds spent paused. Grows only while Active and paused.
    pub pause_secs: i64,
    /// Point up to which the accumulators are correct. NULL while Pending.
    pub last_reconciled_ts: Option<i64>,
    pub started_ts: Option<i64>,
    pub finished_ts: Option<i64>,
    /// Active seconds of the current recut cycle (cut stage only).
    pub recut_active_secs: i64,
    pub recut_count: i64,
    pub recut_started_ts: Option<i64>,
    /// Target quantity for the current recut cycle, overriding the order's
    /// quantity while the recut runs.
    pub quantity_override: Option<i64>,
}

impl StageTimer {
    /// True while a recut cycle is underway on this (cut) timer.
    pub fn in_recut(&self) -> bool {
        self.recut_count > 0 && self.status == StageStatus::Active
    }
}
