use crate::models::{StageStatus, StageTimer};

/// Elapsed active/pause durations of one stage timer at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    pub active_secs: i64,
    pub pause_secs: i64,
}

impl Elapsed {
    pub fn total_secs(&self) -> i64 {
        self.active_secs + self.pause_secs
    }
}

/// Compute the elapsed active and pause time for a timer snapshot.
///
/// Pure and deterministic. A Pending timer reads (0, 0); a Done timer is
/// frozen at its stored accumulators; an Active timer adds the delta since
/// `last_reconciled_ts` to exactly one side, selected by the paused flag.
/// Negative deltas (clock skew, stale snapshot) are clamped to zero, never
/// subtracted.
pub fn elapsed(timer: &StageTimer, now: i64) -> Elapsed {
    match timer.status {
        StageStatus::Pending => Elapsed { active_secs: 0, pause_secs: 0 },
        StageStatus::Done => Elapsed {
            active_secs: timer.active_secs,
            pause_secs: timer.pause_secs,
        },
        StageStatus::Active => {
            let delta = timer
                .last_reconciled_ts
                .map(|last| (now - last).max(0))
                .unwrap_or(0);
            if timer.paused {
                Elapsed {
                    active_secs: timer.active_secs,
                    pause_secs: timer.pause_secs + delta,
                }
            } else {
                Elapsed {
                    active_secs: timer.active_secs + delta,
                    pause_secs: timer.pause_secs,
                }
            }
        }
    }
}
