use rusqlite::Connection;
use anyhow::Result;

use crate::models::StageTimer;
use crate::repo::StageRepo;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Active timers examined.
    pub examined: usize,
    /// Timers whose accumulators were advanced.
    pub advanced: usize,
    /// Timers skipped because another client advanced them first.
    pub conflicts: usize,
}

/// Fold the wall-clock time since each timer's last reconciliation into its
/// active or pause accumulator, selected by the paused flag at the start of
/// the interval.
///
/// Runs over every Active stage timer across all orders. Each write is
/// conditioned on the `last_reconciled_ts` that was read, so two clients
/// ticking near-simultaneously cannot double-count: the loser's update
/// matches zero rows and is a no-op for that tick. Safe to call as often as
/// wanted; every read command calls it first.
pub fn reconcile_all(conn: &Connection, now: i64) -> Result<ReconcileSummary> {
    let timers = StageRepo::get_active(conn)?;
    let mut summary = ReconcileSummary { examined: timers.len(), ..Default::default() };

    for timer in &timers {
        match reconcile_one(conn, timer, now)? {
            TickResult::Advanced => summary.advanced += 1,
            TickResult::Conflict => summary.conflicts += 1,
            TickResult::NoElapsed => {}
        }
    }

    log::debug!(
        "reconcile pass at {}: {} examined, {} advanced, {} conflicts",
        now, summary.examined, summary.advanced, summary.conflicts
    );
    Ok(summary)
}

enum TickResult {
    Advanced,
    NoElapsed,
    Conflict,
}

fn reconcile_one(conn: &Connection, timer: &StageTimer, now: i64) -> Result<TickResult> {
    let last = match timer.last_reconciled_ts {
        Some(ts) => ts,
        None => return Ok(TickResult::NoElapsed),
    };
    let delta = now - last;
    if delta <= 0 {
        return Ok(TickResult::NoElapsed);
    }

    let (new_active, new_pause) = if timer.paused {
        (timer.active_secs, timer.pause_secs + delta)
    } else {
        (timer.active_secs + delta, timer.pause_secs)
    };
    // During a recut cycle the active delta also feeds the per-cycle
    // counter, leaving the lifetime accumulator intact.
    let new_recut_active = if timer.in_recut() && !timer.paused {
        timer.recut_active_secs + delta
    } else {
        timer.recut_active_secs
    };

    let applied = StageRepo::apply_reconciliation(
        conn,
        timer.id,
        new_active,
        new_pause,
        new_recut_active,
        now,
        last,
    )?;

    if applied {
        log::debug!(
            "timer {} ({} of order {}): +{}s {}",
            timer.id,
            timer.stage,
            timer.order_id,
            delta,
            if timer.paused { "pause" } else { "active" }
        );
        Ok(TickResult::Advanced)
    } else {
        log::debug!(
            "timer {} ({} of order {}): already advanced by another client",
            timer.id, timer.stage, timer.order_id
        );
        Ok(TickResult::Conflict)
    }
}
