use rusqlite::{Connection, OptionalExtension};
use anyhow::{Context, Result};

use crate::models::{Stage, StageStatus, StageTimer};

const TIMER_COLUMNS: &str =
    "id, order_id, stage, status, paused, active_secs, pause_secs, last_reconciled_ts, \
     started_ts, finished_ts, recut_active_secs, recut_count, recut_started_ts, quantity_override";

/// Stage-timer repository. Every mutating statement here is conditioned on
/// the state the caller read (status, paused flag, reconcile point), so a
/// concurrent writer makes the statement match zero rows instead of
/// clobbering accumulators. Callers turn a `false` return into a typed
/// conflict or invalid-transition error.
pub struct StageRepo;

impl StageRepo {
    /// Insert a Pending timer row for a stage of an order
    pub fn create_pending(conn: &Connection, order_id: i64, stage: Stage) -> Result<()> {
        conn.execute(
            "INSERT INTO stage_timers (order_id, stage, status) VALUES (?1, ?2, 'pending')",
            rusqlite::params![order_id, stage.as_str()],
        )
        .context("Failed to create stage record")?;
        Ok(())
    }

    /// Get one stage timer of an order
    pub fn get(conn: &Connection, order_id: i64, stage: Stage) -> Result<Option<StageTimer>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM stage_timers WHERE order_id = ?1 AND stage = ?2",
            TIMER_COLUMNS
        ))?;

        stmt.query_row(rusqlite::params![order_id, stage.as_str()], row_to_timer)
            .optional()
            .context("Failed to query stage timer")
    }

    /// All timers currently ticking: status Active with a reconcile point.
    pub fn get_active(conn: &Connection) -> Result<Vec<StageTimer>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM stage_timers
             WHERE status = 'active' AND last_reconciled_ts IS NOT NULL
             ORDER BY order_id, stage",
            TIMER_COLUMNS
        ))?;

        let rows = stmt.query_map([], row_to_timer)?;
        let mut timers = Vec::new();
        for row in rows {
            timers.push(row?);
        }
        Ok(timers)
    }

    /// Conditional accumulator update for one reconciliation tick.
    ///
    /// Applies only if `last_reconciled_ts` still equals the value the
    /// caller read; returns false when another client advanced the timer
    /// first. This is the only way accumulators are ever written.
    pub fn apply_reconciliation(
        conn: &Connection,
        timer_id: i64,
        new_active_secs: i64,
        new_pause_secs: i64,
        new_recut_active_secs: i64,
        new_last_reconciled_ts: i64,
        expected_prior_ts: i64,
    ) -> Result<bool> {
        let affected = conn.execute(
            "UPDATE stage_timers
             SET active_secs = ?1, pause_secs = ?2, recut_active_secs = ?3, last_reconciled_ts = ?4
             WHERE id = ?5 AND status = 'active' AND last_reconciled_ts = ?6",
            rusqlite::params![
                new_active_secs,
                new_pause_secs,
                new_recut_active_secs,
                new_last_reconciled_ts,
                timer_id,
                expected_prior_ts
            ],
        )?;
        Ok(affected == 1)
    }

    /// Pending -> Active. Stamps the start milestone and the first
    /// reconcile point.
    pub fn start(conn: &Connection, timer_id: i64, now: i64) -> Result<bool> {
        let affected = conn.execute(
            "UPDATE stage_timers
             SET status = 'active', paused = 0, started_ts = ?1, last_reconciled_ts = ?1
             WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![now, timer_id],
        )?;
        Ok(affected == 1)
    }

    /// Flip the paused flag, folding the interval since the snapshot's
    /// reconcile point into the accumulator selected by the OLD flag.
    /// Toggle-then-reconcile ordering is strict and this does both in one
    /// conditional statement.
    pub fn set_paused(
        conn: &Connection,
        snapshot: &StageTimer,
        pause: bool,
        now: i64,
    ) -> Result<bool> {
        let expected_last = match snapshot.last_reconciled_ts {
            Some(ts) => ts,
            None => return Ok(false),
        };
        let delta = (now - expected_last).max(0);
        let (new_active, new_pause) = if snapshot.paused {
            (snapshot.active_secs, snapshot.pause_secs + delta)
        } else {
            (snapshot.active_secs + delta, snapshot.pause_secs)
        };
        let new_recut_active = if snapshot.in_recut() && !snapshot.paused {
            snapshot.recut_active_secs + delta
        } else {
            snapshot.recut_active_secs
        };

        let affected = conn.execute(
            "UPDATE stage_timers
             SET active_secs = ?1, pause_secs = ?2, recut_active_secs = ?3,
                 paused = ?4, last_reconciled_ts = ?5
             WHERE id = ?6 AND status = 'active' AND paused = ?7 AND last_reconciled_ts = ?8",
            rusqlite::params![
                new_active,
                new_pause,
                new_recut_active,
                pause as i64,
                now,
                snapshot.id,
                snapshot.paused as i64,
                expected_last
            ],
        )?;
        Ok(affected == 1)
    }

    /// Active -> Done. Folds the final interval (per the snapshot's paused
    /// flag), freezes the timer and stamps the finish milestone.
    pub fn finish(conn: &Connection, snapshot: &StageTimer, now: i64) -> Result<bool> {
        let expected_last = match snapshot.last_reconciled_ts {
            Some(ts) => ts,
            None => return Ok(false),
        };
        let delta = (now - expected_last).max(0);
        let (new_active, new_pause) = if snapshot.paused {
            (snapshot.active_secs, snapshot.pause_secs + delta)
        } else {
            (snapshot.active_secs + delta, snapshot.pause_secs)
        };
        let new_recut_active = if snapshot.in_recut() && !snapshot.paused {
            snapshot.recut_active_secs + delta
        } else {
            snapshot.recut_active_secs
        };

        let affected = conn.execute(
            "UPDATE stage_timers
             SET active_secs = ?1, pause_secs = ?2, recut_active_secs = ?3,
                 status = 'done', paused = 0, finished_ts = ?4, last_reconciled_ts = ?4
             WHERE id = ?5 AND status = 'active' AND paused = ?6 AND last_reconciled_ts = ?7",
            rusqlite::params![
                new_active,
                new_pause,
                new_recut_active,
                now,
                snapshot.id,
                snapshot.paused as i64,
                expected_last
            ],
        )?;
        Ok(affected == 1)
    }

    /// Done -> Active again for a recut cycle. Historical accumulators are
    /// left untouched; the per-cycle counter restarts and the target
    /// quantity is overridden for the duration of the recut.
    pub fn restart_for_recut(
        conn: &Connection,
        timer_id: i64,
        override_quantity: i64,
        now: i64,
    ) -> Result<bool> {
        let affected = conn.execute(
            "UPDATE stage_timers
             SET status = 'active', paused = 0,
                 recut_count = recut_count + 1, recut_active_secs = 0,
                 recut_started_ts = ?1, quantity_override = ?2,
                 finished_ts = NULL, last_reconciled_ts = ?1
             WHERE id = ?3 AND status = 'done'",
            rusqlite::params![now, override_quantity, timer_id],
        )?;
        Ok(affected == 1)
    }

    /// Done -> Active for a continued control session. Accumulators and the
    /// start milestone survive; only the reconcile point restarts.
    pub fn reactivate(conn: &Connection, timer_id: i64, now: i64) -> Result<bool> {
        let affected = conn.execute(
            "UPDATE stage_timers
             SET status = 'active', paused = 0, finished_ts = NULL, last_reconciled_ts = ?1
             WHERE id = ?2 AND status = 'done'",
            rusqlite::params![now, timer_id],
        )?;
        Ok(affected == 1)
    }
}

fn row_to_timer(row: &rusqlite::Row) -> rusqlite::Result<StageTimer> {
    let stage_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    Ok(StageTimer {
        id: row.get(0)?,
        order_id: row.get(1)?,
        stage: Stage::from_str(&stage_str).unwrap_or(Stage::Cut),
        status: StageStatus::from_str(&status_str).unwrap_or(StageStatus::Pending),
        paused: row.get::<_, i64>(4)? != 0,
        active_secs: row.get(5)?,
        pause_secs: row.get(6)?,
        last_reconciled_ts: row.get(7)?,
        started_ts: row.get(8)?,
        finished_ts: row.get(9)?,
        recut_active_secs: row.get(10)?,
        recut_count: row.get(11)?,
        recut_started_ts: row.get(12)?,
        quantity_override: row.get(13)?,
    })
}
