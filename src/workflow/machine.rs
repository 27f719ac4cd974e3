use rusqlite::Connection;
use anyhow::{bail, Result};

use crate::error::CoreError;
use crate::models::{ControlOutcome, Order, Stage, StageStatus, StageTimer};
use crate::repo::{HistoryRepo, OrderRepo, QualityRepo, StageRepo};

/// Stage transitions for one work order.
///
/// Every precondition is checked against a fresh read and then enforced
/// again inside the conditional UPDATE, so two clients racing on the same
/// stage leave exactly one winner and one typed conflict.
pub struct StageStateMachine;

impl StageStateMachine {
    /// Start the cut stage of an order (Pending -> Active).
    pub fn start_cut(conn: &Connection, of_number: &str, now: i64) -> Result<()> {
        let (order, timer) = load(conn, of_number, Stage::Cut)?;
        require_status(&timer, StageStatus::Pending, of_number, "start")?;

        if !StageRepo::start(conn, timer.id, now)? {
            return Err(conflict(of_number, Stage::Cut));
        }
        HistoryRepo::append(conn, order.id, Stage::Cut, Some("pending"), "active", None, now)?;
        log::info!("OF {}: cut started", of_number);
        Ok(())
    }

    /// Pause an Active stage. The interval since the last reconcile point
    /// folds into the active accumulator before the flag flips.
    pub fn pause_stage(conn: &Connection, of_number: &str, stage: Stage, now: i64) -> Result<()> {
        let (order, timer) = load(conn, of_number, stage)?;
        require_status(&timer, StageStatus::Active, of_number, "pause")?;
        if timer.paused {
            return Err(CoreError::InvalidTransition {
                of: of_number.to_string(),
                stage,
                status: "paused".to_string(),
                action: "pause",
            }
            .into());
        }

        if !StageRepo::set_paused(conn, &timer, true, now)? {
            return Err(conflict(of_number, stage));
        }
        HistoryRepo::append(conn, order.id, stage, Some("active"), "active", Some("paused"), now)?;
        Ok(())
    }

    /// Resume a paused stage. The paused interval folds into the pause
    /// accumulator before the flag flips back.
    pub fn resume_stage(conn: &Connection, of_number: &str, stage: Stage, now: i64) -> Result<()> {
        let (order, timer) = load(conn, of_number, stage)?;
        require_status(&timer, StageStatus::Active, of_number, "resume")?;
        if !timer.paused {
            return Err(CoreError::InvalidTransition {
                of: of_number.to_string(),
                stage,
                status: "running".to_string(),
                action: "resume",
            }
            .into());
        }

        if !StageRepo::set_paused(conn, &timer, false, now)? {
            return Err(conflict(of_number, stage));
        }
        HistoryRepo::append(conn, order.id, stage, Some("active"), "active", Some("resumed"), now)?;
        Ok(())
    }

    /// Finish the cut or stitch stage (Active -> Done). The control stage
    /// only finishes through recorded quality sessions. Finishing while
    /// paused is refused: resume first, so the final interval lands on the
    /// accumulator the operator expects.
    pub fn finish_stage(conn: &Connection, of_number: &str, stage: Stage, now: i64) -> Result<()> {
        if stage == Stage::Control {
            bail!("the control stage finishes through recorded quality sessions");
        }
        let (order, timer) = load(conn, of_number, stage)?;
        require_status(&timer, StageStatus::Active, of_number, "finish")?;
        if timer.paused {
            return Err(CoreError::InvalidTransition {
                of: of_number.to_string(),
                stage,
                status: "paused".to_string(),
                action: "finish",
            }
            .into());
        }

        if !StageRepo::finish(conn, &timer, now)? {
            return Err(conflict(of_number, stage));
        }
        let note = if timer.in_recut() { Some("recut finished") } else { None };
        HistoryRepo::append(conn, order.id, stage, Some("active"), "done", note, now)?;
        log::info!("OF {}: {} finished", of_number, stage);
        Ok(())
    }

    /// Start the first control session with a ceiling of `quantity` pairs.
    /// Requires the control stage Pending and the cut stage underway or
    /// better.
    pub fn start_control(conn: &Connection, of_number: &str, quantity: i64, now: i64) -> Result<()> {
        let (order, control) = load(conn, of_number, Stage::Control)?;
        require_status(&control, StageStatus::Pending, of_number, "start")?;

        let cut = StageRepo::get(conn, order.id, Stage::Cut)?
            .ok_or_else(|| CoreError::NotFound(of_number.to_string()))?;
        if cut.status == StageStatus::Pending {
            return Err(CoreError::InvalidTransition {
                of: of_number.to_string(),
                stage: Stage::Cut,
                status: "pending".to_string(),
                action: "control pairs from",
            }
            .into());
        }

        let ledger = QualityRepo::get(conn, order.id)?
            .ok_or_else(|| anyhow::anyhow!("Failed to load control ledger for OF {}", of_number))?;
        let remaining = ledger.remaining_total(order.quantity);
        if quantity < 1 || quantity > remaining {
            return Err(CoreError::QuantityOverflow { requested: quantity, remaining }.into());
        }

        if !set_target_and_start(conn, order.id, control.id, quantity, now)? {
            return Err(conflict(of_number, Stage::Control));
        }
        log::info!("OF {}: control started over {} pairs", of_number, quantity);
        Ok(())
    }

    /// Continue control after a partial stop: raise the session ceiling by
    /// `quantity` more pairs and reactivate the frozen timer. Accumulated
    /// time survives; only the reconcile point restarts.
    pub fn continue_control(
        conn: &Connection,
        of_number: &str,
        quantity: i64,
        now: i64,
    ) -> Result<()> {
        let (order, control) = load(conn, of_number, Stage::Control)?;
        require_status(&control, StageStatus::Done, of_number, "continue")?;

        let ledger = QualityRepo::get(conn, order.id)?
            .ok_or_else(|| anyhow::anyhow!("Failed to load control ledger for OF {}", of_number))?;
        let remaining = ledger.remaining_total(order.quantity);
        if remaining <= 0 {
            return Err(CoreError::InvalidTransition {
                of: of_number.to_string(),
                stage: Stage::Control,
                status: "complete".to_string(),
                action: "continue",
            }
            .into());
        }
        if quantity < 1 || quantity > remaining {
            return Err(CoreError::QuantityOverflow { requested: quantity, remaining }.into());
        }

        if !set_target_and_reactivate(conn, order.id, control.id, ledger.controlled + quantity, now)? {
            return Err(conflict(of_number, Stage::Control));
        }
        log::info!("OF {}: control continued over {} more pairs", of_number, quantity);
        Ok(())
    }

    /// Restart the cut stage to reproduce the rejected and rework pairs.
    ///
    /// Requires a finished cut and a rework verdict from control. The
    /// outstanding bad pairs move into the control denominator now, at the
    /// start of the cycle, and become the cut target for its duration. The
    /// control outcome drops back to partial until the reproduced pairs are
    /// controlled in turn.
    pub fn start_recut(conn: &Connection, of_number: &str, now: i64) -> Result<i64> {
        let (order, cut) = load(conn, of_number, Stage::Cut)?;
        require_status(&cut, StageStatus::Done, of_number, "recut")?;

        let ledger = QualityRepo::get(conn, order.id)?
            .ok_or_else(|| anyhow::anyhow!("Failed to load control ledger for OF {}", of_number))?;
        if ledger.outcome != Some(ControlOutcome::ReworkRequired) {
            return Err(CoreError::InvalidTransition {
                of: of_number.to_string(),
                stage: Stage::Control,
                status: ledger
                    .outcome
                    .map(|o| o.as_str().to_string())
                    .unwrap_or_else(|| "pending".to_string()),
                action: "recut pairs from",
            }
            .into());
        }
        let outstanding = ledger.outstanding_returns();
        if outstanding <= 0 {
            return Err(CoreError::InvalidTransition {
                of: of_number.to_string(),
                stage: Stage::Control,
                status: "complete".to_string(),
                action: "recut pairs from",
            }
            .into());
        }

        if !send_back_and_restart(conn, order.id, cut.id, outstanding, now)? {
            return Err(conflict(of_number, Stage::Cut));
        }
        log::info!("OF {}: recut started over {} pairs", of_number, outstanding);
        Ok(outstanding)
    }

    /// Start the stitch stage. Eligibility is evaluated here, on demand:
    /// the cut stage must be Done and the control timer Done (any outcome,
    /// a partial stop included). The stitch timer row is created lazily.
    pub fn start_stitch(conn: &Connection, of_number: &str, now: i64) -> Result<()> {
        let order = OrderRepo::get_by_of(conn, of_number)?
            .ok_or_else(|| CoreError::NotFound(of_number.to_string()))?;

        if !Self::stitch_eligible(conn, &order)? {
            let cut = StageRepo::get(conn, order.id, Stage::Cut)?;
            let (stage, status) = match cut {
                Some(t) if t.status != StageStatus::Done => {
                    (Stage::Cut, t.status.as_str().to_string())
                }
                _ => {
                    let control = StageRepo::get(conn, order.id, Stage::Control)?;
                    let status = control
                        .map(|t| t.status.as_str().to_string())
                        .unwrap_or_else(|| "pending".to_string());
                    (Stage::Control, status)
                }
            };
            return Err(CoreError::InvalidTransition {
                of: of_number.to_string(),
                stage,
                status,
                action: "stitch after",
            }
            .into());
        }

        let stitch = match StageRepo::get(conn, order.id, Stage::Stitch)? {
            Some(t) => t,
            None => {
                StageRepo::create_pending(conn, order.id, Stage::Stitch)?;
                StageRepo::get(conn, order.id, Stage::Stitch)?
                    .ok_or_else(|| anyhow::anyhow!("Failed to create stitch record"))?
            }
        };
        require_status(&stitch, StageStatus::Pending, of_number, "start")?;

        if !StageRepo::start(conn, stitch.id, now)? {
            return Err(conflict(of_number, Stage::Stitch));
        }
        HistoryRepo::append(conn, order.id, Stage::Stitch, Some("pending"), "active", None, now)?;
        log::info!("OF {}: stitch started", of_number);
        Ok(())
    }

    /// Whether the order may enter the stitch stage. Re-evaluated on every
    /// read: a recut flips it back to false until the cycle completes.
    pub fn stitch_eligible(conn: &Connection, order: &Order) -> Result<bool> {
        let cut = StageRepo::get(conn, order.id, Stage::Cut)?;
        let control = StageRepo::get(conn, order.id, Stage::Control)?;
        Ok(matches!(cut, Some(ref t) if t.status == StageStatus::Done)
            && matches!(control, Some(ref t) if t.status == StageStatus::Done))
    }
}

fn load(conn: &Connection, of_number: &str, stage: Stage) -> Result<(Order, StageTimer)> {
    let order = OrderRepo::get_by_of(conn, of_number)?
        .ok_or_else(|| CoreError::NotFound(of_number.to_string()))?;
    let timer = StageRepo::get(conn, order.id, stage)?
        .ok_or_else(|| CoreError::NotFound(of_number.to_string()))?;
    Ok((order, timer))
}

fn require_status(
    timer: &StageTimer,
    expected: StageStatus,
    of_number: &str,
    action: &'static str,
) -> Result<()> {
    if timer.status != expected {
        return Err(CoreError::InvalidTransition {
            of: of_number.to_string(),
            stage: timer.stage,
            status: timer.status.as_str().to_string(),
            action,
        }
        .into());
    }
    Ok(())
}

fn conflict(of_number: &str, stage: Stage) -> anyhow::Error {
    CoreError::ConcurrentModification { of: of_number.to_string(), stage }.into()
}

// The write phases below pair an unconditional ledger mutation with a
// conditional status transition, so they run in one transaction: if the
// transition misses its guard the ledger change rolls back with it.

fn set_target_and_start(
    conn: &Connection,
    order_id: i64,
    control_id: i64,
    target: i64,
    now: i64,
) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    QualityRepo::set_session_target(&tx, order_id, target)?;
    if !StageRepo::start(&tx, control_id, now)? {
        return Ok(false);
    }
    HistoryRepo::append(&tx, order_id, Stage::Control, Some("pending"), "active", None, now)?;
    tx.commit()?;
    Ok(true)
}

fn set_target_and_reactivate(
    conn: &Connection,
    order_id: i64,
    control_id: i64,
    target: i64,
    now: i64,
) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    QualityRepo::set_session_target(&tx, order_id, target)?;
    if !StageRepo::reactivate(&tx, control_id, now)? {
        return Ok(false);
    }
    HistoryRepo::append(&tx, order_id, Stage::Control, Some("done"), "active", None, now)?;
    tx.commit()?;
    Ok(true)
}

fn send_back_and_restart(
    conn: &Connection,
    order_id: i64,
    cut_id: i64,
    outstanding: i64,
    now: i64,
) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    if !QualityRepo::send_to_recut(&tx, order_id, outstanding)? {
        return Ok(false);
    }
    if !StageRepo::restart_for_recut(&tx, cut_id, outstanding, now)? {
        return Ok(false);
    }
    HistoryRepo::append(&tx, order_id, Stage::Cut, Some("done"), "active", Some("recut"), now)?;
    tx.commit()?;
    Ok(true)
}
