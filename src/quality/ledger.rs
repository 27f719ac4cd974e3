use rusqlite::Connection;
use anyhow::{bail, Result};

use crate::error::CoreError;
use crate::models::{ControlLedger, ControlOutcome, Stage, StageStatus, StageTimer};
use crate::repo::{HistoryRepo, OrderRepo, QualityRepo, StageRepo};

/// One control session as entered by the operator.
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub accepted: i64,
    pub rejected: i64,
    pub rework: i64,
    pub observation: Option<String>,
}

impl SessionInput {
    pub fn total(&self) -> i64 {
        self.accepted + self.rejected + self.rework
    }
}

/// Resolve the control outcome a committed session lands on.
///
/// Anything short of the full (inflated) total is a partial stop. A complete
/// control run is approved when every pair passed; pairs still awaiting a
/// recut flag the order for rework; once a recut cycle has run, whatever bad
/// pairs remain ship as approved-with-rework. The recut loop runs at most
/// once.
pub fn resolve_outcome(
    ledger: &ControlLedger,
    order_quantity: i64,
    recut_count: i64,
) -> ControlOutcome {
    if ledger.remaining_total(order_quantity) > 0 {
        return ControlOutcome::PartiallyDone;
    }
    if ledger.rejected + ledger.rework == 0 {
        ControlOutcome::Approved
    } else if recut_count == 0 && ledger.outstanding_returns() > 0 {
        ControlOutcome::ReworkRequired
    } else {
        ControlOutcome::ApprovedWithRework
    }
}

/// Record one quality-control session against an order.
///
/// The control stage must be Active. The session counts are validated
/// against both what remains to control overall and the ceiling set when the
/// session started; the totals commit conditionally on the `controlled`
/// value read here, and the control timer freezes with the resolved outcome.
/// Every commit freezes the timer: a partial stop resumes through
/// `continue_control`, never by leaving the chronometer running.
pub fn record_session(
    conn: &Connection,
    of_number: &str,
    input: &SessionInput,
    now: i64,
) -> Result<ControlOutcome> {
    let order = OrderRepo::get_by_of(conn, of_number)?
        .ok_or_else(|| CoreError::NotFound(of_number.to_string()))?;

    let control = StageRepo::get(conn, order.id, Stage::Control)?
        .ok_or_else(|| CoreError::NotFound(of_number.to_string()))?;
    if control.status != StageStatus::Active {
        return Err(CoreError::InvalidTransition {
            of: of_number.to_string(),
            stage: Stage::Control,
            status: control.status.as_str().to_string(),
            action: "record a session on",
        }
        .into());
    }

    if input.accepted < 0 || input.rejected < 0 || input.rework < 0 {
        bail!("session counts must be non-negative");
    }
    let session = input.total();
    if session == 0 {
        bail!("session must cover at least one pair");
    }

    let ledger = QualityRepo::get(conn, order.id)?
        .ok_or_else(|| anyhow::anyhow!("Failed to load control ledger for OF {}", of_number))?;

    let remaining = ledger.remaining_total(order.quantity);
    if session > remaining {
        return Err(CoreError::QuantityOverflow { requested: session, remaining }.into());
    }
    let ceiling = ledger.session_remaining();
    if session > ceiling {
        return Err(CoreError::QuantityOverflow { requested: session, remaining: ceiling }.into());
    }

    let cut = StageRepo::get(conn, order.id, Stage::Cut)?
        .ok_or_else(|| CoreError::NotFound(of_number.to_string()))?;

    let mut after = ledger.clone();
    after.controlled += session;
    after.accepted += input.accepted;
    after.rejected += input.rejected;
    after.rework += input.rework;
    // A verdict needs the cut stage closed; until then even a fully
    // controlled batch stays partial.
    let outcome = if cut.status == StageStatus::Done {
        resolve_outcome(&after, order.quantity, cut.recut_count)
    } else {
        ControlOutcome::PartiallyDone
    };

    if !persist_session(conn, order.id, &control, input, outcome, ledger.controlled, now)? {
        return Err(CoreError::ConcurrentModification {
            of: of_number.to_string(),
            stage: Stage::Control,
        }
        .into());
    }

    log::info!(
        "OF {}: control session of {} pairs committed, outcome {}",
        of_number,
        session,
        outcome.as_str()
    );
    Ok(outcome)
}

/// Write phase of a session: ledger totals, session row, timer freeze and
/// history, in one transaction. Returns false (rolling everything back)
/// when either conditional statement loses a race, so a conflict never
/// leaves the outcome set while the timer still runs.
fn persist_session(
    conn: &Connection,
    order_id: i64,
    control: &StageTimer,
    input: &SessionInput,
    outcome: ControlOutcome,
    expected_controlled: i64,
    now: i64,
) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;

    let committed = QualityRepo::commit_session(
        &tx,
        order_id,
        input.accepted,
        input.rejected,
        input.rework,
        outcome,
        input.observation.as_deref(),
        expected_controlled,
        now,
    )?;
    if !committed {
        return Ok(false);
    }
    if !StageRepo::finish(&tx, control, now)? {
        return Ok(false);
    }
    HistoryRepo::append(
        &tx,
        order_id,
        Stage::Control,
        Some(control.status.as_str()),
        StageStatus::Done.as_str(),
        Some(outcome.as_str()),
        now,
    )?;

    tx.commit()?;
    Ok(true)
}
