// Output formatting for the atelier CLI

use rusqlite::Connection;
use anyhow::Result;
use serde_json::json;

use crate::clock::elapsed;
use crate::models::{ControlLedger, HistoryEntry, Order, QualitySession, Stage, StageStatus, StageTimer};
use crate::repo::{QualityRepo, StageRepo};
use crate::utils::{format_compact, format_hms};
use crate::workflow::StageStateMachine;

/// Human-readable status cell for a stage timer, recut and pause aware.
fn status_cell(timer: Option<&StageTimer>) -> String {
    match timer {
        None => "-".to_string(),
        Some(t) => match t.status {
            StageStatus::Pending => "pending".to_string(),
            StageStatus::Active if t.paused => "paused".to_string(),
            StageStatus::Active if t.in_recut() => "recut".to_string(),
            StageStatus::Active => "active".to_string(),
            StageStatus::Done => "done".to_string(),
        },
    }
}

/// One-line-per-order table for `atelier list`.
pub fn print_order_list(conn: &Connection, orders: &[Order], now: i64) -> Result<()> {
    if orders.is_empty() {
        println!("No orders.");
        return Ok(());
    }

    println!(
        "{:<14} {:<10} {:<6} {:>5} {:<8} {:<8} {:<8} {:>8}",
        "OF", "MODEL", "COLOR", "QTY", "CUT", "CONTROL", "STITCH", "ACTIVE"
    );
    for order in orders {
        let cut = StageRepo::get(conn, order.id, Stage::Cut)?;
        let control = StageRepo::get(conn, order.id, Stage::Control)?;
        let stitch = StageRepo::get(conn, order.id, Stage::Stitch)?;

        let total_active: i64 = [&cut, &control, &stitch]
            .iter()
            .filter_map(|t| t.as_ref())
            .map(|t| elapsed(t, now).active_secs)
            .sum();

        println!(
            "{:<14} {:<10} {:<6} {:>5} {:<8} {:<8} {:<8} {:>8}",
            order.of_number,
            order.model_code,
            order.color_code,
            order.quantity,
            status_cell(cut.as_ref()),
            status_cell(control.as_ref()),
            status_cell(stitch.as_ref()),
            format_compact(total_active),
        );
    }
    Ok(())
}

/// JSON rendering of the order list, one object per order with per-stage
/// status and reconciled chronometers.
pub fn print_order_list_json(conn: &Connection, orders: &[Order], now: i64) -> Result<()> {
    let mut out = Vec::new();
    for order in orders {
        out.push(order_json(conn, order, now)?);
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn timer_json(timer: Option<&StageTimer>, now: i64) -> serde_json::Value {
    match timer {
        None => serde_json::Value::Null,
        Some(t) => {
            let e = elapsed(t, now);
            json!({
                "status": t.status.as_str(),
                "paused": t.paused,
                "active_secs": e.active_secs,
                "pause_secs": e.pause_secs,
                "started_ts": t.started_ts,
                "finished_ts": t.finished_ts,
                "recut_count": t.recut_count,
                "recut_active_secs": t.recut_active_secs,
            })
        }
    }
}

pub fn order_json(conn: &Connection, order: &Order, now: i64) -> Result<serde_json::Value> {
    let cut = StageRepo::get(conn, order.id, Stage::Cut)?;
    let control = StageRepo::get(conn, order.id, Stage::Control)?;
    let stitch = StageRepo::get(conn, order.id, Stage::Stitch)?;
    let ledger = QualityRepo::get(conn, order.id)?;

    Ok(json!({
        "of_number": order.of_number,
        "model_code": order.model_code,
        "model_label": order.model_label,
        "color_code": order.color_code,
        "quantity": order.quantity,
        "observation": order.observation,
        "stitch_eligible": StageStateMachine::stitch_eligible(conn, order)?,
        "cut": timer_json(cut.as_ref(), now),
        "control": timer_json(control.as_ref(), now),
        "stitch": timer_json(stitch.as_ref(), now),
        "ledger": ledger.map(|l| json!({
            "controlled": l.controlled,
            "accepted": l.accepted,
            "rejected": l.rejected,
            "rework": l.rework,
            "returned": l.returned,
            "total_to_control": l.total_to_control(order.quantity),
            "session_target": l.session_target,
            "outcome": l.outcome.map(|o| o.as_str()),
            "observation": l.observation,
        })),
    }))
}

fn print_stage_detail(label: &str, timer: Option<&StageTimer>, now: i64) {
    match timer {
        None => println!("  {:<9} -", label),
        Some(t) => {
            let e = elapsed(t, now);
            let mut line = format!(
                "  {:<9} {:<8} active {}  pause {}",
                label,
                status_cell(Some(t)),
                format_hms(e.active_secs),
                format_hms(e.pause_secs),
            );
            if t.recut_count > 0 {
                line.push_str(&format!("  (recut cycle: {})", format_hms(t.recut_active_secs)));
            }
            println!("{}", line);
        }
    }
}

fn print_ledger_detail(ledger: &ControlLedger, order_quantity: i64) {
    let total = ledger.total_to_control(order_quantity);
    println!(
        "  quality   {}/{} controlled ({:.0}%)  accepted {}  rejected {}  rework {}",
        ledger.controlled,
        total,
        ledger.progress_pct(order_quantity),
        ledger.accepted,
        ledger.rejected,
        ledger.rework,
    );
    if ledger.returned > 0 {
        println!("            {} returned through recut", ledger.returned);
    }
    if let Some(outcome) = ledger.outcome {
        println!("            outcome: {}", outcome.as_str());
    }
    if let Some(obs) = &ledger.observation {
        println!("            note: {}", obs);
    }
}

/// Full detail block for `atelier show`.
pub fn print_order_detail(conn: &Connection, order: &Order, now: i64) -> Result<()> {
    println!(
        "OF {}  {} {} (color {}), {} pairs",
        order.of_number, order.model_code, order.model_label, order.color_code, order.quantity
    );
    if let Some(obs) = &order.observation {
        println!("  note: {}", obs);
    }

    let cut = StageRepo::get(conn, order.id, Stage::Cut)?;
    let control = StageRepo::get(conn, order.id, Stage::Control)?;
    let stitch = StageRepo::get(conn, order.id, Stage::Stitch)?;
    print_stage_detail("cut", cut.as_ref(), now);
    print_stage_detail("control", control.as_ref(), now);
    print_stage_detail("stitch", stitch.as_ref(), now);

    if let Some(ledger) = QualityRepo::get(conn, order.id)? {
        print_ledger_detail(&ledger, order.quantity);
    }

    if StageStateMachine::stitch_eligible(conn, order)?
        && !matches!(stitch, Some(ref t) if t.status != StageStatus::Pending)
    {
        println!("  ready for stitching");
    }
    Ok(())
}

/// Committed quality sessions of an order, oldest first.
pub fn print_sessions(sessions: &[QualitySession]) {
    if sessions.is_empty() {
        return;
    }
    println!("  sessions:");
    for s in sessions {
        let mut line = format!(
            "    #{}: accepted {}, rejected {}, rework {}",
            s.session_no, s.accepted, s.rejected, s.rework
        );
        if let Some(obs) = &s.observation {
            line.push_str(&format!("  ({})", obs));
        }
        println!("{}", line);
    }
}

/// Status-change log for `atelier history`.
pub fn print_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No history.");
        return;
    }
    for e in entries {
        let old = e.old_status.as_deref().unwrap_or("-");
        let mut line = format!("{}  {:<8} {} -> {}", e.changed_ts, e.stage, old, e.new_status);
        if let Some(note) = &e.note {
            line.push_str(&format!("  ({})", note));
        }
        println!("{}", line);
    }
}

/// Workshop dashboard for `atelier status`.
pub fn print_dashboard(conn: &Connection, orders: &[Order], now: i64, as_json: bool) -> Result<()> {
    let mut running = 0usize;
    let mut paused = 0usize;
    let mut ready_to_stitch = 0usize;
    let mut finished = 0usize;
    let mut controlled = 0i64;
    let mut accepted = 0i64;
    let mut rejected = 0i64;
    let mut rework = 0i64;

    for order in orders {
        if let Some(l) = QualityRepo::get(conn, order.id)? {
            controlled += l.controlled;
            accepted += l.accepted;
            rejected += l.rejected;
            rework += l.rework;
        }
        let stitch = StageRepo::get(conn, order.id, Stage::Stitch)?;
        if matches!(stitch, Some(ref t) if t.status == StageStatus::Done) {
            finished += 1;
            continue;
        }
        if StageStateMachine::stitch_eligible(conn, order)?
            && !matches!(stitch, Some(ref t) if t.status == StageStatus::Active)
        {
            ready_to_stitch += 1;
        }
        for stage in [Stage::Cut, Stage::Control, Stage::Stitch] {
            if let Some(t) = StageRepo::get(conn, order.id, stage)? {
                if t.status == StageStatus::Active {
                    if t.paused {
                        paused += 1;
                    } else {
                        running += 1;
                    }
                }
            }
        }
    }

    let acceptance_pct = if controlled > 0 {
        accepted as f64 / controlled as f64 * 100.0
    } else {
        0.0
    };

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "orders": orders.len(),
                "running_timers": running,
                "paused_timers": paused,
                "ready_to_stitch": ready_to_stitch,
                "finished_orders": finished,
                "controlled": controlled,
                "accepted": accepted,
                "rejected": rejected,
                "rework": rework,
                "acceptance_pct": acceptance_pct,
                "as_of": now,
            }))?
        );
    } else {
        println!("{} orders, {} finished", orders.len(), finished);
        println!("{} timers running, {} paused", running, paused);
        println!("{} ready for stitching", ready_to_stitch);
        println!(
            "{} controlled: {} accepted, {} rejected, {} rework ({:.0}% acceptance)",
            controlled, accepted, rejected, rework, acceptance_pct
        );
    }
    Ok(())
}
