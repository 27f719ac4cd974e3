use rusqlite::{Connection, OptionalExtension};
use anyhow::{Context, Result};

use crate::models::{ControlLedger, ControlOutcome, QualitySession};

/// Quality-ledger repository: running control totals plus the immutable
/// per-session history rows.
pub struct QualityRepo;

impl QualityRepo {
    /// Create the empty ledger row for a new order
    pub fn create(conn: &Connection, order_id: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO control_ledgers (order_id) VALUES (?1)",
            [order_id],
        )
        .context("Failed to create control ledger")?;
        Ok(())
    }

    pub fn get(conn: &Connection, order_id: i64) -> Result<Option<ControlLedger>> {
        let mut stmt = conn.prepare(
            "SELECT order_id, session_target, controlled, accepted, rejected, rework,
                    returned, outcome, observation
             FROM control_ledgers WHERE order_id = ?1",
        )?;

        stmt.query_row([order_id], row_to_ledger)
            .optional()
            .context("Failed to query control ledger")
    }

    /// Set the session ceiling when a control session (re)starts. The
    /// outcome clears: the stage is Active again.
    pub fn set_session_target(conn: &Connection, order_id: i64, target: i64) -> Result<()> {
        conn.execute(
            "UPDATE control_ledgers SET session_target = ?1, outcome = NULL WHERE order_id = ?2",
            rusqlite::params![target, order_id],
        )?;
        Ok(())
    }

    /// Commit one control session: bump the running totals, resolve the
    /// outcome and append the immutable session row, conditioned on the
    /// `controlled` total the caller read. Returns false when another
    /// client committed a session in between. Runs on whatever connection
    /// or transaction the caller holds; the caller wraps it together with
    /// the timer freeze so a lost race rolls everything back.
    #[allow(clippy::too_many_arguments)]
    pub fn commit_session(
        conn: &Connection,
        order_id: i64,
        accepted: i64,
        rejected: i64,
        rework: i64,
        outcome: ControlOutcome,
        observation: Option<&str>,
        expected_controlled: i64,
        now: i64,
    ) -> Result<bool> {
        let session = accepted + rejected + rework;
        let affected = conn.execute(
            "UPDATE control_ledgers
             SET controlled = controlled + ?1,
                 accepted = accepted + ?2,
                 rejected = rejected + ?3,
                 rework = rework + ?4,
                 outcome = ?5,
                 observation = COALESCE(?6, observation)
             WHERE order_id = ?7 AND controlled = ?8",
            rusqlite::params![
                session,
                accepted,
                rejected,
                rework,
                outcome.as_str(),
                observation,
                order_id,
                expected_controlled
            ],
        )?;
        if affected != 1 {
            return Ok(false);
        }

        let session_no: i64 = conn.query_row(
            "SELECT COALESCE(MAX(session_no), 0) + 1 FROM quality_sessions WHERE order_id = ?1",
            [order_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO quality_sessions (order_id, session_no, accepted, rejected, rework, observation, recorded_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![order_id, session_no, accepted, rejected, rework, observation, now],
        )?;
        Ok(true)
    }

    /// Move the outstanding rejected+rework pairs into `returned` when a
    /// recut starts; the control outcome drops back to PartiallyDone.
    /// Conditional on the ledger still carrying the rework verdict.
    pub fn send_to_recut(conn: &Connection, order_id: i64, quantity: i64) -> Result<bool> {
        let affected = conn.execute(
            "UPDATE control_ledgers
             SET returned = returned + ?1, outcome = ?2
             WHERE order_id = ?3 AND outcome = ?4",
            rusqlite::params![
                quantity,
                ControlOutcome::PartiallyDone.as_str(),
                order_id,
                ControlOutcome::ReworkRequired.as_str()
            ],
        )?;
        Ok(affected == 1)
    }

    /// All committed sessions of an order, oldest first
    pub fn sessions(conn: &Connection, order_id: i64) -> Result<Vec<QualitySession>> {
        let mut stmt = conn.prepare(
            "SELECT id, order_id, session_no, accepted, rejected, rework, observation, recorded_ts
             FROM quality_sessions WHERE order_id = ?1 ORDER BY session_no",
        )?;

        let rows = stmt.query_map([order_id], |row| {
            Ok(QualitySession {
                id: row.get(0)?,
                order_id: row.get(1)?,
                session_no: row.get(2)?,
                accepted: row.get(3)?,
                rejected: row.get(4)?,
                rework: row.get(5)?,
                observation: row.get(6)?,
                recorded_ts: row.get(7)?,
            })
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}

fn row_to_ledger(row: &rusqlite::Row) -> rusqlite::Result<ControlLedger> {
    let outcome_str: Option<String> = row.get(7)?;
    Ok(ControlLedger {
        order_id: row.get(0)?,
        session_target: row.get(1)?,
        controlled: row.get(2)?,
        accepted: row.get(3)?,
        rejected: row.get(4)?,
        rework: row.get(5)?,
        returned: row.get(6)?,
        outcome: outcome_str.as_deref().and_then(ControlOutcome::from_str),
        observation: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use crate::models::NewOrder;
    use crate::repo::OrderRepo;

    fn setup(conn: &Connection) -> i64 {
        OrderRepo::create(
            conn,
            &NewOrder {
                of_number: "OF-1".to_string(),
                model_code: "CIN-01".to_string(),
                model_label: "Cendrillon".to_string(),
                color_code: "410".to_string(),
                quantity: 10,
                observation: None,
            },
            1000,
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_commit_session_updates_totals_and_history() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let order_id = setup(&conn);

        let ok = QualityRepo::commit_session(
            &conn, order_id, 5, 2, 3,
            ControlOutcome::PartiallyDone, Some("scuffed heels"), 0, 2000,
        )
        .unwrap();
        assert!(ok);

        let ledger = QualityRepo::get(&conn, order_id).unwrap().unwrap();
        assert_eq!(ledger.controlled, 10);
        assert_eq!(ledger.accepted, 5);
        assert_eq!(ledger.rejected, 2);
        assert_eq!(ledger.rework, 3);
        assert_eq!(ledger.controlled, ledger.accepted + ledger.rejected + ledger.rework);

        let sessions = QualityRepo::sessions(&conn, order_id).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_no, 1);
        assert_eq!(sessions[0].observation.as_deref(), Some("scuffed heels"));
    }

    #[test]
    fn test_commit_session_conflict_is_noop() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let order_id = setup(&conn);

        QualityRepo::commit_session(&conn, order_id, 2, 0, 0, ControlOutcome::PartiallyDone, None, 0, 2000).unwrap();
        // Same expected_controlled: stale, must not double-apply.
        let ok = QualityRepo::commit_session(&conn, order_id, 2, 0, 0, ControlOutcome::PartiallyDone, None, 0, 2001).unwrap();
        assert!(!ok);

        let ledger = QualityRepo::get(&conn, order_id).unwrap().unwrap();
        assert_eq!(ledger.controlled, 2);
        assert_eq!(QualityRepo::sessions(&conn, order_id).unwrap().len(), 1);
    }

    #[test]
    fn test_send_to_recut_requires_rework_outcome() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let order_id = setup(&conn);

        // No verdict yet: refused.
        assert!(!QualityRepo::send_to_recut(&conn, order_id, 5).unwrap());

        QualityRepo::commit_session(&conn, order_id, 5, 2, 3, ControlOutcome::ReworkRequired, None, 0, 2000).unwrap();
        assert!(QualityRepo::send_to_recut(&conn, order_id, 5).unwrap());

        let ledger = QualityRepo::get(&conn, order_id).unwrap().unwrap();
        assert_eq!(ledger.returned, 5);
        assert_eq!(ledger.outcome, Some(ControlOutcome::PartiallyDone));
    }
}
