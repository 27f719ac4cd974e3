use rusqlite::Connection;
use anyhow::{Context, Result};

use crate::models::{HistoryEntry, Stage};

/// Status-change history for audit and the `history` command
pub struct HistoryRepo;

impl HistoryRepo {
    pub fn append(
        conn: &Connection,
        order_id: i64,
        stage: Stage,
        old_status: Option<&str>,
        new_status: &str,
        note: Option<&str>,
        now: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO history (order_id, stage, old_status, new_status, note, changed_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![order_id, stage.as_str(), old_status, new_status, note, now],
        )
        .context("Failed to append history entry")?;
        Ok(())
    }

    pub fn for_order(conn: &Connection, order_id: i64) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, order_id, stage, old_status, new_status, note, changed_ts
             FROM history WHERE order_id = ?1 ORDER BY changed_ts, id",
        )?;

        let rows = stmt.query_map([order_id], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                order_id: row.get(1)?,
                stage: row.get(2)?,
                old_status: row.get(3)?,
                new_status: row.get(4)?,
                note: row.get(5)?,
                changed_ts: row.get(6)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
