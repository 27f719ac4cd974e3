use rusqlite::{Connection, OptionalExtension};
use anyhow::{Context, Result};

use crate::models::{NewOrder, Order, Stage, StageStatus};
use crate::repo::{QualityRepo, StageRepo};

/// Order repository for database operations
pub struct OrderRepo;

impl OrderRepo {
    /// Create a new order together with its pending cut and control stage
    /// records and an empty quality ledger. The stitch record is created on
    /// demand when stitching first starts.
    pub fn create(conn: &Connection, new: &NewOrder, now: i64) -> Result<Order> {
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO orders (of_number, model_code, model_label, color_code, quantity, observation, created_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                new.of_number,
                new.model_code,
                new.model_label,
                new.color_code,
                new.quantity,
                new.observation,
                now
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                anyhow::anyhow!("OF {} already exists", new.of_number)
            } else {
                anyhow::Error::new(e).context("Failed to create order")
            }
        })?;

        let id = tx.last_insert_rowid();
        StageRepo::create_pending(&tx, id, Stage::Cut)?;
        StageRepo::create_pending(&tx, id, Stage::Control)?;
        QualityRepo::create(&tx, id)?;
        tx.commit()?;

        Ok(Order {
            id,
            of_number: new.of_number.clone(),
            model_code: new.model_code.clone(),
            model_label: new.model_label.clone(),
            color_code: new.color_code.clone(),
            quantity: new.quantity,
            observation: new.observation.clone(),
            created_ts: now,
        })
    }

    /// Look up an order by its OF number
    pub fn get_by_of(conn: &Connection, of_number: &str) -> Result<Option<Order>> {
        let mut stmt = conn.prepare(
            "SELECT id, of_number, model_code, model_label, color_code, quantity, observation, created_ts
             FROM orders WHERE of_number = ?1",
        )?;

        stmt.query_row([of_number], row_to_order)
            .optional()
            .context("Failed to query order")
    }

    /// All orders, newest first
    pub fn list(conn: &Connection) -> Result<Vec<Order>> {
        let mut stmt = conn.prepare(
            "SELECT id, of_number, model_code, model_label, color_code, quantity, observation, created_ts
             FROM orders ORDER BY created_ts DESC, id DESC",
        )?;

        let rows = stmt.query_map([], row_to_order)?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?);
        }
        Ok(orders)
    }

    /// Administrative cascade delete. Not part of normal operation.
    pub fn delete_by_of(conn: &Connection, of_number: &str) -> Result<bool> {
        let affected = conn.execute("DELETE FROM orders WHERE of_number = ?1", [of_number])?;
        Ok(affected == 1)
    }

    /// Effective target quantity for the cut stage: the order quantity,
    /// or the recut override while a recut cycle runs.
    pub fn effective_cut_quantity(conn: &Connection, order: &Order) -> Result<i64> {
        let cut = StageRepo::get(conn, order.id, Stage::Cut)?;
        Ok(match cut {
            Some(t) if t.status == StageStatus::Active && t.recut_count > 0 => {
                t.quantity_override.unwrap_or(order.quantity)
            }
            _ => order.quantity,
        })
    }
}

fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        of_number: row.get(1)?,
        model_code: row.get(2)?,
        model_label: row.get(3)?,
        color_code: row.get(4)?,
        quantity: row.get(5)?,
        observation: row.get(6)?,
        created_ts: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;

    fn new_order(of: &str) -> NewOrder {
        NewOrder {
            of_number: of.to_string(),
            model_code: "CIN-01".to_string(),
            model_label: "Cendrillon".to_string(),
            color_code: "410".to_string(),
            quantity: 100,
            observation: None,
        }
    }

    #[test]
    fn test_create_order_with_stage_records() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let order = OrderRepo::create(&conn, &new_order("OF-2025-001"), 1000).unwrap();

        assert_eq!(order.of_number, "OF-2025-001");
        assert_eq!(order.quantity, 100);

        let cut = StageRepo::get(&conn, order.id, Stage::Cut).unwrap().unwrap();
        assert_eq!(cut.status, StageStatus::Pending);
        assert!(cut.last_reconciled_ts.is_none());

        let control = StageRepo::get(&conn, order.id, Stage::Control).unwrap().unwrap();
        assert_eq!(control.status, StageStatus::Pending);

        // Stitch is created on demand, not at intake.
        assert!(StageRepo::get(&conn, order.id, Stage::Stitch).unwrap().is_none());

        let ledger = QualityRepo::get(&conn, order.id).unwrap().unwrap();
        assert_eq!(ledger.controlled, 0);
    }

    #[test]
    fn test_duplicate_of_rejected() {
        let conn = DbConnection::connect_in_memory().unwrap();
        OrderRepo::create(&conn, &new_order("OF-1"), 1000).unwrap();
        let result = OrderRepo::create(&conn, &new_order("OF-1"), 1001);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[test]
    fn test_get_by_of() {
        let conn = DbConnection::connect_in_memory().unwrap();
        OrderRepo::create(&conn, &new_order("OF-1"), 1000).unwrap();

        assert!(OrderRepo::get_by_of(&conn, "OF-1").unwrap().is_some());
        assert!(OrderRepo::get_by_of(&conn, "OF-404").unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let conn = DbConnection::connect_in_memory().unwrap();
        OrderRepo::create(&conn, &new_order("OF-1"), 1000).unwrap();
        OrderRepo::create(&conn, &new_order("OF-2"), 2000).unwrap();

        let orders = OrderRepo::list(&conn).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].of_number, "OF-2");
        assert_eq!(orders[1].of_number, "OF-1");
    }

    #[test]
    fn test_cascade_delete() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let order = OrderRepo::create(&conn, &new_order("OF-1"), 1000).unwrap();

        assert!(OrderRepo::delete_by_of(&conn, "OF-1").unwrap());
        assert!(!OrderRepo::delete_by_of(&conn, "OF-1").unwrap());
        assert!(StageRepo::get(&conn, order.id, Stage::Cut).unwrap().is_none());
        assert!(QualityRepo::get(&conn, order.id).unwrap().is_none());
    }
}
