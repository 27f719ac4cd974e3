use serde::{Deserialize, Serialize};

/// A work order ("OF"), the unit of production tracked through
/// cut / quality control / stitch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Business key (e.g. "OF-2025-001"). Unique, immutable.
    pub of_number: String,
    pub model_code: String,
    pub model_label: String,
    pub color_code: String,
    /// Target quantity in pairs. Positive.
    pub quantity: i64,
    pub observation: Option<String>,
    pub created_ts: i64,
}

/// Intake form for a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub of_number: String,
    pub model_code: String,
    pub model_label: String,
    pub color_code: String,
    pub quantity: i64,
    pub observation: Option<String>,
}

/// A committed quality-control session, kept as an immutable history row in
/// addition to the running totals on the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySession {
    pub id: i64,
    pub order_id: i64,
    pub session_no: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub rework: i64,
    pub observation: Option<String>,
    pub recorded_ts: i64,
}

/// One status-change history entry for an order's stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub order_id: i64,
    pub stage: String,
    pub old_status: Option<String>,
    pub new_status: String,
    pub note: Option<String>,
    pub changed_ts: i64,
}
