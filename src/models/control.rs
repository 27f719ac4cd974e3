use serde::{Deserialize, Serialize};

use super::ControlOutcome;

/// Running quality totals for the control stage of one order.
///
/// Conservation invariant, enforced at every session commit:
/// `controlled == accepted + rejected + rework`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlLedger {
    pub order_id: i64,
    /// Session-scoped ceiling: how many pairs the current control session
    /// is allowed to cover, cumulative across continued sessions.
    pub session_target: i64,
    pub controlled: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub rework: i64,
    /// Pairs returned to the cut stage by prior recut cycles. These inflate
    /// the control denominator once the recut starts.
    pub returned: i64,
    /// Terminal substate, None while the control timer is Pending/Active.
    pub outcome: Option<ControlOutcome>,
    pub observation: Option<String>,
}

impl ControlLedger {
    /// Total pairs this order must get through control: the original target
    /// plus everything sent back through recut so far.
    pub fn total_to_control(&self, order_quantity: i64) -> i64 {
        order_quantity + self.returned
    }

    /// Pairs not yet controlled, against the inflated total.
    pub fn remaining_total(&self, order_quantity: i64) -> i64 {
        self.total_to_control(order_quantity) - self.controlled
    }

    /// Pairs left under the current session ceiling.
    pub fn session_remaining(&self) -> i64 {
        (self.session_target - self.controlled).max(0)
    }

    /// Rejected + rework pairs that have not yet been sent back to the cut
    /// stage. This is what a new recut cycle would reproduce.
    pub fn outstanding_returns(&self) -> i64 {
        (self.rejected + self.rework - self.returned).max(0)
    }

    /// Control progress for display, clamped to [0, 100].
    pub fn progress_pct(&self, order_quantity: i64) -> f64 {
        let total = self.total_to_control(order_quantity);
        if total <= 0 {
            return 0.0;
        }
        let pct = self.controlled as f64 / total as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ControlLedger {
        ControlLedger {
            order_id: 1,
            session_target: 10,
            controlled: 0,
            accepted: 0,
            rejected: 0,
            rework: 0,
            returned: 0,
            outcome: None,
            observation: None,
        }
    }

    #[test]
    fn test_totals_without_returns() {
        let l = ledger();
        assert_eq!(l.total_to_control(100), 100);
        assert_eq!(l.remaining_total(100), 100);
        assert_eq!(l.progress_pct(100), 0.0);
    }

    #[test]
    fn test_returns_inflate_denominator() {
        let mut l = ledger();
        l.controlled = 10;
        l.accepted = 5;
        l.rejected = 2;
        l.rework = 3;
        assert_eq!(l.outstanding_returns(), 5);

        // Before the recut starts the denominator is untouched.
        assert_eq!(l.total_to_control(10), 10);
        assert_eq!(l.progress_pct(10), 100.0);

        // The recut moves the bad pairs into `returned`.
        l.returned = 5;
        assert_eq!(l.outstanding_returns(), 0);
        assert_eq!(l.total_to_control(10), 15);
        assert_eq!(l.remaining_total(10), 5);
        assert!(l.progress_pct(10) < 100.0);
    }

    #[test]
    fn test_progress_clamped() {
        let mut l = ledger();
        l.controlled = 150;
        assert_eq!(l.progress_pct(100), 100.0);
        assert_eq!(l.progress_pct(0), 0.0);
    }

    #[test]
    fn test_session_remaining_never_negative() {
        let mut l = ledger();
        l.session_target = 5;
        l.controlled = 8;
        assert_eq!(l.session_remaining(), 0);
    }
}
