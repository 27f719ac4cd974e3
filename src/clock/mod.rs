// Dual-chronometer time accounting: a pure elapsed computation for reads,
// and a lazy-tick reconciler that folds wall-clock time into the persisted
// accumulators. There is no background timer; the reconciler runs at the
// top of every read cycle.

pub mod elapsed;
pub mod reconciler;

pub use elapsed::*;
pub use reconciler::*;
