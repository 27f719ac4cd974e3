//! Atelier - production work-order tracker for a shoe workshop
//!
//! This library provides the core functionality for Atelier, including:
//! - Database operations and migrations
//! - Data models for work orders, stage timers and the quality ledger
//! - Dual-chronometer elapsed-time accounting (active vs. pause time)
//! - The lazy-tick reconciler that folds wall-clock time into the
//!   persisted accumulators before every read
//! - Stage state machine (cut -> quality control -> stitch) with the
//!   recut loop
//! - Repository layer for data access
//! - CLI command parsing and execution
//!
//! # Example
//!
//! ```no_run
//! use atelier::cli::run;
//!
//! fn main() {
//!     if let Err(e) = run() {
//!         eprintln!("Error: {}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod clock;
pub mod workflow;
pub mod quality;
pub mod repo;
pub mod cli;
pub mod utils;
