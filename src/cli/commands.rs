use clap::{Parser, Subcommand};
use rusqlite::Connection;
use chrono::Utc;
use anyhow::{bail, Result};

use crate::clock::reconcile_all;
use crate::db::DbConnection;
use crate::error::CoreError;
use crate::models::{NewOrder, Stage};
use crate::quality::{record_session, SessionInput};
use crate::repo::{HistoryRepo, OrderRepo, QualityRepo};
use crate::workflow::StageStateMachine;
use crate::cli::output;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(about = "Work-order tracker for the cut / control / stitch floor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new work order
    Create {
        /// OF number (unique)
        of: String,
        /// Model code
        #[arg(long)]
        model: String,
        /// Model label
        #[arg(long)]
        label: String,
        /// Color code
        #[arg(long)]
        color: String,
        /// Pairs to produce
        #[arg(long)]
        quantity: i64,
        /// Free-form note
        #[arg(long)]
        observation: Option<String>,
    },
    /// List orders with stage status and running chronometers
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show one order in detail
    Show {
        /// OF number
        of: String,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Start a stage (cut or stitch)
    Start {
        /// OF number
        of: String,
        /// Stage: cut or stitch
        stage: String,
    },
    /// Pause the chronometer of an active stage
    Pause {
        /// OF number
        of: String,
        /// Stage: cut, control or stitch
        stage: String,
    },
    /// Resume a paused stage
    Resume {
        /// OF number
        of: String,
        /// Stage: cut, control or stitch
        stage: String,
    },
    /// Finish a stage (cut or stitch)
    Finish {
        /// OF number
        of: String,
        /// Stage: cut or stitch
        stage: String,
    },
    /// Quality-control session commands
    Control {
        #[command(subcommand)]
        subcommand: ControlCommands,
    },
    /// Send rejected and rework pairs back to the cut stage
    Recut {
        /// OF number
        of: String,
    },
    /// Show the status-change history of an order
    History {
        /// OF number
        of: String,
    },
    /// Show the workshop dashboard
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Fold elapsed wall-clock time into every running chronometer
    Tick,
    /// Permanently delete an order and all its records
    Delete {
        /// OF number
        of: String,
        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ControlCommands {
    /// Start the first control session over a number of pairs
    Start {
        /// OF number
        of: String,
        /// Pairs this session will cover
        quantity: i64,
    },
    /// Record the counts of the current control session
    Record {
        /// OF number
        of: String,
        /// Pairs accepted
        #[arg(long, default_value_t = 0)]
        accepted: i64,
        /// Pairs rejected
        #[arg(long, default_value_t = 0)]
        rejected: i64,
        /// Pairs needing rework
        #[arg(long, default_value_t = 0)]
        rework: i64,
        /// Free-form note
        #[arg(long)]
        observation: Option<String>,
    },
    /// Continue control after a partial stop, over more pairs
    Continue {
        /// OF number
        of: String,
        /// Additional pairs to cover
        quantity: i64,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let conn = DbConnection::connect()?;
    handle_command(&conn, cli)
}

fn handle_command(conn: &Connection, cli: Cli) -> Result<()> {
    let now = Utc::now().timestamp();
    match cli.command {
        Commands::Create { of, model, label, color, quantity, observation } => {
            handle_create(conn, of, model, label, color, quantity, observation, now)
        }
        Commands::List { json } => handle_list(conn, json, now),
        Commands::Show { of, json } => handle_show(conn, &of, json, now),
        Commands::Start { of, stage } => handle_start(conn, &of, &stage, now),
        Commands::Pause { of, stage } => {
            StageStateMachine::pause_stage(conn, &of, parse_stage(&stage)?, now)?;
            println!("Paused {} of OF {}", stage, of);
            Ok(())
        }
        Commands::Resume { of, stage } => {
            StageStateMachine::resume_stage(conn, &of, parse_stage(&stage)?, now)?;
            println!("Resumed {} of OF {}", stage, of);
            Ok(())
        }
        Commands::Finish { of, stage } => {
            StageStateMachine::finish_stage(conn, &of, parse_stage(&stage)?, now)?;
            println!("Finished {} of OF {}", stage, of);
            Ok(())
        }
        Commands::Control { subcommand } => handle_control(conn, subcommand, now),
        Commands::Recut { of } => {
            let reproduced = StageStateMachine::start_recut(conn, &of, now)?;
            println!("Recut started on OF {}: {} pairs to reproduce", of, reproduced);
            Ok(())
        }
        Commands::History { of } => handle_history(conn, &of, now),
        Commands::Status { json } => {
            reconcile_all(conn, now)?;
            let orders = OrderRepo::list(conn)?;
            output::print_dashboard(conn, &orders, now, json)
        }
        Commands::Tick => {
            let summary = reconcile_all(conn, now)?;
            println!(
                "{} timers examined, {} advanced, {} already advanced elsewhere",
                summary.examined, summary.advanced, summary.conflicts
            );
            Ok(())
        }
        Commands::Delete { of, yes } => handle_delete(conn, &of, yes),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_create(
    conn: &Connection,
    of: String,
    model: String,
    label: String,
    color: String,
    quantity: i64,
    observation: Option<String>,
    now: i64,
) -> Result<()> {
    if quantity < 1 {
        bail!("quantity must be at least 1");
    }
    let order = OrderRepo::create(
        conn,
        &NewOrder {
            of_number: of,
            model_code: model,
            model_label: label,
            color_code: color,
            quantity,
            observation,
        },
        now,
    )?;
    println!("Created OF {} ({} pairs)", order.of_number, order.quantity);
    Ok(())
}

fn handle_list(conn: &Connection, json: bool, now: i64) -> Result<()> {
    reconcile_all(conn, now)?;
    let orders = OrderRepo::list(conn)?;
    if json {
        output::print_order_list_json(conn, &orders, now)
    } else {
        output::print_order_list(conn, &orders, now)
    }
}

fn handle_show(conn: &Connection, of: &str, json: bool, now: i64) -> Result<()> {
    reconcile_all(conn, now)?;
    let order = OrderRepo::get_by_of(conn, of)?
        .ok_or_else(|| CoreError::NotFound(of.to_string()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&output::order_json(conn, &order, now)?)?);
    } else {
        output::print_order_detail(conn, &order, now)?;
        output::print_sessions(&QualityRepo::sessions(conn, order.id)?);
    }
    Ok(())
}

fn handle_start(conn: &Connection, of: &str, stage: &str, now: i64) -> Result<()> {
    match parse_stage(stage)? {
        Stage::Cut => StageStateMachine::start_cut(conn, of, now)?,
        Stage::Stitch => StageStateMachine::start_stitch(conn, of, now)?,
        Stage::Control => {
            bail!("use 'atelier control start {} <quantity>' to start a control session", of)
        }
    }
    println!("Started {} of OF {}", stage, of);
    Ok(())
}

fn handle_control(conn: &Connection, cmd: ControlCommands, now: i64) -> Result<()> {
    match cmd {
        ControlCommands::Start { of, quantity } => {
            StageStateMachine::start_control(conn, &of, quantity, now)?;
            println!("Control started on OF {} over {} pairs", of, quantity);
        }
        ControlCommands::Record { of, accepted, rejected, rework, observation } => {
            let outcome = record_session(
                conn,
                &of,
                &SessionInput { accepted, rejected, rework, observation },
                now,
            )?;
            println!("Session recorded on OF {}: outcome {}", of, outcome.as_str());
        }
        ControlCommands::Continue { of, quantity } => {
            StageStateMachine::continue_control(conn, &of, quantity, now)?;
            println!("Control continued on OF {} over {} more pairs", of, quantity);
        }
    }
    Ok(())
}

fn handle_history(conn: &Connection, of: &str, now: i64) -> Result<()> {
    reconcile_all(conn, now)?;
    let order = OrderRepo::get_by_of(conn, of)?
        .ok_or_else(|| CoreError::NotFound(of.to_string()))?;
    output::print_history(&HistoryRepo::for_order(conn, order.id)?);
    Ok(())
}

fn handle_delete(conn: &Connection, of: &str, yes: bool) -> Result<()> {
    if !yes {
        bail!("deleting an order is permanent; pass --yes to confirm");
    }
    if !OrderRepo::delete_by_of(conn, of)? {
        return Err(CoreError::NotFound(of.to_string()).into());
    }
    println!("Deleted OF {}", of);
    Ok(())
}

fn parse_stage(s: &str) -> Result<Stage> {
    Stage::from_str(s)
        .ok_or_else(|| anyhow::anyhow!("unknown stage '{}' (expected cut, control or stitch)", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage() {
        assert_eq!(parse_stage("cut").unwrap(), Stage::Cut);
        assert_eq!(parse_stage("control").unwrap(), Stage::Control);
        assert_eq!(parse_stage("stitch").unwrap(), Stage::Stitch);
        assert!(parse_stage("sewing").is_err());
    }
}
