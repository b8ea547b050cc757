//! MineTrack command-line front-end
//!
//! Drives the tracking core from a terminal: log in, start and stop
//! operations, inspect the durable queue and force a sync.

use chrono::Utc;
use clap::{Parser, Subcommand};
use minetrack::client::operation::{format_elapsed, RepeatOutcome, StopOutcome};
use minetrack::client::{Config, MineTrack};
use minetrack::shared::{AppConfig, OperationDetails, TrackError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minetrack")]
#[command(about = "Mining operations tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and reconcile with the server
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Forget the stored session (queued actions are kept)
    Logout,

    /// Show the session, the running operation and the queue
    Status,

    /// Flush the queue and pull the server's current operation
    Sync,

    /// Start an operation
    Start {
        /// Equipment id
        #[arg(short, long)]
        equipment: String,

        /// Activity id
        #[arg(short, long)]
        activity: String,

        /// Material id
        #[arg(short, long)]
        material: Option<String>,

        /// Truck being loaded (equipment id)
        #[arg(short, long)]
        truck: Option<String>,

        #[arg(long)]
        mining_front: Option<String>,

        #[arg(long)]
        destination: Option<String>,

        /// Reason from the activity's taxonomy
        #[arg(short, long)]
        reason: Option<String>,

        /// Free-text notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Stop the running operation
    Stop {
        /// Distance travelled, for transport operations
        #[arg(short, long)]
        distance: Option<f64>,
    },

    /// Repeat a stopped operation with the same parameters
    Repeat {
        /// Operation id from the history
        operation: String,
    },

    /// List queued actions
    Queue,

    /// Show stopped operations grouped by day
    History,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_app_config(AppConfig::from_toml_file(path)?)?,
        None => Config::new(),
    };

    let app = MineTrack::open(config).await?;
    let user = app.startup().await?;

    if user.is_none() && !matches!(cli.command, Commands::Login { .. } | Commands::Queue) {
        return Err(TrackError::NotAuthenticated.into());
    }

    match cli.command {
        Commands::Login { email, password } => {
            let user = app.login(&email, &password).await?;
            println!("Logged in as {} <{}>", user.name, user.email);
        }

        Commands::Logout => {
            app.auth().logout().await?;
            let pending = app.synchronizer().pending_count().await?;
            println!("Logged out ({} queued actions kept)", pending);
        }

        Commands::Status => {
            if let Some(user) = user {
                println!("User:     {} <{}>", user.name, user.email);
            }
            match app.session().active().await {
                Some(active) => println!(
                    "Running:  {} on {} ({}, x{})",
                    active.operation_id().unwrap_or("<no id>"),
                    active.equipment.name,
                    format_elapsed(active.elapsed_secs(Utc::now())),
                    active.repeat_count
                ),
                None => println!("Running:  nothing"),
            }
            let status = app.sync_service().status().await?;
            println!("Queued:   {}", status.pending_actions);
            match status.last_sync {
                Some(at) => println!("Synced:   {}", at.to_rfc3339()),
                None => println!("Synced:   never"),
            }
            println!(
                "Session:  {}",
                format_elapsed(app.session().session_total_secs().await)
            );
        }

        Commands::Sync => {
            let report = app.sync_service().force_sync().await?;
            println!(
                "Synced {} actions, dropped {}, {} remaining",
                report.synced(),
                report.dropped.len(),
                report.remaining
            );
            for dropped in &report.dropped {
                println!("  dropped {} {}: {}", dropped.kind, dropped.operation_ref, dropped.reason);
            }
            if let Some(reason) = &report.halted_on {
                println!("Stopped early: {}", reason);
            } else {
                let outcome = app.synchronizer().sync_active_operations().await?;
                println!("Active operation: {:?}", outcome);
            }
        }

        Commands::Start {
            equipment,
            activity,
            material,
            truck,
            mining_front,
            destination,
            reason,
            notes,
        } => {
            let data = app.reference_data().load(app.connectivity().as_ref()).await?;
            let equipment = data
                .find_equipment(&equipment)
                .ok_or_else(|| TrackError::validation("equipment", "Unknown equipment"))?;
            let activity = data
                .find_activity(&activity)
                .ok_or_else(|| TrackError::validation("activity", "Unknown activity"))?;

            let details = OperationDetails {
                material,
                truck_being_loaded: truck,
                mining_front,
                destination,
                detail_reason: reason,
                notes,
            };
            let active = app.tracker().start(equipment, activity, &details).await?;
            println!(
                "Started {} on {}",
                active.operation_id().unwrap_or("<no id>"),
                equipment.name
            );
        }

        Commands::Stop { distance } => match app.tracker().stop(distance).await? {
            StopOutcome::Stopped { operation_id, .. } => println!("Stopped {}", operation_id),
            StopOutcome::Queued { operation_id, .. } => {
                println!("Stop for {} queued until the server is reachable", operation_id)
            }
            StopOutcome::RemovedLocally { operation_id, .. } => {
                println!("{} never reached the server and was discarded", operation_id)
            }
        },

        Commands::Repeat { operation } => {
            let history = app.history().await?;
            let reference = history
                .stopped()
                .iter()
                .find(|op| op.id.as_deref() == Some(operation.as_str()))
                .ok_or_else(|| TrackError::validation("operation", "Not in the history"))?;

            match app.tracker().repeat_with_same_parameters(reference).await? {
                RepeatOutcome::Incremented { repeat_count } => {
                    println!("Repeat count is now {}", repeat_count)
                }
                RepeatOutcome::Started(active) => println!(
                    "Started {}",
                    active.operation_id().unwrap_or("<no id>")
                ),
            }
        }

        Commands::Queue => {
            let pending = app.database().peek_all().await?;
            if pending.is_empty() {
                println!("Queue is empty");
            }
            for entry in pending {
                println!(
                    "#{} {} {} (attempts: {}{})",
                    entry.seq,
                    entry.action.kind(),
                    entry.action.operation_ref(),
                    entry.attempt_count,
                    entry
                        .error_message
                        .map(|e| format!(", last error: {}", e))
                        .unwrap_or_default()
                );
            }
        }

        Commands::History => {
            let history = app.history().await?;
            let active = app.session().active().await;
            if let Some(active) = &active {
                println!(
                    "Running operation, repetition {}",
                    history.display_count(active)
                );
            }
            for day in history.groups_by_day(active.as_ref()) {
                println!("{}", day.date.format("%a %b %d %Y"));
                for group in &day.groups {
                    let Some(first) = group.representative() else { continue };
                    println!(
                        "  {} / {} x{}  avg {}",
                        first.equipment.id(),
                        first.activity.id(),
                        group.len(),
                        format_elapsed(group.average_duration_secs())
                    );
                }
            }
        }
    }

    Ok(())
}
