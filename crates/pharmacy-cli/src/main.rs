//! Pharmacy CLI - a command-line front-end for the pharmacy API.
//!
//! Restores the previous session on startup, then runs one command against
//! the API. Any response that rejects the session logs the user out.

mod app;
mod format;
mod navigator;

use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pharmacy_core::Config;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Log file name prefix inside `log_dir`
const LOG_FILE_PREFIX: &str = "pharmacy.log";

#[derive(Parser)]
#[command(name = "pharmacy", version, about = "Pharmacy account, drug and prescription client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// End the current session
    Logout,
    /// Create a new account
    Register {
        #[arg(long)]
        email: Option<String>,
    },
    /// Show who the current session belongs to
    Whoami,
    /// Profile summary and prescription counts
    Status,
    /// View or edit your profile
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Forgotten-password flow
    #[command(subcommand)]
    ResetPassword(ResetCommand),
    /// Browse the drug catalogue
    #[command(subcommand)]
    Drugs(DrugCommand),
    /// Manage your prescriptions
    #[command(subcommand)]
    Prescriptions(PrescriptionCommand),
}

#[derive(Subcommand)]
enum ProfileCommand {
    Show,
    Update {
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        payment_method: Option<String>,
    },
    /// Change your password
    Password,
}

#[derive(Subcommand)]
enum ResetCommand {
    /// Email a reset token
    Request {
        #[arg(long)]
        email: String,
    },
    /// Set a new password with a reset token
    Confirm {
        #[arg(long)]
        token: String,
    },
}

#[derive(Subcommand)]
enum DrugCommand {
    List {
        /// Use the public catalogue (no login required)
        #[arg(long)]
        public: bool,
    },
    Search { query: String },
    Show { id: i64 },
}

#[derive(Subcommand)]
enum PrescriptionCommand {
    List,
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        drug_id: i64,
        #[arg(long)]
        dosage: String,
        #[arg(long)]
        frequency: String,
        /// Days until the prescription expires
        #[arg(long, default_value_t = 30)]
        valid_days: i64,
    },
    Update {
        id: i64,
        #[arg(long)]
        dosage: Option<String>,
        #[arg(long)]
        frequency: Option<String>,
        #[arg(long)]
        valid_days: Option<i64>,
    },
    Delete {
        id: i64,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

async fn run(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => app.login(email).await,
        Command::Logout => app.logout(),
        Command::Register { email } => app.register(email).await,
        Command::Whoami => app.whoami().await,
        Command::Status => app.status().await,
        Command::Profile(cmd) => match cmd {
            ProfileCommand::Show => app.show_profile().await,
            ProfileCommand::Update {
                address,
                phone,
                payment_method,
            } => app.update_profile(address, phone, payment_method).await,
            ProfileCommand::Password => app.change_password().await,
        },
        Command::ResetPassword(cmd) => match cmd {
            ResetCommand::Request { email } => app.request_password_reset(email).await,
            ResetCommand::Confirm { token } => app.confirm_password_reset(token).await,
        },
        Command::Drugs(cmd) => match cmd {
            DrugCommand::List { public } => app.list_drugs(public).await,
            DrugCommand::Search { query } => app.search_drugs(query).await,
            DrugCommand::Show { id } => app.show_drug(id).await,
        },
        Command::Prescriptions(cmd) => match cmd {
            PrescriptionCommand::List => app.list_prescriptions().await,
            PrescriptionCommand::Show { id } => app.show_prescription(id).await,
            PrescriptionCommand::Create {
                drug_id,
                dosage,
                frequency,
                valid_days,
            } => {
                app.create_prescription(drug_id, dosage, frequency, valid_days)
                    .await
            }
            PrescriptionCommand::Update {
                id,
                dosage,
                frequency,
                valid_days,
            } => app.update_prescription(id, dosage, frequency, valid_days).await,
            PrescriptionCommand::Delete { id } => app.delete_prescription(id).await,
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_tracing(config.log_dir.as_deref());
    info!(base_url = %config.api_base_url, "Pharmacy CLI starting");

    let mut app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&mut app, cli.command).await;
    let evicted = app.was_evicted();
    app.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) if evicted => {
            eprintln!("{}", App::eviction_notice());
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
