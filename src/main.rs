//! tuition-billing CLI
//!
//! Configuration is read from the environment, seeded from a dotenv file.
//!
//! # Usage
//!
//! ```bash
//! # Request this month's tuition from every active member
//! tuition-billing bill
//!
//! # Charge the late fee on unpaid tuition requests
//! tuition-billing late
//!
//! # Refresh (or re-authorize) the mail token, rewriting the dotenv file
//! tuition-billing --env-file /etc/tribe/billing.env refresh-token
//! ```

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use tuition_billing::config::{
    self, BillingConfig, EmailConfig, EnvFileStore, LateSweepConfig, RefreshConfig, TelegramConfig,
};
use tuition_billing::core::cycle::BillingCycle;
use tuition_billing::error::{GatewayError, Result};
use tuition_billing::orchestrator::{self, RefreshOutcome};
use tuition_billing::reconciliation::report::RunSummary;
use tuition_billing::services::gmail::GmailNotifier;
use tuition_billing::services::sheets::GoogleSheetsRoster;
use tuition_billing::services::telegram::TelegramNotifier;
use tuition_billing::services::venmo::VenmoClient;
use tuition_billing::services::{http_client, FanOutNotifier, Notifier};

#[derive(Debug, Parser)]
#[command(name = "tuition-billing", version, about = "Monthly tuition billing over Venmo")]
struct Cli {
    /// Dotenv file holding the configuration
    #[arg(long, global = true, default_value = config::DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send this month's tuition requests
    Bill,
    /// Charge the late fee on overdue tuition requests
    Late,
    /// Make sure the mail token is usable
    RefreshToken,
}

fn notifier(http: &reqwest::blocking::Client, email: EmailConfig, telegram: Option<TelegramConfig>) -> FanOutNotifier {
    let mut channels: Vec<Box<dyn Notifier>> = vec![Box::new(GmailNotifier::new(
        http.clone(),
        email.token,
        email.recipient,
    ))];
    if let Some(telegram) = telegram {
        channels.push(Box::new(TelegramNotifier::new(
            http.clone(),
            telegram.bot_token,
            telegram.chat_id,
        )));
    }
    FanOutNotifier::new(channels)
}

fn cmd_bill() -> Result<RunSummary> {
    let config = BillingConfig::from_lookup(&config::process_env)?;
    let http = http_client().map_err(GatewayError::from)?;

    let roster = GoogleSheetsRoster::new(http.clone(), config.service_account, config.spreadsheet_key);
    let venmo = VenmoClient::new(http.clone(), config.venmo_access_token);
    let notifier = notifier(&http, config.email, config.telegram);

    orchestrator::run_monthly_billing(&roster, &venmo, &notifier, BillingCycle::at(&Local::now()))
}

fn cmd_late() -> Result<RunSummary> {
    let config = LateSweepConfig::from_lookup(&config::process_env)?;
    let http = http_client().map_err(GatewayError::from)?;

    let venmo = VenmoClient::new(http.clone(), config.venmo_access_token);
    let notifier = notifier(&http, config.email, config.telegram);

    orchestrator::run_late_sweep(&venmo, &notifier, BillingCycle::at(&Local::now()))
}

/// Show the consent URL and read back what the operator pastes.
fn prompt_for_code(url: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    writeln!(stderr, "Please visit this URL to authorize this application: {}", url)?;
    write!(stderr, "Paste the authorization code or the redirect URL: ")?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn cmd_refresh_token(env_file: PathBuf) -> Result<RefreshOutcome> {
    let config = RefreshConfig::from_lookup(&config::process_env)?;
    let http = http_client().map_err(GatewayError::from)?;
    let mut store = EnvFileStore::new(env_file);

    orchestrator::run_credential_refresh(config, &http, &mut store, &mut prompt_for_code, Utc::now())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Bill => println!("{}", cmd_bill()?.status_line()),
        Command::Late => println!("{}", cmd_late()?.status_line()),
        Command::RefreshToken => match cmd_refresh_token(cli.env_file)? {
            RefreshOutcome::StillValid => println!("✅ Token is still valid."),
            RefreshOutcome::Refreshed => println!("✅ Token refreshed and saved."),
            RefreshOutcome::Reauthorized => println!("✅ Token re-authorized and saved."),
        },
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Load first so RUST_LOG may come from the file.
    let loaded = dotenvy::from_path(&cli.env_file);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match loaded {
        Ok(()) => info!("loaded configuration from {}", cli.env_file.display()),
        Err(e) => debug!("no configuration file at {}: {}", cli.env_file.display(), e),
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}
