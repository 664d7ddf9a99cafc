//! The three runs: monthly billing, late sweep and credential refresh.
//!
//! Collaborators are handed in by the caller. Each run is a single
//! sequential pass; nothing here retries.

use crate::config::{encode_blob, keys, ConfigStore, RefreshConfig};
use crate::core::account::AccountId;
use crate::core::cycle::BillingCycle;
use crate::core::roster::RosterEntry;
use crate::error::{CredentialError, Result, RosterError};
use crate::reconciliation::classify::{Billable, Classification, ReconciliationEngine};
use crate::reconciliation::late::derive_late_payments;
use crate::reconciliation::report::{render_report, RunSummary};
use crate::services::google_auth::{InstalledAppFlow, GMAIL_SEND_SCOPE};
use crate::services::{Notifier, PaymentGateway, RosterSource};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use reqwest::blocking::Client;
use rust_decimal::Decimal;

/// Read the roster and resolve every handle on the payment network.
///
/// A row that fails to parse is kept as a malformed entry, with no account
/// id, so it is reported as skipped and never looked up. A handle that does
/// not resolve, or whose lookup fails, also leaves the entry without an
/// account id.
pub fn load_roster(
    source: &dyn RosterSource,
    gateway: &dyn PaymentGateway,
) -> std::result::Result<Vec<RosterEntry>, RosterError> {
    let rows = source.fetch_rows()?;

    Ok(rows
        .iter()
        .enumerate()
        // Row 1 is the header.
        .map(|(i, row)| match RosterEntry::from_row(i + 2, row) {
            Ok(entry) => {
                let account_id = match gateway.resolve_account_id(entry.handle()) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("lookup of @{} failed: {}", entry.handle(), e);
                        None
                    }
                };
                entry.with_account_id(account_id)
            }
            Err(e) => {
                warn!("{}; it will be reported as skipped", e);
                RosterEntry::malformed(row, &e)
            }
        })
        .collect())
}

/// Bind the gateway as the engine's attempt function.
///
/// Any gateway error counts as "not sent".
fn attempt_with(gateway: &dyn PaymentGateway) -> impl FnMut(&AccountId, Decimal, &str) -> bool + '_ {
    move |account_id: &AccountId, amount: Decimal, memo: &str| {
        match gateway.request_payment(account_id, amount, memo) {
            Ok(()) => true,
            Err(e) => {
                warn!("request to account {} failed: {}", account_id, e);
                false
            }
        }
    }
}

/// Mail the report. Failures are logged and otherwise ignored.
fn notify<T: Billable>(notifier: &dyn Notifier, subject: &str, result: &Classification<T>) {
    let body = render_report(&result.succeeded, &result.skipped);
    match notifier.send(subject, &body) {
        Ok(()) => info!("summary {:?} sent", subject),
        Err(e) => error!("An error occurred: {}", e),
    }
}

/// Bill every roster entry for `cycle` and send the summary.
pub fn run_monthly_billing(
    roster: &dyn RosterSource,
    gateway: &dyn PaymentGateway,
    notifier: &dyn Notifier,
    cycle: BillingCycle,
) -> Result<RunSummary> {
    let entries = load_roster(roster, gateway)?;
    info!("billing {} roster entries for {}", entries.len(), cycle);

    let engine = ReconciliationEngine::new(cycle);
    let result = engine.classify(entries, attempt_with(gateway));
    let summary = RunSummary::from_classification(&result);

    notify(notifier, &engine.cycle().billing_subject(), &result);
    Ok(summary)
}

/// Charge the late fee on every overdue tuition request.
pub fn run_late_sweep(
    gateway: &dyn PaymentGateway,
    notifier: &dyn Notifier,
    cycle: BillingCycle,
) -> Result<RunSummary> {
    let pending = gateway.list_pending_payments()?;
    let late = derive_late_payments(&pending);
    info!("{} of {} pending charges are overdue tuition", late.len(), pending.len());

    let engine = ReconciliationEngine::new(cycle);
    let result = engine.classify(late, attempt_with(gateway));
    let summary = RunSummary::from_classification(&result);

    notify(notifier, &engine.cycle().late_subject(), &result);
    Ok(summary)
}

/// What the credential refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The stored token was still good; nothing was written.
    StillValid,
    /// The refresh token produced a new access token.
    Refreshed,
    /// The operator went through the consent screen again.
    Reauthorized,
}

/// Make sure the stored mail token is usable, persisting any new one.
///
/// `authorize` is shown the consent URL and returns what the operator
/// pasted back; it is only called when the token cannot be refreshed.
pub fn run_credential_refresh(
    config: RefreshConfig,
    http: &Client,
    store: &mut dyn ConfigStore,
    authorize: &mut dyn FnMut(&str) -> std::io::Result<String>,
    now: DateTime<Utc>,
) -> Result<RefreshOutcome> {
    let RefreshConfig {
        client_secrets,
        mut token,
    } = config;

    if token.is_valid(now) {
        info!("stored token is valid until {:?}", token.expiry);
        return Ok(RefreshOutcome::StillValid);
    }
    info!("stored token is invalid or expired");

    let outcome = if token.is_expired(now) && token.can_refresh() {
        token.refresh(http, now)?;
        RefreshOutcome::Refreshed
    } else {
        let flow = InstalledAppFlow::new(&client_secrets, &[GMAIL_SEND_SCOPE]);
        let url = flow.authorization_url()?;
        let pasted = authorize(&url).map_err(CredentialError::from)?;
        token = flow.exchange(http, &pasted, now)?;
        RefreshOutcome::Reauthorized
    };

    store.persist(keys::EMAIL_OAUTH_TOKEN, &encode_blob(&token)?)?;
    Ok(outcome)
}
