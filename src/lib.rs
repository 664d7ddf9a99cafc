//! # tuition-billing
//!
//! Monthly tuition billing over Venmo.
//!
//! Reads the member roster from a spreadsheet, requests each active
//! member's tuition, charges a late fee on requests left unpaid, and mails
//! the treasurer a summary of who was billed and who was skipped.
//!
//! ## Architecture
//!
//! - **core**: Roster entries, pending and late payments, billing cycles
//! - **reconciliation**: Sent/skipped classification, late-fee derivation, reports
//! - **services**: Spreadsheet, payment network, mail and chat collaborators
//! - **config**: Environment-backed run configuration and token storage
//! - **orchestrator**: The billing, late-sweep and credential-refresh runs

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod reconciliation;
pub mod services;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::core::account::AccountId;
    pub use crate::core::cycle::BillingCycle;
    pub use crate::core::payment::{LatePayment, PendingPayment};
    pub use crate::core::roster::{MemberStatus, RosterEntry};
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::{run_late_sweep, run_monthly_billing};
    pub use crate::reconciliation::classify::{Billable, Classification, ReconciliationEngine};
    pub use crate::reconciliation::report::RunSummary;
    pub use crate::services::{Notifier, PaymentGateway, RosterSource};
}
