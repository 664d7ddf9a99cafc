use crate::core::account::AccountId;
use crate::core::roster::MemberStatus;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Memo substring marking a request as part of the tuition cycle.
pub const BILLING_TAG: &str = "Tribe tuition for the month of";

/// Memo prefix marking a request as an escalation of an unpaid one.
pub const LATE_PAYMENT_TAG: &str = "Late payment for:";

/// Flat fee charged for every overdue tuition request.
pub const LATE_FEE: Decimal = dec!(10.0);

/// A charge issued earlier whose outcome is not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPayment {
    pub memo: String,
    pub counterparty_id: AccountId,
    pub counterparty_handle: String,
    pub counterparty_name: String,
}

impl PendingPayment {
    /// Carries the billing tag and has not been escalated yet.
    pub fn is_overdue_tuition(&self) -> bool {
        self.memo.contains(BILLING_TAG) && !self.memo.contains(LATE_PAYMENT_TAG)
    }
}

static LATE_STATUS: MemberStatus = MemberStatus::Active;

/// Late fee derived from an overdue tuition request.
///
/// The memo references the original one so the escalated request is
/// itself recognisable as already late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatePayment {
    account_id: AccountId,
    name: String,
    handle: String,
    amount: Decimal,
    memo: String,
}

impl LatePayment {
    /// Escalate a pending tuition request into a late fee.
    pub fn from_pending(pending: &PendingPayment) -> Self {
        Self {
            account_id: pending.counterparty_id.clone(),
            name: pending.counterparty_name.clone(),
            handle: pending.counterparty_handle.clone(),
            amount: LATE_FEE,
            memo: format!("{} {}", LATE_PAYMENT_TAG, pending.memo),
        }
    }

    // --- Accessors ---

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    /// Late fees are always billable.
    pub fn status(&self) -> &MemberStatus {
        &LATE_STATUS
    }
}
