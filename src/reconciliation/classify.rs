use crate::core::account::AccountId;
use crate::core::cycle::BillingCycle;
use crate::core::payment::LatePayment;
use crate::core::roster::{MemberStatus, RosterEntry};
use log::debug;
use rust_decimal::Decimal;
use serde::Serialize;

/// Anything that can be turned into a payment request.
///
/// Roster entries bill their tuition with the cycle memo; late payments
/// bill the flat fee with their own escalation memo.
pub trait Billable {
    fn name(&self) -> &str;
    fn handle(&self) -> &str;
    fn status(&self) -> &MemberStatus;
    fn account_id(&self) -> Option<&AccountId>;
    fn amount(&self) -> Decimal;
    fn memo(&self, cycle: &BillingCycle) -> String;
}

impl Billable for RosterEntry {
    fn name(&self) -> &str {
        RosterEntry::name(self)
    }

    fn handle(&self) -> &str {
        RosterEntry::handle(self)
    }

    fn status(&self) -> &MemberStatus {
        RosterEntry::status(self)
    }

    fn account_id(&self) -> Option<&AccountId> {
        RosterEntry::account_id(self)
    }

    fn amount(&self) -> Decimal {
        self.amount_due()
    }

    fn memo(&self, cycle: &BillingCycle) -> String {
        cycle.tuition_memo()
    }
}

impl Billable for LatePayment {
    fn name(&self) -> &str {
        LatePayment::name(self)
    }

    fn handle(&self) -> &str {
        LatePayment::handle(self)
    }

    fn status(&self) -> &MemberStatus {
        LatePayment::status(self)
    }

    fn account_id(&self) -> Option<&AccountId> {
        Some(LatePayment::account_id(self))
    }

    fn amount(&self) -> Decimal {
        LatePayment::amount(self)
    }

    fn memo(&self, _cycle: &BillingCycle) -> String {
        LatePayment::memo(self).to_string()
    }
}

/// The result of one payment request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome<T> {
    pub entry: T,
    pub succeeded: bool,
}

/// Entries partitioned by what happened to them this run.
///
/// Both buckets keep input order. Every input lands in exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification<T> {
    pub succeeded: Vec<T>,
    pub skipped: Vec<T>,
    /// How many entries reached the gateway.
    pub attempted: usize,
}

impl<T> Classification<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl<T> Default for Classification<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            skipped: Vec::new(),
            attempted: 0,
        }
    }
}

/// The billing reconciliation pass.
///
/// Holds the cycle so every request of a run carries the same memo.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    cycle: BillingCycle,
}

impl ReconciliationEngine {
    pub fn new(cycle: BillingCycle) -> Self {
        Self { cycle }
    }

    pub fn cycle(&self) -> &BillingCycle {
        &self.cycle
    }

    /// Request payment from every billable entry, in input order.
    ///
    /// Entries that are not `ACTIVE` or have no account id are skipped
    /// without calling `attempt`. The others are requested exactly once;
    /// `attempt` returning false is terminal for that entry.
    pub fn classify<T, F>(&self, entries: Vec<T>, mut attempt: F) -> Classification<T>
    where
        T: Billable,
        F: FnMut(&AccountId, Decimal, &str) -> bool,
    {
        let mut result = Classification::default();

        for entry in entries {
            let account_id = match entry.account_id().cloned() {
                Some(id) if entry.status().is_active() => id,
                Some(_) => {
                    debug!("skipping @{}: status {}", entry.handle(), entry.status());
                    result.skipped.push(entry);
                    continue;
                }
                None => {
                    debug!("skipping @{}: no account id", entry.handle());
                    result.skipped.push(entry);
                    continue;
                }
            };

            let memo = entry.memo(&self.cycle);
            let succeeded = attempt(&account_id, entry.amount(), &memo);
            result.attempted += 1;

            let outcome = RequestOutcome { entry, succeeded };
            if outcome.succeeded {
                result.succeeded.push(outcome.entry);
            } else {
                debug!("request to @{} failed", outcome.entry.handle());
                result.skipped.push(outcome.entry);
            }
        }

        result
    }
}
