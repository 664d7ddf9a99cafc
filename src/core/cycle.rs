use crate::core::payment::BILLING_TAG;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The calendar month a run bills for.
///
/// # Examples
///
/// ```
/// use tuition_billing::core::cycle::BillingCycle;
/// use chrono::{TimeZone, Utc};
///
/// let cycle = BillingCycle::at(&Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap());
/// assert_eq!(cycle.month(), "April");
/// assert_eq!(cycle.tuition_memo(), "Tribe tuition for the month of April— Sent by 👹");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingCycle(String);

impl BillingCycle {
    /// Cycle of the month containing `now`, named in full (`%B`).
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(now.format("%B").to_string())
    }

    pub fn month(&self) -> &str {
        &self.0
    }

    /// Memo attached to every tuition request of this cycle.
    pub fn tuition_memo(&self) -> String {
        format!("{} {}— Sent by 👹", BILLING_TAG, self.0)
    }

    /// Subject of the monthly billing summary.
    pub fn billing_subject(&self) -> String {
        format!("{} Venmo summary for Tribe tuition", self.0)
    }

    /// Subject of the late sweep summary.
    pub fn late_subject(&self) -> String {
        format!("{} Venmo summary for LATE Tribe tuition", self.0)
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_month_name() {
        let now = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(BillingCycle::at(&now).month(), "December");
    }

    #[test]
    fn test_subjects() {
        let cycle = BillingCycle::at(&Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());
        assert_eq!(cycle.billing_subject(), "May Venmo summary for Tribe tuition");
        assert_eq!(cycle.late_subject(), "May Venmo summary for LATE Tribe tuition");
    }

    #[test]
    fn test_memo_carries_billing_tag() {
        let cycle = BillingCycle::at(&Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert!(cycle.tuition_memo().contains(BILLING_TAG));
    }
}
