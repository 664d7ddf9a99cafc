use crate::core::payment::{LatePayment, PendingPayment};

/// Escalate overdue tuition requests into late fees.
///
/// Only pending requests whose memo carries the billing tag and not the
/// late-payment tag qualify, so a request that already is a late fee is
/// never escalated again. Input order is preserved.
pub fn derive_late_payments(pending: &[PendingPayment]) -> Vec<LatePayment> {
    pending
        .iter()
        .filter(|p| p.is_overdue_tuition())
        .map(LatePayment::from_pending)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::AccountId;
    use crate::core::payment::LATE_FEE;

    fn pending(id: &str, memo: &str) -> PendingPayment {
        PendingPayment {
            memo: memo.to_string(),
            counterparty_id: AccountId::new(id),
            counterparty_handle: format!("user{}", id),
            counterparty_name: format!("User {}", id),
        }
    }

    #[test]
    fn test_tuition_request_is_escalated() {
        let late = derive_late_payments(&[pending(
            "1",
            "Tribe tuition for the month of April— Sent by",
        )]);
        assert_eq!(late.len(), 1);
        assert!(late[0].memo().starts_with("Late payment for: Tribe tuition"));
        assert_eq!(late[0].amount(), LATE_FEE);
        assert_eq!(late[0].handle(), "user1");
        assert_eq!(late[0].name(), "User 1");
    }

    #[test]
    fn test_already_late_is_not_escalated() {
        let late = derive_late_payments(&[pending(
            "1",
            "Late payment for: Tribe tuition for the month of April",
        )]);
        assert!(late.is_empty());
    }

    #[test]
    fn test_unrelated_requests_ignored_and_order_kept() {
        let input = vec![
            pending("1", "Tribe tuition for the month of May— Sent by 👹"),
            pending("2", "concert tickets"),
            pending("3", "Tribe tuition for the month of June— Sent by 👹"),
        ];
        let late = derive_late_payments(&input);
        let ids: Vec<&str> = late.iter().map(|l| l.account_id().as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let first = derive_late_payments(&[pending("1", "Tribe tuition for the month of July")]);
        let reissued: Vec<PendingPayment> = first
            .iter()
            .map(|l| pending(l.account_id().as_str(), l.memo()))
            .collect();
        assert!(derive_late_payments(&reissued).is_empty());
    }
}
