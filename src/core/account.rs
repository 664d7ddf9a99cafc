use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment-network identifier of a counterparty.
///
/// This is the opaque user id the payment service assigns, not the
/// human-facing handle. A roster entry only carries one once its handle
/// has been resolved against the payment gateway.
///
/// # Examples
///
/// ```
/// use tuition_billing::core::account::AccountId;
///
/// let alice = AccountId::new("2541220786958336077");
/// let bob = AccountId::new("1929137830674432348");
/// assert_ne!(alice, bob);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this account id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_equality() {
        let a = AccountId::new("123");
        let b = AccountId::new("123");
        let c = AccountId::new("456");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_account_display() {
        let id = AccountId::from("987654");
        assert_eq!(format!("{}", id), "987654");
        assert_eq!(id.as_str(), "987654");
    }
}
