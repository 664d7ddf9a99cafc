//! External collaborators.
//!
//! The orchestrator only sees these traits; the HTTP implementations live
//! in the submodules and are wired together in the binary.

pub mod gmail;
pub mod google_auth;
pub mod sheets;
pub mod telegram;
pub mod venmo;

use crate::core::account::AccountId;
use crate::core::payment::PendingPayment;
use crate::core::roster::RosterRow;
use crate::error::{GatewayError, NotifierError, RosterError};
use log::warn;
use rust_decimal::Decimal;
use std::time::Duration;

/// Timeout applied to every outbound HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Tabular store holding the roster.
pub trait RosterSource {
    /// All data rows, header row excluded, in sheet order.
    fn fetch_rows(&self) -> Result<Vec<RosterRow>, RosterError>;
}

/// Peer-payment network.
pub trait PaymentGateway {
    /// Ask `account_id` to pay `amount` with `memo`.
    fn request_payment(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        memo: &str,
    ) -> Result<(), GatewayError>;

    /// Charges issued by us that are still unpaid.
    fn list_pending_payments(&self) -> Result<Vec<PendingPayment>, GatewayError>;

    /// Look up the account behind a username. `None` if no such user.
    fn resolve_account_id(&self, username: &str) -> Result<Option<AccountId>, GatewayError>;
}

/// Somewhere to deliver a run summary.
pub trait Notifier {
    fn send(&self, subject: &str, body: &str) -> Result<(), NotifierError>;
}

/// Sends to every configured channel, trying all of them.
pub struct FanOutNotifier {
    channels: Vec<Box<dyn Notifier>>,
}

impl FanOutNotifier {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Notifier for FanOutNotifier {
    fn send(&self, subject: &str, body: &str) -> Result<(), NotifierError> {
        let mut failed = 0;
        for channel in &self.channels {
            if let Err(e) = channel.send(subject, body) {
                warn!("notification channel failed: {}", e);
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(NotifierError::Partial {
                failed,
                total: self.channels.len(),
            });
        }
        Ok(())
    }
}

/// Build the blocking HTTP client shared by all collaborators.
pub fn http_client() -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
}

/// Status code and body of an unsuccessful response.
pub(crate) fn api_error(response: reqwest::blocking::Response) -> (u16, String) {
    let status = response.status().as_u16();
    (status, response.text().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recording {
        sent: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl Notifier for Recording {
        fn send(&self, subject: &str, _body: &str) -> Result<(), NotifierError> {
            if self.fail {
                return Err(NotifierError::Api {
                    status: 500,
                    message: "down".into(),
                });
            }
            self.sent.borrow_mut().push(subject.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_fan_out_tries_every_channel() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let notifier = FanOutNotifier::new(vec![
            Box::new(Recording { sent: sent.clone(), fail: true }),
            Box::new(Recording { sent: sent.clone(), fail: false }),
        ]);
        let err = notifier.send("April", "body").unwrap_err();
        assert!(matches!(err, NotifierError::Partial { failed: 1, total: 2 }));
        assert_eq!(sent.borrow().as_slice(), ["April".to_string()]);
    }

    #[test]
    fn test_fan_out_empty_is_ok() {
        let notifier = FanOutNotifier::new(Vec::new());
        assert!(notifier.is_empty());
        assert!(notifier.send("s", "b").is_ok());
    }
}
