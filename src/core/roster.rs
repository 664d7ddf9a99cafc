use crate::core::account::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Column holding the payment-network username.
pub const COLUMN_USERNAME: &str = "username";
/// Column holding the amount owed this cycle.
pub const COLUMN_TUITION: &str = "tuition";
/// Column holding the membership status.
pub const COLUMN_STATUS: &str = "status";
/// Column holding the display name.
pub const COLUMN_NAME: &str = "name";

/// Every column a roster row must carry, in spreadsheet order.
pub const REQUIRED_COLUMNS: [&str; 4] = [COLUMN_USERNAME, COLUMN_TUITION, COLUMN_STATUS, COLUMN_NAME];

/// One spreadsheet row as header -> cell text.
pub type RosterRow = HashMap<String, String>;

/// Membership status of a roster entry.
///
/// Only the exact text `ACTIVE` makes an entry billable. Any other value
/// is kept verbatim so the report shows what the spreadsheet said.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    Active,
    Inactive,
    Other(String),
}

impl MemberStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, MemberStatus::Active)
    }

    pub fn as_str(&self) -> &str {
        match self {
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Inactive => "INACTIVE",
            MemberStatus::Other(raw) => raw,
        }
    }
}

impl From<&str> for MemberStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "ACTIVE" => MemberStatus::Active,
            "INACTIVE" => MemberStatus::Inactive,
            other => MemberStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column whose cell could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidColumn {
    pub column: String,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for InvalidColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?} ({})", self.column, self.value, self.reason)
    }
}

/// A roster row that does not describe a billable person.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("roster row {row}: {}", describe(.missing, .invalid))]
pub struct ParseError {
    /// 1-based spreadsheet row number (the header is row 1).
    pub row: usize,
    pub missing: Vec<String>,
    pub invalid: Vec<InvalidColumn>,
}

fn describe(missing: &[String], invalid: &[InvalidColumn]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing columns [{}]", missing.join(", ")));
    }
    if !invalid.is_empty() {
        let cols: Vec<String> = invalid.iter().map(|c| c.to_string()).collect();
        parts.push(format!("invalid columns [{}]", cols.join(", ")));
    }
    parts.join("; ")
}

/// A person who owes tuition this cycle.
///
/// Identity is the handle. The account id is absent when the handle did
/// not resolve on the payment network; such entries are never billed.
/// Neither are entries built from a row that failed to parse.
///
/// # Examples
///
/// ```
/// use tuition_billing::core::roster::{MemberStatus, RosterEntry};
/// use tuition_billing::core::account::AccountId;
/// use rust_decimal_macros::dec;
///
/// let entry = RosterEntry::new("Ada", "ada", dec!(50), MemberStatus::Active)
///     .with_account_id(Some(AccountId::new("1")));
/// assert!(entry.is_billable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    name: String,
    handle: String,
    account_id: Option<AccountId>,
    amount_due: Decimal,
    status: MemberStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    problem: Option<String>,
}

/// Trimmed, non-blank cell text.
fn cell_text(row: &RosterRow, column: &str) -> Option<String> {
    row.get(column)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl RosterEntry {
    pub fn new(
        name: impl Into<String>,
        handle: impl Into<String>,
        amount_due: Decimal,
        status: MemberStatus,
    ) -> Self {
        Self {
            name: name.into(),
            handle: handle.into(),
            account_id: None,
            amount_due,
            status,
            problem: None,
        }
    }

    /// Attach the result of resolving the handle on the payment network.
    pub fn with_account_id(mut self, account_id: Option<AccountId>) -> Self {
        self.account_id = account_id;
        self
    }

    /// Build an entry from a spreadsheet row.
    ///
    /// Every missing and every invalid column is reported at once. A
    /// blank cell counts as missing. Tuition is only required for
    /// `ACTIVE` rows; other rows default to zero when it is blank or
    /// unreadable.
    pub fn from_row(row_number: usize, row: &RosterRow) -> Result<Self, ParseError> {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        let mut cell = |column: &str| -> Option<String> {
            let value = cell_text(row, column);
            if value.is_none() {
                missing.push(column.to_string());
            }
            value
        };

        let username = cell(COLUMN_USERNAME);
        let status = cell(COLUMN_STATUS).map(|raw| MemberStatus::from(raw.as_str()));
        let name = cell(COLUMN_NAME);

        // An unknown status is checked as strictly as an active one.
        let amount_due = if status.as_ref().map_or(true, MemberStatus::is_active) {
            cell(COLUMN_TUITION).and_then(|raw| match parse_amount(&raw) {
                Ok(amount) => Some(amount),
                Err(reason) => {
                    invalid.push(InvalidColumn {
                        column: COLUMN_TUITION.to_string(),
                        value: raw,
                        reason,
                    });
                    None
                }
            })
        } else {
            Some(
                cell_text(row, COLUMN_TUITION)
                    .and_then(|raw| parse_amount(&raw).ok())
                    .unwrap_or(Decimal::ZERO),
            )
        };

        match (username, amount_due, status, name) {
            (Some(username), Some(amount_due), Some(status), Some(name))
                if missing.is_empty() && invalid.is_empty() =>
            {
                Ok(Self::new(
                    name,
                    username.trim_start_matches('@'),
                    amount_due,
                    status,
                ))
            }
            _ => Err(ParseError {
                row: row_number,
                missing,
                invalid,
            }),
        }
    }

    /// Stand-in for a row that failed to parse.
    ///
    /// Keeps whatever name, handle and status the row has so the report
    /// can point at it. It has no account id and is never billable.
    pub fn malformed(row: &RosterRow, error: &ParseError) -> Self {
        let name = cell_text(row, COLUMN_NAME).unwrap_or_else(|| format!("row {}", error.row));
        let handle = cell_text(row, COLUMN_USERNAME).unwrap_or_default();
        let status = cell_text(row, COLUMN_STATUS).unwrap_or_else(|| "MISSING".to_string());
        Self {
            name,
            handle: handle.trim_start_matches('@').to_string(),
            account_id: None,
            amount_due: Decimal::ZERO,
            status: MemberStatus::from(status.as_str()),
            problem: Some(error.to_string()),
        }
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn account_id(&self) -> Option<&AccountId> {
        self.account_id.as_ref()
    }

    pub fn amount_due(&self) -> Decimal {
        self.amount_due
    }

    pub fn status(&self) -> &MemberStatus {
        &self.status
    }

    /// Why the source row could not be parsed, if it could not.
    pub fn problem(&self) -> Option<&str> {
        self.problem.as_deref()
    }

    pub fn is_malformed(&self) -> bool {
        self.problem.is_some()
    }

    /// Active, parsed and resolved on the payment network.
    pub fn is_billable(&self) -> bool {
        self.status.is_active() && self.account_id.is_some() && self.problem.is_none()
    }
}

/// Parse a tuition cell such as `50`, `50.00` or `$1,200.50`.
///
/// A comma is only accepted as a thousands separator; `50,00` is
/// rejected rather than read as 5000.
fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ' ')).collect();
    let cleaned = strip_thousands_separators(&cleaned)?;
    let amount = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| "not a decimal amount".to_string())?;
    if amount <= Decimal::ZERO {
        return Err(format!("amount must be positive, got {}", amount));
    }
    Ok(amount.normalize())
}

/// Remove commas that group the integer part in threes.
fn strip_thousands_separators(text: &str) -> Result<String, String> {
    if !text.contains(',') {
        return Ok(text.to_string());
    }
    let (integer, fraction) = text.split_once('.').unwrap_or((text, ""));
    let digits = integer.strip_prefix('-').unwrap_or(integer);
    let all_digits = |group: &str| !group.is_empty() && group.chars().all(|c| c.is_ascii_digit());

    let mut groups = digits.split(',');
    let leading_ok = groups
        .next()
        .map_or(false, |first| first.len() <= 3 && all_digits(first));
    let grouped = leading_ok && groups.all(|g| g.len() == 3 && all_digits(g));
    if !grouped || fraction.contains(',') {
        return Err("comma is not a thousands separator".to_string());
    }
    Ok(text.replace(',', ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(pairs: &[(&str, &str)]) -> RosterRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_complete_row() {
        let r = row(&[
            ("username", "ada-l"),
            ("tuition", "50"),
            ("status", "ACTIVE"),
            ("name", "Ada Lovelace"),
        ]);
        let entry = RosterEntry::from_row(2, &r).unwrap();
        assert_eq!(entry.name(), "Ada Lovelace");
        assert_eq!(entry.handle(), "ada-l");
        assert_eq!(entry.amount_due(), dec!(50));
        assert_eq!(entry.status(), &MemberStatus::Active);
        assert!(entry.account_id().is_none());
        assert!(!entry.is_billable());
    }

    #[test]
    fn test_parse_strips_currency_formatting() {
        let r = row(&[
            ("username", "@grace"),
            ("tuition", "$1,200.50"),
            ("status", "INACTIVE"),
            ("name", "Grace"),
        ]);
        let entry = RosterEntry::from_row(3, &r).unwrap();
        assert_eq!(entry.handle(), "grace");
        assert_eq!(entry.amount_due(), dec!(1200.5));
        assert_eq!(entry.status(), &MemberStatus::Inactive);
    }

    #[test]
    fn test_parse_reports_every_problem() {
        let r = row(&[("username", "  "), ("tuition", "lots"), ("status", "ACTIVE")]);
        let err = RosterEntry::from_row(4, &r).unwrap_err();
        assert_eq!(err.row, 4);
        assert_eq!(err.missing, vec!["username".to_string(), "name".to_string()]);
        assert_eq!(err.invalid.len(), 1);
        assert_eq!(err.invalid[0].column, "tuition");

        let msg = err.to_string();
        assert!(msg.contains("roster row 4"));
        assert!(msg.contains("missing columns [username, name]"));
        assert!(msg.contains("tuition=\"lots\""));
    }

    #[test]
    fn test_parse_rejects_non_positive_amount() {
        let r = row(&[
            ("username", "x"),
            ("tuition", "0"),
            ("status", "ACTIVE"),
            ("name", "X"),
        ]);
        let err = RosterEntry::from_row(5, &r).unwrap_err();
        assert!(err.missing.is_empty());
        assert!(err.invalid[0].reason.contains("positive"));
    }

    #[test]
    fn test_unknown_status_is_kept_verbatim() {
        let status = MemberStatus::from("PAUSED");
        assert!(!status.is_active());
        assert_eq!(status.to_string(), "PAUSED");
        assert!(!MemberStatus::from("active").is_active());
    }

    #[test]
    fn test_billable_requires_account_and_active() {
        let entry = RosterEntry::new("B", "b", dec!(10), MemberStatus::Inactive)
            .with_account_id(Some(AccountId::new("9")));
        assert!(!entry.is_billable());
    }

    #[test]
    fn test_decimal_comma_is_rejected() {
        let r = row(&[
            ("username", "eve"),
            ("tuition", "50,00"),
            ("status", "ACTIVE"),
            ("name", "Eve"),
        ]);
        let err = RosterEntry::from_row(6, &r).unwrap_err();
        assert!(err.missing.is_empty());
        assert_eq!(err.invalid.len(), 1);
        assert_eq!(err.invalid[0].value, "50,00");
        assert!(err.invalid[0].reason.contains("thousands separator"));
    }

    #[test]
    fn test_thousands_grouping() {
        assert_eq!(parse_amount("1,200.50"), Ok(dec!(1200.5)));
        assert_eq!(parse_amount("$12,345,678"), Ok(dec!(12345678)));
        assert!(parse_amount("1,2000").is_err());
        assert!(parse_amount(",500").is_err());
        assert!(parse_amount("1.200,50").is_err());
    }

    #[test]
    fn test_inactive_row_needs_no_tuition() {
        for tuition in ["", "0", "n/a"] {
            let r = row(&[
                ("username", "old"),
                ("tuition", tuition),
                ("status", "INACTIVE"),
                ("name", "Old Timer"),
            ]);
            let entry = RosterEntry::from_row(7, &r).unwrap();
            assert_eq!(entry.amount_due(), Decimal::ZERO);
            assert_eq!(entry.status(), &MemberStatus::Inactive);
        }
    }

    #[test]
    fn test_malformed_entry_keeps_what_the_row_has() {
        let r = row(&[("username", "@bob"), ("tuition", "fifty"), ("status", "ACTIVE")]);
        let err = RosterEntry::from_row(8, &r).unwrap_err();
        let entry = RosterEntry::malformed(&r, &err);

        assert_eq!(entry.name(), "row 8");
        assert_eq!(entry.handle(), "bob");
        assert_eq!(entry.status(), &MemberStatus::Active);
        assert!(entry.is_malformed());
        assert!(entry.problem().unwrap().contains("roster row 8"));

        let resolved = entry.with_account_id(Some(AccountId::new("2")));
        assert!(!resolved.is_billable());
    }

    #[test]
    fn test_malformed_entry_without_status() {
        let r = row(&[("name", "Nameless")]);
        let err = RosterEntry::from_row(9, &r).unwrap_err();
        let entry = RosterEntry::malformed(&r, &err);
        assert_eq!(entry.name(), "Nameless");
        assert_eq!(entry.handle(), "");
        assert_eq!(entry.status().to_string(), "MISSING");
    }
}
