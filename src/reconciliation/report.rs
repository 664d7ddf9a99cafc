use crate::reconciliation::classify::{Billable, Classification};
use serde::{Deserialize, Serialize};

/// Render the summary mailed after a run.
///
/// The failed section comes first. An empty section has an empty body.
pub fn render_report<T: Billable>(succeeded: &[T], skipped: &[T]) -> String {
    format!(
        "Failed to send Venmo requests to:\n\n{}\n\nSuccessfully sent Venmo requests to:\n\n{}\n",
        bullet_lines(skipped),
        bullet_lines(succeeded),
    )
}

fn bullet_lines<T: Billable>(entries: &[T]) -> String {
    entries
        .iter()
        .map(|e| format!("- {} - @{} (status: {})", e.name(), e.handle(), e.status()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pass/fail tally of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Requests the run meant to send.
    pub expected: usize,
    /// Requests the gateway accepted.
    pub sent: usize,
}

impl RunSummary {
    pub fn from_classification<T>(classification: &Classification<T>) -> Self {
        Self {
            expected: classification.total(),
            sent: classification.succeeded.len(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.sent == self.expected
    }

    /// The line printed for the operator at the end of a run.
    pub fn status_line(&self) -> String {
        if self.is_success() {
            format!(
                "✅ Ran script successfully and sent {} Venmo requests.",
                self.expected
            )
        } else {
            format!(
                "❌ Something went wrong. Only sent {}/{} venmo requests.",
                self.sent, self.expected
            )
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.status_line())
    }
}
