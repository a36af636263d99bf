//! End-of-run reporting.

use papillon_dispatch::{DispatchOutcome, DispatchReport, ReplicationOutcome};

/// One-line summary, e.g. `Sent 8 of 10 (2 failed)`.
#[must_use]
pub fn headline(report: &DispatchReport) -> String {
    let mut line = format!("Sent {} of {}", report.sent_count(), report.total);

    let mut notes = Vec::new();
    if !report.failed.is_empty() {
        notes.push(format!("{} failed", report.failed.len()));
    }
    if !report.unreadable.is_empty() {
        notes.push(format!("{} unreadable", report.unreadable.len()));
    }
    if !report.not_attempted.is_empty() {
        notes.push(format!("{} not attempted", report.not_attempted.len()));
    }
    let warnings = report.replication_warnings().count();
    if warnings > 0 {
        notes.push(format!("{warnings} not filed in sent mailbox"));
    }
    if !notes.is_empty() {
        line.push_str(&format!(" ({})", notes.join(", ")));
    }

    match &report.outcome {
        DispatchOutcome::Completed => {}
        DispatchOutcome::Cancelled => line.push_str(", cancelled"),
        DispatchOutcome::Aborted(err) => line.push_str(&format!(", aborted: {err}")),
    }

    line
}

/// Logs the headline followed by one line per problem recipient.
pub fn log_summary(report: &DispatchReport) {
    if report.success() {
        tracing::info!("{}", headline(report));
    } else {
        tracing::warn!("{}", headline(report));
    }

    for failed in &report.failed {
        tracing::warn!(recipient = %failed.message.recipient, reason = %failed.reason, "Not delivered");
    }

    for entry in &report.unreadable {
        tracing::warn!(contact = entry.index, reason = %entry.reason, "Contact could not be read");
    }

    for delivered in report.replication_warnings() {
        match &delivered.replication {
            ReplicationOutcome::NotFound => {
                tracing::warn!(recipient = %delivered.recipient, "Delivered, but no sent mailbox was found");
            }
            ReplicationOutcome::Failed(reason) => {
                tracing::warn!(recipient = %delivered.recipient, %reason, "Delivered, but the sent copy was not filed");
            }
            ReplicationOutcome::Skipped | ReplicationOutcome::Saved { .. } => {}
        }
    }

    if !report.not_attempted.is_empty() {
        tracing::info!(
            count = report.not_attempted.len(),
            "Messages left unsent; run again with the remaining contacts to resume"
        );
    }
}
