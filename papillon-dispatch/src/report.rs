//! Result of a dispatch run and the progress events emitted along the way.

use std::time::Duration;

use papillon_common::OutboundMessage;
use serde::Serialize;

use crate::error::FatalDispatchError;

/// What happened to the sent-folder copy of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReplicationOutcome {
    /// Replication was not requested for this run.
    Skipped,
    Saved { mailbox: String },
    /// No mailbox matched the label or any fallback.
    NotFound,
    Failed(String),
}

impl ReplicationOutcome {
    /// Whether the caller should surface a warning for this recipient.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::NotFound | Self::Failed(_))
    }
}

/// A message the transmitter accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivered {
    pub recipient: String,
    pub delivery_id: String,
    pub replication: ReplicationOutcome,
}

/// A message that could not be delivered, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failed {
    pub message: OutboundMessage,
    pub reason: String,
}

/// A feed entry that never became a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableEntry {
    /// Position of the entry in the feed, counting from zero.
    pub index: usize,
    pub reason: String,
}

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The feed was exhausted.
    Completed,
    /// The caller cancelled; unsent messages are in `not_attempted`.
    Cancelled,
    /// A fatal error stopped the run; unsent messages are in `failed`.
    Aborted(FatalDispatchError),
}

/// Everything a caller needs to report on, or resume, a run.
///
/// `delivered`, `failed` and `unreadable` keep feed order. Every entry of the
/// feed ends up in exactly one of `delivered`, `failed`, `not_attempted` or
/// `unreadable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub total: usize,
    pub delivered: Vec<Delivered>,
    pub failed: Vec<Failed>,
    pub not_attempted: Vec<OutboundMessage>,
    pub unreadable: Vec<UnreadableEntry>,
    pub outcome: DispatchOutcome,
}

impl DispatchReport {
    pub(crate) const fn new(total: usize) -> Self {
        Self {
            total,
            delivered: Vec::new(),
            failed: Vec::new(),
            not_attempted: Vec::new(),
            unreadable: Vec::new(),
            outcome: DispatchOutcome::Completed,
        }
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.delivered.len()
    }

    /// `true` when every entry read was delivered and the run was not
    /// aborted. A cancelled run can still succeed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed.is_empty()
            && self.unreadable.is_empty()
            && !matches!(self.outcome, DispatchOutcome::Aborted(_))
    }

    #[must_use]
    pub const fn fatal_error(&self) -> Option<&FatalDispatchError> {
        match &self.outcome {
            DispatchOutcome::Aborted(err) => Some(err),
            _ => None,
        }
    }

    /// Delivered recipients whose sent-folder copy needs attention.
    pub fn replication_warnings(&self) -> impl Iterator<Item = &Delivered> {
        self.delivered
            .iter()
            .filter(|delivered| delivered.replication.is_warning())
    }

    /// Messages attempted so far, delivered or failed.
    pub(crate) fn completed(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Progress notification delivered synchronously to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// One more message was attempted.
    Attempted { completed: usize, total: usize },
    /// The run is alive but waiting for quota.
    Waiting {
        completed: usize,
        total: usize,
        wait: Duration,
    },
}

impl ProgressEvent {
    #[must_use]
    pub const fn completed(&self) -> usize {
        match self {
            Self::Attempted { completed, .. } | Self::Waiting { completed, .. } => *completed,
        }
    }

    /// Completion percentage in `0.0..=100.0`. An empty run is complete.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "recipient counts are far below 2^52"
    )]
    pub const fn percent(&self) -> f64 {
        let (Self::Attempted { completed, total } | Self::Waiting { completed, total, .. }) =
            *self;
        if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        }
    }
}
