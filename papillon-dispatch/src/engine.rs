//! The dispatch loop.
//!
//! Messages are pulled from the feed one at a time and sent in feed order.
//! With rate limiting enabled, sends are grouped into batches admitted by the
//! [`QuotaTracker`]; cancellation is honoured at batch boundaries, during the
//! pause between messages and while waiting for quota, never in the middle
//! of a transmission.

use papillon_common::{
    OutboundMessage,
    config::{ConfigError, RateLimitPolicy, ServerCredentials},
};

use crate::{
    cancel::CancelSignal,
    clock::{Clock, TokioClock},
    error::{FatalDispatchError, FeedError, ReplicationError},
    feed::RecipientFeed,
    quota::{Admission, QuotaTracker},
    replicate::SentFolder,
    report::{
        Delivered, DispatchOutcome, DispatchReport, Failed, ProgressEvent, ReplicationOutcome,
        UnreadableEntry,
    },
    transmit::{Transmission, Transmitter},
};

/// Drives a dispatch run against a transmitter and, optionally, a sent
/// folder.
pub struct Dispatcher<T, C = TokioClock> {
    transmitter: T,
    sent_folder: Option<Box<dyn SentFolder>>,
    clock: C,
    cancel: CancelSignal,
}

impl<T: Transmitter> Dispatcher<T> {
    #[must_use]
    pub fn new(transmitter: T) -> Self {
        Self {
            transmitter,
            sent_folder: None,
            clock: TokioClock,
            cancel: CancelSignal::never(),
        }
    }
}

impl<T: Transmitter, C: Clock> Dispatcher<T, C> {
    /// Files a copy of every delivered message in `sent_folder`.
    #[must_use]
    pub fn with_sent_folder(mut self, sent_folder: impl SentFolder + 'static) -> Self {
        self.sent_folder = Some(Box::new(sent_folder));
        self
    }

    #[must_use]
    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Dispatcher<T, C2> {
        Dispatcher {
            transmitter: self.transmitter,
            sent_folder: self.sent_folder,
            clock,
            cancel: self.cancel,
        }
    }

    /// Sends every message of `feed`, calling `on_progress` after each
    /// attempt and before each quota wait.
    ///
    /// Per-recipient failures are recorded in the report and the run goes
    /// on. A feed error or refused credentials abort the run: the messages
    /// not yet attempted are added to `failed`, entries the feed could not
    /// produce to `unreadable`, and the cause is carried in
    /// [`DispatchOutcome::Aborted`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the policy or credentials are unusable.
    /// Nothing is sent in that case.
    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(total = feed.total(), rate_limited = policy.enabled)
    )]
    pub async fn run<F, P>(
        &self,
        credentials: &ServerCredentials,
        policy: &RateLimitPolicy,
        mut feed: F,
        mut on_progress: P,
    ) -> Result<DispatchReport, ConfigError>
    where
        F: RecipientFeed,
        P: FnMut(ProgressEvent) + Send,
    {
        credentials.validate()?;
        policy.validate()?;

        let total = feed.total();
        let mut report = DispatchReport::new(total);
        let mut cancel = self.cancel.clone();
        let delay = policy.delay_between_messages();

        let mut tracker = policy
            .enabled
            .then(|| QuotaTracker::new(policy, self.clock.now()));
        if policy.enabled && total > 0 && (policy.max_per_minute == 0 || policy.max_per_hour == 0) {
            tracing::warn!(
                max_per_minute = policy.max_per_minute,
                max_per_hour = policy.max_per_hour,
                "A send limit is zero; the run will wait until cancelled"
            );
        }

        tracing::info!(total, "Starting dispatch");

        let mut entries = std::iter::from_fn(|| feed.next_message()).enumerate();
        let mut batch_left = 0usize;
        while let Some((index, entry)) = entries.next() {
            let message = match entry {
                Ok(message) => message,
                Err(err) => {
                    tracing::error!(index, %err, "Recipient feed failed, aborting");
                    report.unreadable.push(UnreadableEntry {
                        index,
                        reason: err.to_string(),
                    });
                    let cause = FatalDispatchError::Feed(err);
                    abort(&mut entries, &mut report, &cause);
                    report.outcome = DispatchOutcome::Aborted(cause);
                    break;
                }
            };

            if batch_left == 0 {
                let admitted = if cancel.is_cancelled() {
                    None
                } else if let Some(tracker) = tracker.as_mut() {
                    self.admit(tracker, &mut cancel, &report, &mut on_progress)
                        .await
                } else {
                    Some(1)
                };

                let Some(admitted) = admitted else {
                    stop_cancelled(message, &mut entries, &mut report);
                    break;
                };
                batch_left = admitted;
            }
            batch_left -= 1;

            if policy.enabled && report.completed() > 0 && !delay.is_zero() {
                let cancelled = tokio::select! {
                    () = self.clock.sleep(delay) => false,
                    () = cancel.cancelled() => true,
                };
                if cancelled {
                    stop_cancelled(message, &mut entries, &mut report);
                    break;
                }
            }

            let attempt = self.transmitter.send(credentials, &message).await;
            if let Some(tracker) = tracker.as_mut() {
                tracker.record_send();
            }

            match attempt {
                Ok(Transmission { delivery_id, raw }) => {
                    tracing::info!(recipient = %message.recipient, %delivery_id, "Message sent");
                    let replication = self.replicate(credentials, &message, &raw).await;
                    report.delivered.push(Delivered {
                        recipient: message.recipient,
                        delivery_id,
                        replication,
                    });
                }
                Err(err) if err.is_fatal() => {
                    tracing::error!(recipient = %message.recipient, %err, "Transmission cannot continue, aborting");
                    report.failed.push(Failed {
                        message,
                        reason: err.to_string(),
                    });
                    on_progress(ProgressEvent::Attempted {
                        completed: report.completed(),
                        total,
                    });

                    let cause = FatalDispatchError::Transmission(err);
                    abort(&mut entries, &mut report, &cause);
                    report.outcome = DispatchOutcome::Aborted(cause);
                    break;
                }
                Err(err) => {
                    tracing::warn!(recipient = %message.recipient, %err, "Message failed");
                    report.failed.push(Failed {
                        message,
                        reason: err.to_string(),
                    });
                }
            }

            on_progress(ProgressEvent::Attempted {
                completed: report.completed(),
                total,
            });
        }

        tracing::info!(
            sent = report.sent_count(),
            failed = report.failed.len(),
            not_attempted = report.not_attempted.len(),
            outcome = ?report.outcome,
            "Dispatch finished"
        );

        Ok(report)
    }

    /// Waits until the tracker admits a batch. `None` if cancelled first.
    async fn admit<P>(
        &self,
        tracker: &mut QuotaTracker,
        cancel: &mut CancelSignal,
        report: &DispatchReport,
        on_progress: &mut P,
    ) -> Option<usize>
    where
        P: FnMut(ProgressEvent) + Send,
    {
        loop {
            let remaining = report.total.saturating_sub(report.completed()).max(1);

            match tracker.try_advance(self.clock.now(), remaining) {
                Admission::Proceed(admitted) => return Some(admitted),
                Admission::Wait(wait) => {
                    on_progress(ProgressEvent::Waiting {
                        completed: report.completed(),
                        total: report.total,
                        wait,
                    });
                    tracing::info!(
                        ?wait,
                        minute_count = tracker.minute_count(),
                        hour_count = tracker.hour_count(),
                        "Send quota exhausted, waiting"
                    );

                    tokio::select! {
                        () = self.clock.sleep(wait) => {}
                        () = cancel.cancelled() => return None,
                    }
                }
            }
        }
    }

    async fn replicate(
        &self,
        credentials: &ServerCredentials,
        message: &OutboundMessage,
        raw: &[u8],
    ) -> ReplicationOutcome {
        let Some(sent_folder) = &self.sent_folder else {
            return ReplicationOutcome::Skipped;
        };

        match sent_folder.save_to_sent(credentials, raw).await {
            Ok(saved) => {
                tracing::debug!(recipient = %message.recipient, mailbox = %saved.mailbox, "Saved to sent folder");
                ReplicationOutcome::Saved {
                    mailbox: saved.mailbox,
                }
            }
            Err(ReplicationError::NotFound { label }) => {
                tracing::warn!(recipient = %message.recipient, %label, "No sent folder found, copy not saved");
                ReplicationOutcome::NotFound
            }
            Err(err) => {
                tracing::warn!(recipient = %message.recipient, %err, "Failed to save to sent folder");
                ReplicationOutcome::Failed(err.to_string())
            }
        }
    }
}

/// Marks every message left in the feed as failed because of `cause`.
fn abort<I>(entries: &mut I, report: &mut DispatchReport, cause: &FatalDispatchError)
where
    I: Iterator<Item = (usize, Result<OutboundMessage, FeedError>)>,
{
    let reason = format!("Not attempted, run aborted: {cause}");
    for (index, entry) in entries {
        match entry {
            Ok(message) => report.failed.push(Failed {
                message,
                reason: reason.clone(),
            }),
            Err(err) => report.unreadable.push(UnreadableEntry {
                index,
                reason: err.to_string(),
            }),
        }
    }
}

/// Moves `message` and everything left in the feed to `not_attempted`.
fn stop_cancelled<I>(message: OutboundMessage, entries: &mut I, report: &mut DispatchReport)
where
    I: Iterator<Item = (usize, Result<OutboundMessage, FeedError>)>,
{
    tracing::info!(completed = report.completed(), "Dispatch cancelled");
    report.not_attempted.push(message);
    for (index, entry) in entries {
        match entry {
            Ok(message) => report.not_attempted.push(message),
            Err(err) => {
                tracing::warn!(index, %err, "Unreadable feed entry");
                report.unreadable.push(UnreadableEntry {
                    index,
                    reason: err.to_string(),
                });
            }
        }
    }
    report.outcome = DispatchOutcome::Cancelled;
}
