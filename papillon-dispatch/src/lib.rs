//! Rate-limited bulk dispatch.
//!
//! The [`Dispatcher`] pulls personalised messages from a [`RecipientFeed`],
//! asks the [`QuotaTracker`] when it may send, hands each message to a
//! [`Transmitter`] and, when a [`SentFolder`] is configured, files a copy of
//! every accepted message in the account's sent mailbox.
//!
//! One recipient failing never stops the run. Only failures that make every
//! further attempt pointless (the feed breaking, credentials being refused)
//! abort it, and even then a partial [`DispatchReport`] is returned.

pub mod cancel;
pub mod clock;
pub mod engine;
pub mod error;
pub mod feed;
pub mod mailbox;
pub mod quota;
pub mod replicate;
pub mod report;
pub mod transmit;

pub use cancel::{CancelHandle, CancelSignal};
pub use clock::{Clock, TokioClock};
pub use engine::Dispatcher;
pub use error::{FatalDispatchError, FeedError, ReplicationError, TransmissionError};
pub use feed::{Contact, FieldValue, PersonalizedFeed, RecipientFeed, Template};
pub use mailbox::{MailboxTree, Resolution, resolve};
pub use quota::{Admission, QuotaTracker};
pub use replicate::{ImapSentFolder, SavedTo, SentFolder};
pub use report::{
    DispatchOutcome, DispatchReport, ProgressEvent, ReplicationOutcome, UnreadableEntry,
};
pub use transmit::{SmtpTransmitter, Transmission, Transmitter};
