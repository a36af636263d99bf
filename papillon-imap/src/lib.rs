//! Just enough IMAP4rev1 to file a copy of a sent message:
//! greeting, `LOGIN`, `LIST`, `SELECT`, `APPEND` and `LOGOUT`, over plain
//! TCP or implicit TLS.

mod client;
mod error;
mod response;

pub use client::ImapClient;
pub use error::{ImapError, Result};
pub use response::{ListedMailbox, Status, TaggedResponse, parse_list_line, quote};
