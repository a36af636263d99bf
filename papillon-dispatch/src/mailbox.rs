//! Sent-mailbox discovery.
//!
//! Providers name the sent mailbox differently and often nest it under
//! `INBOX` or a provider prefix. [`resolve`] tries the configured label and
//! then a table of well-known names against the account's mailbox tree.

use std::collections::BTreeMap;

use papillon_imap::ListedMailbox;

/// Well-known sent-mailbox names, tried in order after the configured label.
/// `/` separates hierarchy levels whatever delimiter the server uses.
pub const SENT_FALLBACKS: &[&str] = &[
    "Sent",
    "Sent Items",
    "Sent Messages",
    "Sent Mail",
    "sent",
    "SENT",
    "INBOX/Sent",
    "INBOX/Sent Items",
    "INBOX/Sent Messages",
    "INBOX.Sent",
    "[Gmail]/Sent Mail",
    "[Google Mail]/Sent Mail",
    "Gesendet",
    "Gesendete Elemente",
    "Envoyés",
    "Elementos enviados",
    "Posta inviata",
];

/// Result of looking up a sent mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Full mailbox name, joined with the server's delimiter.
    Resolved(String),
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Node {
    selectable: bool,
    children: BTreeMap<String, Node>,
}

/// The account's mailbox hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxTree {
    root: BTreeMap<String, Node>,
    delimiter: Option<char>,
}

impl MailboxTree {
    #[must_use]
    pub fn new(delimiter: Option<char>) -> Self {
        Self {
            root: BTreeMap::new(),
            delimiter,
        }
    }

    /// Builds the tree from a `LIST` reply. Parents that were not listed
    /// themselves exist only as path segments.
    #[must_use]
    pub fn from_listing(listing: &[ListedMailbox]) -> Self {
        let delimiter = listing.iter().find_map(|mailbox| mailbox.delimiter);
        let mut tree = Self::new(delimiter);

        for mailbox in listing {
            let segments: Vec<&str> = match mailbox.delimiter {
                Some(delimiter) => mailbox.name.split(delimiter).collect(),
                None => vec![mailbox.name.as_str()],
            };
            tree.insert(&segments, mailbox.is_selectable());
        }

        tree
    }

    /// Adds a mailbox by its path segments.
    pub fn insert(&mut self, segments: &[&str], selectable: bool) {
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut level = &mut self.root;
        for segment in parents {
            level = &mut level.entry((*segment).to_string()).or_default().children;
        }
        let node = level.entry((*last).to_string()).or_default();
        node.selectable |= selectable;
    }

    #[must_use]
    pub const fn delimiter(&self) -> Option<char> {
        self.delimiter
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Walks `candidate` segment by segment, returning the joined name when
    /// every segment exists and the last one can hold messages.
    fn lookup(&self, candidate: &str) -> Option<String> {
        let delimiter = self.delimiter.unwrap_or('/');
        let segments: Vec<&str> = candidate
            .split(|c| c == '/' || c == delimiter)
            .collect();

        let (last, parents) = segments.split_last()?;
        let mut level = &self.root;
        for segment in parents {
            level = &level.get(*segment)?.children;
        }

        let separator = delimiter.to_string();
        level
            .get(*last)
            .filter(|node| node.selectable)
            .map(|_| segments.join(separator.as_str()))
    }
}

/// Finds the mailbox to file sent messages in.
///
/// `label` is tried first, then [`SENT_FALLBACKS`], each candidate once. The
/// first candidate whose full path exists wins.
#[must_use]
pub fn resolve(label: &str, tree: &MailboxTree) -> Resolution {
    let label = label.trim();
    let candidates = std::iter::once(label)
        .filter(|label| !label.is_empty())
        .chain(SENT_FALLBACKS.iter().copied().filter(|fallback| *fallback != label));

    for candidate in candidates {
        if let Some(name) = tree.lookup(candidate) {
            tracing::debug!(label, candidate, mailbox = %name, "Resolved sent mailbox");
            return Resolution::Resolved(name);
        }
    }

    tracing::debug!(label, "No sent mailbox matched");
    Resolution::NotFound
}
