//! IMAP response line parsing.

use super::error::{ImapError, Result};

/// Completion status of a command or greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
}

impl Status {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// A status line: `A0001 OK LOGIN completed`, or `* OK ready` for untagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedResponse {
    pub tag: String,
    pub status: Status,
    pub text: String,
}

impl TaggedResponse {
    /// Parses `<tag> <status> [text]`. Returns `None` for lines that are not
    /// status lines (untagged data, continuations).
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, ' ');
        let tag = parts.next()?;
        let status = Status::parse(parts.next()?)?;
        let text = parts.next().unwrap_or_default().to_string();

        Some(Self {
            tag: tag.to_string(),
            status,
            text,
        })
    }

    /// Turns anything but `OK` into an error naming `command`.
    ///
    /// # Errors
    ///
    /// Returns `ImapError::No`, `ImapError::Bad` or `ImapError::Bye`.
    pub fn ensure_ok(self, command: &str) -> Result<Self> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self),
            Status::No => Err(ImapError::No {
                command: command.to_string(),
                message: self.text,
            }),
            Status::Bad => Err(ImapError::Bad {
                command: command.to_string(),
                message: self.text,
            }),
            Status::Bye => Err(ImapError::Bye(self.text)),
        }
    }
}

/// One entry of a `LIST` reply, with its name decoded from modified UTF-7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedMailbox {
    pub name: String,
    pub delimiter: Option<char>,
    pub attributes: Vec<String>,
}

impl ListedMailbox {
    /// `\Noselect` / `\NonExistent` mailboxes exist only as hierarchy nodes.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.attributes.iter().any(|attr| {
            attr.eq_ignore_ascii_case("\\Noselect") || attr.eq_ignore_ascii_case("\\NonExistent")
        })
    }
}

/// Parses an untagged `* LIST (<attrs>) <delimiter> <name>` line.
///
/// # Errors
///
/// Returns `ImapError::Parse` when the line is not a well-formed LIST reply.
pub fn parse_list_line(line: &str) -> Result<ListedMailbox> {
    let malformed = || ImapError::Parse(format!("Malformed LIST response: '{line}'"));

    let rest = strip_prefix_ignore_case(line, "* LIST ").ok_or_else(malformed)?;
    let rest = rest.strip_prefix('(').ok_or_else(malformed)?;
    let (attributes, rest) = rest.split_once(')').ok_or_else(malformed)?;
    let attributes = attributes
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let rest = rest.trim_start();
    let (delimiter, rest) = if let Some(rest) = strip_prefix_ignore_case(rest, "NIL") {
        (None, rest)
    } else {
        let (delimiter, rest) = parse_quoted(rest).ok_or_else(malformed)?;
        (delimiter.chars().next(), rest)
    };

    let rest = rest.trim_start();
    let raw_name = if rest.starts_with('"') {
        parse_quoted(rest).ok_or_else(malformed)?.0
    } else {
        rest.trim_end().to_string()
    };
    if raw_name.is_empty() {
        return Err(malformed());
    }

    Ok(ListedMailbox {
        name: utf7_imap::decode_utf7_imap(raw_name),
        delimiter,
        attributes,
    })
}

/// Quotes a string for use as an IMAP `quoted` argument.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Reads a quoted string from the start of `input`, returning its unescaped
/// content and the remainder.
fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let mut chars = input.strip_prefix('"')?.char_indices();
    let mut value = String::new();

    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?.1),
            '"' => return Some((value, &input[index + 2..])),
            _ => value.push(c),
        }
    }
    None
}

fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let head = input.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &input[prefix.len()..])
}
