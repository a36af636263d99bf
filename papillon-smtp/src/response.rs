//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// Represents a single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// Represents a complete SMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` if this response indicates success (2xx code).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` if this response asks for more input (3xx code).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Returns `true` if this response indicates a temporary error (4xx code).
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// Returns `true` if this response indicates a permanent error (5xx code).
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Passes 2xx responses through and turns everything else into
    /// [`ClientError::SmtpError`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SmtpError` for any non-2xx response.
    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// Passes 3xx responses through (DATA, AUTH continuations).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SmtpError` for any non-3xx response.
    pub fn ensure_intermediate(self) -> Result<Self> {
        if self.is_intermediate() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    #[must_use]
    pub fn into_error(self) -> ClientError {
        ClientError::SmtpError {
            code: self.code,
            message: self.message(),
        }
    }

    /// Parses a single response line (without the trailing CRLF).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code_str = line.get(..3).ok_or_else(|| {
            ClientError::ParseError(format!("Response line too short: '{line}'"))
        })?;

        let code = code_str
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{code_str}'")))?;

        let is_last = match line[3..].chars().next() {
            Some(' ') | None => true,
            Some('-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Folds parsed lines into a response, checking that every line carries
    /// the same code.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` on an empty input or a code mismatch.
    pub fn from_lines(lines: Vec<ResponseLine>) -> Result<Self> {
        let code = lines
            .first()
            .map(|line| line.code)
            .ok_or_else(|| ClientError::ParseError("Empty response".to_string()))?;

        if let Some(line) = lines.iter().find(|line| line.code != code) {
            return Err(ClientError::ParseError(format!(
                "Status code mismatch in multi-line response: expected {code}, got {}",
                line.code
            )));
        }

        Ok(Self::new(
            code,
            lines.into_iter().map(|line| line.message).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line() {
        let line = ResponseLine {
            code: 220,
            is_last: true,
            message: "mail.example.com ESMTP".to_string(),
        };
        assert_eq!(
            Response::parse_line("220 mail.example.com ESMTP").unwrap(),
            line
        );
    }

    #[test]
    fn test_parse_multi_line_indicator() {
        let parsed = Response::parse_line("250-mail.example.com").unwrap();
        assert_eq!(parsed.code, 250);
        assert!(!parsed.is_last);
    }

    #[test]
    fn test_parse_bare_code() {
        let parsed = Response::parse_line("250").unwrap();
        assert!(parsed.is_last);
        assert!(parsed.message.is_empty());
    }

    #[test]
    fn test_parse_invalid_separator() {
        assert!(Response::parse_line("250*oops").is_err());
        assert!(Response::parse_line("25").is_err());
        assert!(Response::parse_line("abc hello").is_err());
    }

    #[test]
    fn test_from_lines_code_mismatch() {
        let lines = vec![
            Response::parse_line("250-first").unwrap(),
            Response::parse_line("251 second").unwrap(),
        ];
        assert!(Response::from_lines(lines).is_err());
    }

    #[test]
    fn test_ensure_success() {
        assert!(Response::new(250, vec!["OK".to_string()]).ensure_success().is_ok());

        let err = Response::new(550, vec!["No such user".to_string()])
            .ensure_success()
            .unwrap_err();
        assert_eq!(err.code(), Some(550));
        assert_eq!(err.to_string(), "SMTP error: 550 - No such user");
    }

    #[test]
    fn test_classification() {
        assert!(Response::new(354, vec![]).is_intermediate());
        assert!(Response::new(421, vec![]).is_temporary_error());
        assert!(Response::new(554, vec![]).is_permanent_error());
    }
}
