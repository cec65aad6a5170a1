//! The result of one command round trip.

use std::fmt;

/// Completion status of a tagged IMAP command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `OK`: the command succeeded.
    Ok,
    /// `NO`: the command failed.
    No,
    /// `BAD`: the command was not understood.
    Bad,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::No => write!(f, "NO"),
            Status::Bad => write!(f, "BAD"),
        }
    }
}

/// Server output for a single command.
///
/// `header` is the completion status and its text. `body` holds the raw
/// untagged data lines in arrival order, with literals inlined verbatim.
/// Every command produces a fresh `Response`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Status,
    header: String,
    body: String,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(status: Status, header: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            header: header.into(),
            body: body.into(),
        }
    }

    /// Completion status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns `true` for an `OK` completion.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// The completion line, e.g. `OK FETCH completed`.
    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Untagged server data.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}
