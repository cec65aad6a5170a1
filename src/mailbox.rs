//! Mailbox-level operations over a [`Transport`].
//!
//! Each method is one IMAP round trip, except [`MailboxSession::delete_and_expunge`]
//! which always pairs a `UID STORE` with an `EXPUNGE`.

use crate::error::MailboxError;
use crate::parser;
use crate::response::Response;
use crate::transport::{command_verb, quote, Transport};
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Server-assigned message identifier.
///
/// Kept as text: UIDs are compared by value and never assumed to fit an
/// integer type or to be contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(String);

impl Uid {
    /// Wraps a UID string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The UID as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for a non-empty run of ASCII digits.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_uid(command: &str, uid: &Uid) -> Result<(), MailboxError> {
    if uid.is_well_formed() {
        Ok(())
    } else {
        Err(MailboxError::protocol(
            command,
            format!("malformed UID {:?}", uid.as_str()),
        ))
    }
}

/// Quotes a mailbox name only when it needs it.
fn mailbox_arg(name: &str) -> String {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, '(' | ')' | '{' | '"' | '\\' | '%' | '*'))
    {
        name.to_string()
    } else {
        quote(name)
    }
}

/// Mailbox operations on an exclusively owned transport.
#[derive(Debug)]
pub struct MailboxSession<T> {
    transport: T,
}

impl<T: Transport> MailboxSession<T> {
    /// Wraps a transport. The transport is not opened here.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, for open/close.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Unwraps the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Issues `SELECT <name>`.
    ///
    /// # Errors
    ///
    /// Transport failures, or [`MailboxError::Protocol`] when the server refuses.
    #[instrument(name = "mailbox::select", skip(self))]
    pub async fn select_mailbox(&mut self, name: &str) -> Result<(), MailboxError> {
        let response = self
            .transport
            .execute(&format!("SELECT {}", mailbox_arg(name)))
            .await?;

        if !response.is_ok() {
            return Err(MailboxError::protocol("SELECT", response.header()));
        }

        debug!("Mailbox selected");
        Ok(())
    }

    /// Issues `UID SEARCH FROM "<sender>"` and returns the UIDs in server order.
    ///
    /// # Errors
    ///
    /// Transport failures, a non-OK completion, or a malformed UID in the result.
    #[instrument(name = "mailbox::search_from", skip(self))]
    pub async fn search_from(&mut self, sender: &str) -> Result<Vec<Uid>, MailboxError> {
        let response = self
            .transport
            .execute(&format!("UID SEARCH FROM {}", quote(sender)))
            .await?;

        if !response.is_ok() {
            return Err(MailboxError::protocol("UID SEARCH", response.header()));
        }

        let uids = parser::parse_search_uids(response.body());
        for uid in &uids {
            check_uid("UID SEARCH", uid)?;
            debug!(uid = %uid, "Found message");
        }

        debug!(uid_count = uids.len(), "Search completed");
        Ok(uids)
    }

    /// Issues `UID FETCH <uid> INTERNALDATE`.
    ///
    /// # Errors
    ///
    /// Transport failures or a malformed `uid`. A non-OK completion is
    /// returned as a response and only logged.
    #[instrument(name = "mailbox::fetch_internal_date", skip(self), fields(uid = %uid))]
    pub async fn fetch_internal_date(&mut self, uid: &Uid) -> Result<Response, MailboxError> {
        check_uid("UID FETCH", uid)?;
        self.fetch(&format!("UID FETCH {uid} INTERNALDATE")).await
    }

    /// Issues `UID FETCH <uid> BODY[]` or `UID FETCH <uid> BODY[<part>]`.
    ///
    /// # Errors
    ///
    /// Transport failures or a malformed `uid`.
    #[instrument(name = "mailbox::fetch_body", skip(self), fields(uid = %uid))]
    pub async fn fetch_body(
        &mut self,
        uid: &Uid,
        part: Option<u32>,
    ) -> Result<Response, MailboxError> {
        check_uid("UID FETCH", uid)?;
        let section = part.map(|p| p.to_string()).unwrap_or_default();
        self.fetch(&format!("UID FETCH {uid} BODY[{section}]")).await
    }

    async fn fetch(&mut self, command: &str) -> Result<Response, MailboxError> {
        let response = self.transport.execute(command).await?;
        if !response.is_ok() {
            warn!(
                command = %command_verb(command),
                status = %response.status(),
                header = %response.header(),
                "Fetch did not complete OK"
            );
        }
        Ok(response)
    }

    /// Flags `uids` as deleted and expunges the mailbox.
    ///
    /// Issues one `UID STORE <u1,u2,...> +FLAGS (\Deleted)` followed by one
    /// `EXPUNGE`. The expunge runs even when the store completes NO or BAD.
    /// An empty slice issues nothing.
    ///
    /// # Errors
    ///
    /// Transport failures, malformed UIDs (checked before any command), or a
    /// non-OK `EXPUNGE`.
    #[instrument(name = "mailbox::delete_and_expunge", skip(self, uids), fields(uid_count = uids.len()))]
    pub async fn delete_and_expunge(&mut self, uids: &[Uid]) -> Result<(), MailboxError> {
        if uids.is_empty() {
            return Ok(());
        }
        for uid in uids {
            check_uid("UID STORE", uid)?;
        }

        let set = uids
            .iter()
            .map(Uid::as_str)
            .collect::<Vec<_>>()
            .join(",");

        debug!(uids = %set, "Deleting messages");

        let store = self
            .transport
            .execute(&format!("UID STORE {set} +FLAGS (\\Deleted)"))
            .await?;
        if !store.is_ok() {
            warn!(
                status = %store.status(),
                header = %store.header(),
                "Store did not complete OK, expunging anyway"
            );
        }

        let expunge = self.transport.execute("EXPUNGE").await?;
        if !expunge.is_ok() {
            return Err(MailboxError::protocol("EXPUNGE", expunge.header()));
        }

        info!(uids = %set, "Deleted messages and expunged mailbox");
        Ok(())
    }

    /// Sends an arbitrary command and returns the raw response.
    ///
    /// # Errors
    ///
    /// Transport failures only.
    pub async fn raw(&mut self, command: &str) -> Result<Response, MailboxError> {
        Ok(self.transport.execute(command).await?)
    }
}
