//! The polling loop.
//!
//! [`PollingEngine`] owns the mailbox session (and through it the transport)
//! and the token sink. Each cycle selects the mailbox, searches for mail from
//! the target sender, scans the results newest first for a recent message
//! carrying a code, hands the first code found to the sink, and deletes the
//! whole batch. Any transport or protocol failure ends the cycle without
//! deleting anything; the engine then closes the session and reconnects.
//!
//! # Example
//!
//! ```no_run
//! use otp_watch::{NullSink, ImapTransport, PollingEngine, WatchConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> otp_watch::Result<()> {
//! let config = WatchConfig::builder()
//!     .host("imap.example.com")
//!     .username("me@example.com")
//!     .password("app-password")
//!     .target_sender("codes@service.example")
//!     .build()?;
//!
//! let transport = ImapTransport::from_config(&config);
//! let mut engine = PollingEngine::new(&config, transport, NullSink)?;
//!
//! let shutdown = CancellationToken::new();
//! engine.run(shutdown).await;
//! # Ok(())
//! # }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::{PollingConfig, WatchConfig};
use crate::delivery::TokenSink;
use crate::error::{DeliveryError, MailboxError, Result};
use crate::extractor::{OtpToken, TokenExtractor};
use crate::mailbox::MailboxSession;
use crate::matcher::Matcher;
use crate::transport::{SessionState, Transport};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not started, or stopped.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Connected; running cycles.
    Polling,
    /// The last cycle failed; the transport has been closed.
    RecoverableFault,
}

/// Outcome of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Messages returned by the search.
    pub found: usize,
    /// Messages whose date was fetched.
    pub inspected: usize,
    /// The code handed to the sink, if any.
    pub token: Option<OtpToken>,
    /// Messages flagged deleted and expunged.
    pub deleted: usize,
}

/// Sink that drops every token. Useful with [`PollingEngine::tick`] when the
/// caller reads tokens from the [`CycleReport`] instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl TokenSink for NullSink {
    async fn deliver(&mut self, _token: &OtpToken) -> std::result::Result<(), DeliveryError> {
        Ok(())
    }
}

/// Sleeps for `duration`; returns `true` if `shutdown` fired first.
async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        () = shutdown.cancelled() => true,
    }
}

/// Polls a mailbox for one-time codes until told to stop.
pub struct PollingEngine<T, S> {
    session: MailboxSession<T>,
    sink: S,
    extractor: TokenExtractor,
    clock: Arc<dyn Clock>,
    mailbox: String,
    target_sender: String,
    body_part: Option<u32>,
    polling: PollingConfig,
    state: EngineState,
}

impl<T: Transport, S: TokenSink> PollingEngine<T, S> {
    /// Creates an idle engine. Nothing connects until [`run`](Self::run) or
    /// [`tick`](Self::tick).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the recency
    /// window does not fit a signed duration.
    pub fn new(config: &WatchConfig, transport: T, sink: S) -> Result<Self> {
        Ok(Self {
            session: MailboxSession::new(transport),
            sink,
            extractor: TokenExtractor::from_config(config)?,
            clock: Arc::new(SystemClock),
            mailbox: config.mailbox.clone(),
            target_sender: config.target_sender().to_string(),
            body_part: config.body_part,
            polling: config.polling.clone(),
            state: EngineState::Idle,
        })
    }

    /// Replaces the wall-clock source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the code matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.extractor = self.extractor.with_matcher(matcher);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The token sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        self.session.transport()
    }

    /// Opens the transport, retrying every `reconnect_backoff` until it works.
    ///
    /// Returns `false` if `shutdown` fired before a connection was made.
    #[instrument(name = "PollingEngine::connect", skip_all)]
    pub async fn connect_with_retry(&mut self, shutdown: &CancellationToken) -> bool {
        self.state = EngineState::Connecting;
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return false;
            }
            attempt += 1;

            let result = tokio::select! {
                result = self.session.transport_mut().open() => result,
                () = shutdown.cancelled() => return false,
            };

            match result {
                Ok(()) => {
                    info!(attempt, "Session ready");
                    self.state = EngineState::Polling;
                    return true;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        category = %e.category(),
                        retryable = e.is_retryable(),
                        "Connection failed, retrying"
                    );
                    if sleep_or_cancel(self.polling.reconnect_backoff, shutdown).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Runs one cycle on an open session.
    ///
    /// # Errors
    ///
    /// Any mailbox failure. Nothing has been deleted when this returns an error.
    #[instrument(
        name = "PollingEngine::poll_once",
        skip(self),
        fields(mailbox = %self.mailbox)
    )]
    pub async fn poll_once(&mut self) -> std::result::Result<CycleReport, MailboxError> {
        self.session.select_mailbox(&self.mailbox).await?;
        let uids = self.session.search_from(&self.target_sender).await?;

        let mut report = CycleReport {
            found: uids.len(),
            ..CycleReport::default()
        };

        for uid in uids.iter().rev() {
            report.inspected += 1;

            let date = self.session.fetch_internal_date(uid).await?;
            if !self
                .extractor
                .date_accepted(uid, date.body(), self.clock.now_utc())
            {
                continue;
            }

            let body = self.session.fetch_body(uid, self.body_part).await?;
            if let Some(token) = self.extractor.token_for(uid, body.body()) {
                info!(uid = %uid, "Token found");
                report.token = Some(token);
                break;
            }
        }

        if let Some(token) = &report.token {
            if let Err(e) = self.sink.deliver(token).await {
                warn!(error = %e, category = %e.category(), "Token delivery failed");
            }
        }

        self.session.delete_and_expunge(&uids).await?;
        report.deleted = uids.len();

        debug!(
            found = report.found,
            inspected = report.inspected,
            deleted = report.deleted,
            "Cycle complete"
        );
        Ok(report)
    }

    /// Connects if needed, then runs one cycle.
    ///
    /// On failure the transport is closed and the engine is left in
    /// [`EngineState::RecoverableFault`]; the next tick reconnects.
    /// Returns `Ok(None)` if `shutdown` fired while connecting.
    ///
    /// # Errors
    ///
    /// The mailbox failure that ended the cycle.
    pub async fn tick(
        &mut self,
        shutdown: &CancellationToken,
    ) -> std::result::Result<Option<CycleReport>, MailboxError> {
        if self.session.transport().state() != SessionState::Ready
            && !self.connect_with_retry(shutdown).await
        {
            return Ok(None);
        }
        self.state = EngineState::Polling;

        match self.poll_once().await {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                warn!(
                    error = %e,
                    category = %e.category(),
                    "Cycle failed, dropping session"
                );
                self.session.transport_mut().close().await;
                self.state = EngineState::RecoverableFault;
                Err(e)
            }
        }
    }

    /// Polls until `shutdown` is cancelled, then closes the transport.
    #[instrument(
        name = "PollingEngine::run",
        skip_all,
        fields(mailbox = %self.mailbox, sender = %self.target_sender)
    )]
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("Watching for one-time codes");

        while !shutdown.is_cancelled() {
            let pause = match self.tick(&shutdown).await {
                Ok(Some(_)) => self.polling.interval,
                Ok(None) => break,
                Err(_) => self.polling.reconnect_backoff,
            };
            if sleep_or_cancel(pause, &shutdown).await {
                break;
            }
        }

        self.session.transport_mut().close().await;
        self.state = EngineState::Idle;
        info!("Stopped watching");
    }
}

impl<T: fmt::Debug, S> fmt::Debug for PollingEngine<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingEngine")
            .field("session", &self.session)
            .field("mailbox", &self.mailbox)
            .field("target_sender", &self.target_sender)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
