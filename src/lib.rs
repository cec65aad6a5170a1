//! # otp-watch
//!
//! Watches an IMAP mailbox for one-time-password mail from a known sender and
//! hands the code to the user.
//!
//! Each polling cycle:
//! - selects the mailbox and searches for messages from the target sender
//! - scans them newest first, skipping messages older than the recency window
//! - base64-decodes the body section and looks for a six-digit code
//! - passes the first code found to a [`TokenSink`]
//! - deletes and expunges every message the search returned
//!
//! Connection loss, timeouts and unexpected responses end the cycle early
//! without deleting anything; the engine reconnects and tries again.
//!
//! ## Quick Start
//!
//! ```no_run
//! use otp_watch::{ImapTransport, PollingEngine, TokenSink, OtpToken, DeliveryError, WatchConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Print;
//!
//! #[async_trait::async_trait]
//! impl TokenSink for Print {
//!     async fn deliver(&mut self, token: &OtpToken) -> Result<(), DeliveryError> {
//!         println!("code: {}", token.code);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> otp_watch::Result<()> {
//! let config = WatchConfig::builder()
//!     .host("imap.example.com")
//!     .username("me@example.com")
//!     .password("app-password")
//!     .target_sender("no-reply@service.example")
//!     .build()?;
//!
//! let transport = ImapTransport::from_config(&config);
//! let mut engine = PollingEngine::new(&config, transport, Print)?;
//! engine.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Code Patterns
//!
//! ```
//! use otp_watch::matcher::{Matcher, OtpMatcher};
//!
//! let matcher = OtpMatcher::from_patterns([r"code:\s*(\d{8})"]).unwrap();
//! assert_eq!(matcher.find_match("Your code: 12345678").as_deref(), Some("12345678"));
//! ```
//!
//! Pass it to [`PollingEngine::with_matcher`].
//!
//! ## Error Handling
//!
//! Configuration problems are reported by [`WatchConfigBuilder::build`]. Everything
//! else is retried by the engine and logged with an [`ErrorCategory`]:
//!
//! ```
//! use otp_watch::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient {} error: {}", error.category(), error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate emits `tracing` spans and events; install a subscriber to see them.
//!
//! ### Span Naming Convention
//!
//! - `ImapTransport::open` / `ImapTransport::execute` / `ImapTransport::close`
//! - `transport::authenticate` - LOGIN
//! - `connection::establish` - TCP and TLS
//! - `mailbox::select`, `mailbox::search_from`, `mailbox::fetch_internal_date`,
//!   `mailbox::fetch_body`, `mailbox::delete_and_expunge`
//! - `PollingEngine::run` / `PollingEngine::connect` / `PollingEngine::poll_once`
//! - `ClipboardDelivery::deliver`
//!
//! ### Standard Fields
//!
//! - `imap_host`, `port`, `username` - connection target
//! - `mailbox` - selected mailbox
//! - `command` - command verb, never its arguments
//! - `uid` - message UID
//!
//! Passwords and codes are never recorded.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod clock;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod mailbox;
pub mod matcher;
pub mod parser;
pub mod response;
pub mod transport;

// Internal modules
mod connection;

// Re-exports for ergonomic API
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    Credentials, DeliveryConfig, PollingConfig, TimeoutConfig, TimestampPolicy, WatchConfig,
    WatchConfigBuilder,
};
pub use delivery::{ClipboardDelivery, ClipboardWriter, Notifier, TokenSink};
pub use engine::{CycleReport, EngineState, NullSink, PollingEngine};
pub use error::{
    ConnError, DeliveryError, Error, ErrorCategory, MailboxError, Result, TransportError,
};
pub use extractor::{OtpToken, TokenExtractor};
pub use mailbox::{MailboxSession, Uid};
pub use parser::{parse_base64_body, parse_internal_date, parse_search_uids, InternalDate};
pub use response::{Response, Status};
pub use transport::{ImapTransport, SessionState, Transport};
