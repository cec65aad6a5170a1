//! IMAP session transport: one tagged command in, one [`Response`] out.
//!
//! [`Transport`] is the seam the mailbox layer talks to. [`ImapTransport`] is
//! the network implementation: an `async-imap` session over the stream from
//! the connection module. It authenticates during [`open`](Transport::open),
//! hands raw command text to the session, and drops the connection on any
//! failure. It does not interpret response content.

use crate::config::{Credentials, TimeoutConfig, WatchConfig};
use crate::connection::{self, BoxedStream};
use crate::error::{ConnError, TransportError};
use crate::response::{Response, Status};
use async_imap::error::Error as ImapError;
use async_trait::async_trait;
use std::fmt;
use std::io;
use tracing::{debug, info, instrument, warn};

/// Authenticated `async-imap` session over TCP or TLS.
type ImapSession = async_imap::Session<BoxedStream>;

/// Lifecycle of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// `open()` is in progress.
    Connecting,
    /// Authenticated; commands may be issued.
    Ready,
    /// A failure dropped the connection; only `open()` leaves this state.
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Faulted => write!(f, "faulted"),
        }
    }
}

/// A command/response channel to an IMAP server.
///
/// Implementations are owned by a single task and never shared.
#[async_trait]
pub trait Transport: Send {
    /// Connects and authenticates. Reopens from scratch when called again.
    async fn open(&mut self) -> Result<(), ConnError>;

    /// Sends one command and waits for its tagged completion.
    ///
    /// Only valid in [`SessionState::Ready`]. Any error leaves the session
    /// [`SessionState::Faulted`].
    async fn execute(&mut self, command: &str) -> Result<Response, TransportError>;

    /// Releases the connection. Idempotent and infallible.
    async fn close(&mut self);

    /// Current session state.
    fn state(&self) -> SessionState;
}

/// Short form of a command for logs and errors; never includes arguments.
pub(crate) fn command_verb(command: &str) -> String {
    let mut words = command.split_whitespace();
    match words.next() {
        Some(first) if first.eq_ignore_ascii_case("UID") => match words.next() {
            Some(second) => format!("{first} {second}"),
            None => first.to_string(),
        },
        Some(first) => first.to_string(),
        None => String::new(),
    }
}

/// Quotes a string for use as an IMAP quoted string.
pub(crate) fn quote(value: &str) -> String {
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

/// Turns the outcome of a raw command into a [`Response`] or a transport failure.
///
/// `NO` and `BAD` completions are responses, not errors.
fn command_outcome(
    result: Result<Vec<u8>, ImapError>,
    command: String,
) -> Result<Response, TransportError> {
    match result {
        Ok(raw) => Ok(Response::new(
            Status::Ok,
            "OK",
            String::from_utf8_lossy(&raw).into_owned(),
        )),
        Err(ImapError::No(text)) => Ok(Response::new(Status::No, format!("NO {text}"), "")),
        Err(ImapError::Bad(text)) => Ok(Response::new(Status::Bad, format!("BAD {text}"), "")),
        Err(ImapError::ConnectionLost) => Err(TransportError::ConnectionReset {
            command,
            source: None,
        }),
        Err(ImapError::Io(e))
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) =>
        {
            Err(TransportError::ConnectionReset {
                command,
                source: Some(e),
            })
        }
        Err(ImapError::Io(e)) => Err(TransportError::ProtocolIo {
            command,
            message: e.to_string(),
            source: Some(e),
        }),
        Err(other) => Err(TransportError::ProtocolIo {
            command,
            message: other.to_string(),
            source: None,
        }),
    }
}

/// Network [`Transport`] over TCP or TLS.
///
/// # Example
///
/// ```no_run
/// use otp_watch::{Credentials, ImapTransport, TimeoutConfig, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let credentials = Credentials::new("imap.example.com", 993, "user", "secret");
/// let mut transport = ImapTransport::new(credentials, TimeoutConfig::default());
///
/// transport.open().await?;
/// let response = transport.execute("SELECT INBOX").await?;
/// println!("{}", response.header());
/// transport.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ImapTransport {
    credentials: Credentials,
    timeouts: TimeoutConfig,
    state: SessionState,
    session: Option<ImapSession>,
}

impl ImapTransport {
    /// Creates a disconnected transport.
    #[must_use]
    pub fn new(credentials: Credentials, timeouts: TimeoutConfig) -> Self {
        Self {
            credentials,
            timeouts,
            state: SessionState::Disconnected,
            session: None,
        }
    }

    /// Creates a disconnected transport from a full configuration.
    #[must_use]
    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.credentials.clone(), config.timeouts.clone())
    }

    fn fault(&mut self) {
        self.session = None;
        self.state = SessionState::Faulted;
    }
}

/// Opens the stream and logs in, each step under its own timeout.
async fn connect(
    credentials: &Credentials,
    timeouts: &TimeoutConfig,
) -> Result<ImapSession, ConnError> {
    let target = credentials.server_address();

    let stream = tokio::time::timeout(timeouts.connect, connection::establish(credentials))
        .await
        .map_err(|_| ConnError::Timeout {
            stage: "connect",
            target: target.clone(),
            timeout: timeouts.connect,
        })??;

    debug!("Connection established");

    tokio::time::timeout(timeouts.auth, authenticate(stream, credentials, &target))
        .await
        .map_err(|_| ConnError::Timeout {
            stage: "auth",
            target,
            timeout: timeouts.auth,
        })?
}

/// Logs in over an established stream.
#[instrument(
    name = "transport::authenticate",
    skip_all,
    fields(username = %credentials.username)
)]
async fn authenticate(
    stream: BoxedStream,
    credentials: &Credentials,
    target: &str,
) -> Result<ImapSession, ConnError> {
    let client = async_imap::Client::new(stream);

    debug!("Authenticating to IMAP server");

    client
        .login(&credentials.username, credentials.password())
        .await
        .map_err(|(error, _client)| login_error(error, &credentials.username, target))
}

fn login_error(error: ImapError, username: &str, target: &str) -> ConnError {
    match error {
        ImapError::Io(source) => ConnError::Network {
            target: target.to_string(),
            source,
        },
        ImapError::ConnectionLost => ConnError::Network {
            target: target.to_string(),
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "connection lost during login"),
        },
        ImapError::No(message) | ImapError::Bad(message) => ConnError::Auth {
            username: username.to_string(),
            message,
        },
        other => ConnError::Auth {
            username: username.to_string(),
            message: other.to_string(),
        },
    }
}

/// Discards untagged responses `async-imap` queued outside a command.
fn drain_unsolicited(session: &mut ImapSession) {
    let mut drained = 0usize;
    while session.unsolicited_responses.try_recv().is_ok() {
        drained += 1;
    }
    if drained > 0 {
        debug!(drained, "Discarded unsolicited responses");
    }
}

#[async_trait]
impl Transport for ImapTransport {
    #[instrument(
        name = "ImapTransport::open",
        skip(self),
        fields(
            imap_host = %self.credentials.host,
            port = self.credentials.port,
            username = %self.credentials.username
        )
    )]
    async fn open(&mut self) -> Result<(), ConnError> {
        if self.session.is_some() {
            self.close().await;
        }

        self.state = SessionState::Connecting;

        match connect(&self.credentials, &self.timeouts).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = SessionState::Ready;
                info!("Connected to IMAP server");
                Ok(())
            }
            Err(e) => {
                self.fault();
                warn!(error = %e, category = %e.category(), "Connection attempt failed");
                Err(e)
            }
        }
    }

    #[instrument(
        name = "ImapTransport::execute",
        skip_all,
        fields(command = %command_verb(command))
    )]
    async fn execute(&mut self, command: &str) -> Result<Response, TransportError> {
        let verb = command_verb(command);

        if self.state != SessionState::Ready {
            return Err(TransportError::NotConnected { state: self.state });
        }
        if command.contains(['\r', '\n']) {
            self.fault();
            return Err(TransportError::ProtocolIo {
                command: verb,
                message: "command contains a line break".into(),
                source: None,
            });
        }
        let Some(session) = self.session.as_mut() else {
            self.fault();
            return Err(TransportError::NotConnected {
                state: SessionState::Faulted,
            });
        };

        let timeout = self.timeouts.command;
        let outcome =
            tokio::time::timeout(timeout, session.run_command_and_read_response(command)).await;
        drain_unsolicited(session);

        let Ok(result) = outcome else {
            self.fault();
            return Err(TransportError::Timeout {
                command: verb,
                timeout,
            });
        };

        match command_outcome(result, verb) {
            Ok(response) => {
                debug!(
                    status = %response.status(),
                    body_len = response.body().len(),
                    "Command completed"
                );
                Ok(response)
            }
            Err(e) => {
                self.fault();
                Err(e)
            }
        }
    }

    #[instrument(name = "ImapTransport::close", skip(self))]
    async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if self.state == SessionState::Ready {
                match tokio::time::timeout(self.timeouts.logout, session.logout()).await {
                    Ok(Ok(())) => debug!("Logged out"),
                    Ok(Err(e)) => debug!(error = %e, "Logout failed"),
                    Err(_) => debug!(
                        timeout_secs = self.timeouts.logout.as_secs(),
                        "Logout timed out"
                    ),
                }
            }
            info!("Disconnected from IMAP server");
        }
        self.state = SessionState::Disconnected;
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

impl fmt::Debug for ImapTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapTransport")
            .field("credentials", &self.credentials)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
