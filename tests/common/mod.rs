//! In-memory IMAP mailbox and transport for engine tests.
//!
//! [`FakeServer`] answers the handful of commands the engine issues from a
//! scripted message list, records every command, and can be told to fail
//! opens or reset the connection on a given command.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime};
use otp_watch::{
    ConnError, DeliveryError, OtpToken, Response, SessionState, Status, TokenSink, Transport,
    TransportError, WatchConfig,
};
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

pub const SENDER: &str = "codes@service.example";

/// 2026-07-17 09:00:00, the "now" of every scenario.
pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 7, 17)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

pub fn imap_date(at: NaiveDateTime) -> String {
    at.format("%d-%b-%Y %H:%M:%S +0000").to_string()
}

pub fn config() -> WatchConfig {
    WatchConfig::builder()
        .host("imap.test")
        .username("me@example.com")
        .password("app-password")
        .target_sender(SENDER)
        .build()
        .unwrap()
}

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub uid: String,
    pub from: String,
    pub internal_date: String,
    /// Decoded content of body part 1; served base64-encoded.
    pub html: String,
}

#[derive(Debug, Default)]
struct Mailbox {
    messages: Vec<FakeMessage>,
    flagged: HashSet<String>,
    commands: Vec<String>,
    opens: usize,
    closes: usize,
    failing_opens: usize,
    reset_on: Option<String>,
}

/// Shared handle to the scripted mailbox.
#[derive(Debug, Clone, Default)]
pub struct FakeServer(Arc<Mutex<Mailbox>>);

impl FakeServer {
    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.0.lock().unwrap()
    }

    pub fn add_message(&self, uid: &str, from: &str, received: NaiveDateTime, html: &str) {
        self.lock().messages.push(FakeMessage {
            uid: uid.to_string(),
            from: from.to_string(),
            internal_date: imap_date(received),
            html: html.to_string(),
        });
    }

    /// The next `count` calls to `open()` fail with a network error.
    pub fn fail_opens(&self, count: usize) {
        self.lock().failing_opens = count;
    }

    /// The next command starting with `prefix` resets the connection.
    pub fn reset_on(&self, prefix: &str) {
        self.lock().reset_on = Some(prefix.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    pub fn uids(&self) -> Vec<String> {
        self.lock().messages.iter().map(|m| m.uid.clone()).collect()
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            server: self.clone(),
            state: SessionState::Disconnected,
        }
    }
}

fn ok(header: &str, body: String) -> Response {
    Response::new(Status::Ok, header, body)
}

impl Mailbox {
    fn position(&self, uid: &str) -> Option<(usize, &FakeMessage)> {
        self.messages
            .iter()
            .enumerate()
            .find(|(_, m)| m.uid == uid)
            .map(|(i, m)| (i + 1, m))
    }

    fn answer(&mut self, command: &str) -> Response {
        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            ["SELECT", ..] => ok(
                "OK [READ-WRITE] SELECT completed",
                format!("* {} EXISTS\r\n", self.messages.len()),
            ),
            ["UID", "SEARCH", "FROM", sender] => {
                let sender = sender.trim_matches('"');
                let uids: Vec<&str> = self
                    .messages
                    .iter()
                    .filter(|m| m.from == sender)
                    .map(|m| m.uid.as_str())
                    .collect();
                let mut line = String::from("* SEARCH");
                for uid in uids {
                    line.push(' ');
                    line.push_str(uid);
                }
                ok("OK SEARCH completed", format!("{line}\r\n"))
            }
            ["UID", "FETCH", uid, "INTERNALDATE"] => match self.position(uid) {
                Some((seq, m)) => ok(
                    "OK FETCH completed",
                    format!(
                        "* {seq} FETCH (UID {} INTERNALDATE \"{}\")\r\n",
                        m.uid, m.internal_date
                    ),
                ),
                None => ok("OK FETCH completed", String::new()),
            },
            ["UID", "FETCH", uid, section] if section.starts_with("BODY[") => {
                match self.position(uid) {
                    Some((seq, m)) => {
                        let encoded = STANDARD.encode(&m.html);
                        let mut literal = String::new();
                        for chunk in encoded.as_bytes().chunks(76) {
                            literal.push_str(&String::from_utf8_lossy(chunk));
                            literal.push_str("\r\n");
                        }
                        ok(
                            "OK FETCH completed",
                            format!(
                                "* {seq} FETCH (UID {} {section} {{{}}}\r\n{literal})\r\n",
                                m.uid,
                                literal.len()
                            ),
                        )
                    }
                    None => ok("OK FETCH completed", String::new()),
                }
            }
            ["UID", "STORE", set, "+FLAGS", "(\\Deleted)"] => {
                for uid in set.split(',') {
                    if self.position(uid).is_some() {
                        self.flagged.insert(uid.to_string());
                    }
                }
                ok("OK STORE completed", String::new())
            }
            ["EXPUNGE"] => {
                let mut body = String::new();
                while let Some(index) = self
                    .messages
                    .iter()
                    .position(|m| self.flagged.contains(&m.uid))
                {
                    let removed = self.messages.remove(index);
                    self.flagged.remove(&removed.uid);
                    body.push_str(&format!("* {} EXPUNGE\r\n", index + 1));
                }
                ok("OK EXPUNGE completed", body)
            }
            _ => Response::new(Status::Bad, "BAD unknown command", ""),
        }
    }
}

/// Transport backed by a [`FakeServer`].
#[derive(Debug)]
pub struct FakeTransport {
    server: FakeServer,
    state: SessionState,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&mut self) -> Result<(), ConnError> {
        let mut mailbox = self.server.lock();
        mailbox.opens += 1;
        if mailbox.failing_opens > 0 {
            mailbox.failing_opens -= 1;
            self.state = SessionState::Faulted;
            return Err(ConnError::Network {
                target: "imap.test:993".into(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    async fn execute(&mut self, command: &str) -> Result<Response, TransportError> {
        if self.state != SessionState::Ready {
            return Err(TransportError::NotConnected { state: self.state });
        }

        let mut mailbox = self.server.lock();
        mailbox.commands.push(command.to_string());

        if let Some(prefix) = mailbox.reset_on.clone() {
            if command.starts_with(&prefix) {
                mailbox.reset_on = None;
                self.state = SessionState::Faulted;
                return Err(TransportError::ConnectionReset {
                    command: prefix,
                    source: None,
                });
            }
        }

        Ok(mailbox.answer(command))
    }

    async fn close(&mut self) {
        if self.state != SessionState::Disconnected {
            self.server.lock().closes += 1;
        }
        self.state = SessionState::Disconnected;
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

/// Sink that records every token it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    tokens: Arc<Mutex<Vec<OtpToken>>>,
    fail: bool,
}

impl RecordingSink {
    /// A sink that records, then reports a clipboard failure.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn codes(&self) -> Vec<String> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.code.clone())
            .collect()
    }
}

#[async_trait]
impl TokenSink for RecordingSink {
    async fn deliver(&mut self, token: &OtpToken) -> Result<(), DeliveryError> {
        self.tokens.lock().unwrap().push(token.clone());
        if self.fail {
            return Err(DeliveryError::Clipboard {
                message: "clipboard locked".into(),
            });
        }
        Ok(())
    }
}
