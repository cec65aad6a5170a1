//! Configuration for the OTP watcher.
//!
//! Use [`WatchConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use otp_watch::WatchConfig;
//!
//! let config = WatchConfig::builder()
//!     .host("imap.example.com")
//!     .username("user@example.com")
//!     .password("app-password")
//!     .target_sender("no-reply@service.example")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.mailbox, "INBOX");
//! ```

use crate::error::{Error, Result};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Connection credentials for the IMAP server.
///
/// The password is stored as a [`SecretString`] and is redacted from `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port.
    pub port: u16,
    /// Login name.
    pub username: String,
    password: SecretString,
    /// Wrap the connection in TLS (implicit TLS, IMAPS).
    pub use_tls: bool,
}

impl Credentials {
    /// Creates credentials for an implicit-TLS connection.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: SecretString::from(password.into()),
            use_tls: true,
        }
    }

    /// Returns the password as a string slice.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

/// How the zone offset of an `INTERNALDATE` enters the recency check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampPolicy {
    /// Treat the server's local wall-clock time as UTC and ignore the offset.
    ///
    /// Servers reporting a non-UTC offset shift the window by that offset.
    #[default]
    IgnoreOffset,
    /// Subtract the reported offset to get the true UTC instant.
    ApplyOffset,
}

/// Timeout configuration for session operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing the TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for LOGIN.
    pub auth: Duration,
    /// Timeout for one command round trip.
    pub command: Duration,
    /// Timeout for LOGOUT during close.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            command: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Polling loop timing.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Pause between polling cycles.
    pub interval: Duration,
    /// Pause between failed connection attempts, and after a faulted cycle.
    pub reconnect_backoff: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

/// Clipboard hand-off settings.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Attempts to write the token to the clipboard before falling back to a notification.
    pub clipboard_retries: u32,
    /// Pause between clipboard attempts.
    pub clipboard_retry_delay: Duration,
    /// How long the token stays on the clipboard before the previous content is restored.
    pub restore_delay: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            clipboard_retries: 3,
            clipboard_retry_delay: Duration::from_millis(200),
            restore_delay: Duration::from_secs(10),
        }
    }
}

/// Complete configuration of the watcher.
///
/// Create using [`WatchConfig::builder()`].
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Server connection settings.
    pub credentials: Credentials,
    /// Only messages from this sender are considered.
    target_sender: EmailAddress,
    /// Mailbox to watch.
    pub mailbox: String,
    /// Body section to fetch (`None` fetches `BODY[]`).
    pub body_part: Option<u32>,
    /// Maximum message age for its body to be scanned.
    pub recency_window: Duration,
    /// Offset handling for the recency check.
    pub timestamp_policy: TimestampPolicy,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Polling configuration.
    pub polling: PollingConfig,
    /// Clipboard hand-off configuration.
    pub delivery: DeliveryConfig,
}

impl WatchConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }

    /// Returns the target sender address as a string slice.
    #[must_use]
    pub fn target_sender(&self) -> &str {
        self.target_sender.as_str()
    }
}

/// Validates an email address format.
fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::InvalidConfig {
            message: format!("{name} is required"),
        }),
    }
}

fn reject_line_breaks(value: &str, name: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidConfig {
            message: format!("{name} must not contain line breaks"),
        });
    }
    Ok(())
}

/// Builder for [`WatchConfig`].
#[derive(Debug, Default)]
pub struct WatchConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<SecretString>,
    use_tls: Option<bool>,
    target_sender: Option<String>,
    mailbox: Option<String>,
    body_part: Option<Option<u32>>,
    recency_window: Option<Duration>,
    timestamp_policy: Option<TimestampPolicy>,
    timeouts: Option<TimeoutConfig>,
    polling: Option<PollingConfig>,
    delivery: Option<DeliveryConfig>,
}

impl WatchConfigBuilder {
    /// Sets the IMAP server hostname (required).
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the IMAP server port. Default is 993.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the login name (required).
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password (required).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Enables or disables TLS. Default is enabled.
    #[must_use]
    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = Some(use_tls);
        self
    }

    /// Sets the sender whose mail carries the codes (required).
    #[must_use]
    pub fn target_sender(mut self, sender: impl Into<String>) -> Self {
        self.target_sender = Some(sender.into());
        self
    }

    /// Sets the mailbox to watch. Default is `INBOX`.
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Sets the body section to fetch. Default is `Some(1)`; `None` fetches the whole message.
    #[must_use]
    pub fn body_part(mut self, part: Option<u32>) -> Self {
        self.body_part = Some(part);
        self
    }

    /// Sets the recency window. Default is 300 seconds.
    #[must_use]
    pub fn recency_window(mut self, window: Duration) -> Self {
        self.recency_window = Some(window);
        self
    }

    /// Sets how the `INTERNALDATE` zone offset is treated.
    #[must_use]
    pub fn timestamp_policy(mut self, policy: TimestampPolicy) -> Self {
        self.timestamp_policy = Some(policy);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .command = timeout;
        self
    }

    /// Sets polling configuration.
    #[must_use]
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    /// Sets the pause between polling cycles.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .interval = interval;
        self
    }

    /// Sets the pause between reconnect attempts.
    #[must_use]
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .reconnect_backoff = backoff;
        self
    }

    /// Sets clipboard hand-off configuration.
    #[must_use]
    pub fn delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<WatchConfig> {
        let host = required(self.host, "host")?;
        let username = required(self.username, "username")?;
        let password = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;
        reject_line_breaks(&username, "username")?;
        reject_line_breaks(password.expose_secret(), "password")?;

        let sender_raw = required(self.target_sender, "target sender")?;
        let target_sender = validate_email(&sender_raw)?;

        let mailbox = self.mailbox.unwrap_or_else(|| "INBOX".to_string());
        if mailbox.is_empty() || mailbox.contains(['\r', '\n', '"']) {
            return Err(Error::InvalidConfig {
                message: format!("invalid mailbox name: {mailbox:?}"),
            });
        }

        let recency_window = self.recency_window.unwrap_or(Duration::from_secs(300));
        // The recency check runs on chrono durations; reject windows chrono cannot hold.
        chrono::Duration::from_std(recency_window).map_err(|_| Error::InvalidConfig {
            message: format!("recency window {recency_window:?} is out of range"),
        })?;

        let delivery = self.delivery.unwrap_or_default();
        if delivery.clipboard_retries == 0 {
            return Err(Error::InvalidConfig {
                message: "clipboard retries must be at least 1".into(),
            });
        }

        let credentials = Credentials {
            host,
            port: self.port.unwrap_or(993),
            username,
            password,
            use_tls: self.use_tls.unwrap_or(true),
        };

        Ok(WatchConfig {
            credentials,
            target_sender,
            mailbox,
            body_part: self.body_part.unwrap_or(Some(1)),
            recency_window,
            timestamp_policy: self.timestamp_policy.unwrap_or_default(),
            timeouts: self.timeouts.unwrap_or_default(),
            polling: self.polling.unwrap_or_default(),
            delivery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> WatchConfigBuilder {
        WatchConfig::builder()
            .host("imap.example.com")
            .username("user")
            .password("secret")
            .target_sender("codes@service.example")
    }

    #[test]
    fn test_builder_minimal() {
        let config = minimal().build().unwrap();

        assert_eq!(config.credentials.host, "imap.example.com");
        assert_eq!(config.credentials.port, 993);
        assert_eq!(config.credentials.password(), "secret");
        assert!(config.credentials.use_tls);
        assert_eq!(config.target_sender(), "codes@service.example");
        assert_eq!(config.mailbox, "INBOX");
        assert_eq!(config.body_part, Some(1));
        assert_eq!(config.recency_window, Duration::from_secs(300));
        assert_eq!(config.timestamp_policy, TimestampPolicy::IgnoreOffset);
    }

    #[test]
    fn test_builder_full() {
        let config = minimal()
            .port(1993)
            .use_tls(false)
            .mailbox("Codes")
            .body_part(None)
            .recency_window(Duration::from_secs(60))
            .timestamp_policy(TimestampPolicy::ApplyOffset)
            .connect_timeout(Duration::from_secs(5))
            .command_timeout(Duration::from_secs(7))
            .poll_interval(Duration::from_secs(2))
            .reconnect_backoff(Duration::from_secs(3))
            .build()
            .unwrap();

        assert_eq!(config.credentials.server_address(), "imap.example.com:1993");
        assert!(!config.credentials.use_tls);
        assert_eq!(config.mailbox, "Codes");
        assert_eq!(config.body_part, None);
        assert_eq!(config.timeouts.connect, Duration::from_secs(5));
        assert_eq!(config.timeouts.command, Duration::from_secs(7));
        assert_eq!(config.polling.interval, Duration::from_secs(2));
        assert_eq!(config.polling.reconnect_backoff, Duration::from_secs(3));
    }

    #[test]
    fn test_builder_missing_fields() {
        assert!(WatchConfig::builder().build().is_err());
        assert!(minimal().host("  ").build().is_err());

        let result = WatchConfig::builder()
            .host("imap.example.com")
            .username("user")
            .target_sender("codes@service.example")
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_invalid_sender() {
        let result = minimal().target_sender("not-an-address").build();
        assert!(matches!(result, Err(Error::InvalidEmailFormat { .. })));
    }

    #[test]
    fn test_builder_rejects_line_breaks() {
        assert!(minimal().password("pa\r\nss").build().is_err());
        assert!(minimal().mailbox("INBOX\r\nEXPUNGE").build().is_err());
    }

    #[test]
    fn test_builder_rejects_zero_retries() {
        let delivery = DeliveryConfig {
            clipboard_retries: 0,
            ..DeliveryConfig::default()
        };
        assert!(minimal().delivery(delivery).build().is_err());
    }

    #[test]
    fn test_password_not_in_debug() {
        let config = minimal().password("super-secret-password").build().unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-password"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
