//! Handing a found code to the user.
//!
//! The engine only knows [`TokenSink`]. [`ClipboardDelivery`] is the desktop
//! sink: it puts the code on the clipboard, tells the user, and later puts
//! back whatever was there before. The clipboard and notification backends
//! are collaborators behind [`ClipboardWriter`] and [`Notifier`].

use crate::config::DeliveryConfig;
use crate::error::DeliveryError;
use crate::extractor::OtpToken;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Message shown once the code is on the clipboard.
pub const COPIED_MESSAGE: &str = "Token copied!";

/// Writes text to the system clipboard.
#[async_trait]
pub trait ClipboardWriter: Send + Sync {
    /// Replaces the clipboard content with `text`.
    ///
    /// Returns the previous text content, or `None` if it held no readable text.
    async fn put(&self, text: &str) -> Result<Option<String>, DeliveryError>;
}

/// Shows a message to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Displays `message`.
    async fn show(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Destination for found codes.
#[async_trait]
pub trait TokenSink: Send {
    /// Delivers one code. Called at most once per polling cycle.
    async fn deliver(&mut self, token: &OtpToken) -> Result<(), DeliveryError>;
}

/// Clipboard-and-notification sink.
#[derive(Debug)]
pub struct ClipboardDelivery<C, N> {
    clipboard: C,
    notifier: N,
    config: DeliveryConfig,
    shutdown: CancellationToken,
}

impl<C: ClipboardWriter, N: Notifier> ClipboardDelivery<C, N> {
    /// Creates a sink with the given backends.
    pub fn new(clipboard: C, notifier: N, config: DeliveryConfig) -> Self {
        Self {
            clipboard,
            notifier,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cuts waits short once `shutdown` is cancelled.
    ///
    /// A pending clipboard restore then happens immediately.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// The clipboard backend.
    pub fn clipboard(&self) -> &C {
        &self.clipboard
    }

    /// The notification backend.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Sleeps for `duration`; returns `true` if shutdown interrupted it.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => false,
            () = self.shutdown.cancelled() => true,
        }
    }

    async fn put_with_retry(&self, code: &str) -> Result<Option<String>, DeliveryError> {
        let attempts = self.config.clipboard_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.clipboard.put(code).await {
                Ok(previous) => return Ok(previous),
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "Clipboard write failed, retrying");
                    attempt += 1;
                    if self.pause(self.config.clipboard_retry_delay).await {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Puts `previous` back after the restore delay. Without readable
    /// previous text the clipboard is cleared, so the code never lingers.
    async fn restore(&self, previous: Option<String>) {
        let previous = previous.unwrap_or_default();

        if self.pause(self.config.restore_delay).await {
            debug!("Shutdown requested, restoring clipboard early");
        }

        match self.clipboard.put(&previous).await {
            Ok(_) => debug!(cleared = previous.is_empty(), "Clipboard restored"),
            Err(e) => warn!(error = %e, "Failed to restore clipboard"),
        }
    }
}

#[async_trait]
impl<C: ClipboardWriter, N: Notifier> TokenSink for ClipboardDelivery<C, N> {
    #[instrument(name = "ClipboardDelivery::deliver", skip_all, fields(uid = %token.uid))]
    async fn deliver(&mut self, token: &OtpToken) -> Result<(), DeliveryError> {
        match self.put_with_retry(&token.code).await {
            Ok(previous) => {
                info!("Token copied to clipboard");
                if let Err(e) = self.notifier.show(COPIED_MESSAGE).await {
                    warn!(error = %e, "Notification failed");
                }
                self.restore(previous).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Giving up on the clipboard, showing token instead");
                let message = format!("Unable to copy token to clipboard! Token: {}", token.code);
                self.notifier.show(&message).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Uid;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct FakeClipboard {
        content: Mutex<Option<String>>,
        writes: Mutex<Vec<(String, Instant)>>,
        failures: Mutex<u32>,
    }

    impl FakeClipboard {
        fn holding(text: &str) -> Self {
            Self {
                content: Mutex::new(Some(text.to_string())),
                ..Self::default()
            }
        }

        fn failing(times: u32) -> Self {
            Self {
                failures: Mutex::new(times),
                ..Self::default()
            }
        }

        fn written(&self) -> Vec<String> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .map(|(text, _)| text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ClipboardWriter for FakeClipboard {
        async fn put(&self, text: &str) -> Result<Option<String>, DeliveryError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(DeliveryError::Clipboard {
                    message: "busy".into(),
                });
            }
            self.writes
                .lock()
                .unwrap()
                .push((text.to_string(), Instant::now()));
            Ok(self.content.lock().unwrap().replace(text.to_string()))
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        shown: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn show(&self, message: &str) -> Result<(), DeliveryError> {
            self.shown.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn token() -> OtpToken {
        OtpToken {
            code: "482913".into(),
            uid: Uid::from("103"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_notify_and_restore() {
        let mut sink = ClipboardDelivery::new(
            FakeClipboard::holding("previous"),
            FakeNotifier::default(),
            DeliveryConfig::default(),
        );
        let start = Instant::now();

        sink.deliver(&token()).await.unwrap();

        assert_eq!(sink.clipboard().written(), vec!["482913", "previous"]);
        assert_eq!(*sink.notifier().shown.lock().unwrap(), vec![COPIED_MESSAGE]);

        let writes = sink.clipboard().writes.lock().unwrap();
        assert!(writes[1].1 - start >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_clipboard_is_restored() {
        let mut sink = ClipboardDelivery::new(
            FakeClipboard::holding(""),
            FakeNotifier::default(),
            DeliveryConfig::default(),
        );

        sink.deliver(&token()).await.unwrap();

        assert_eq!(sink.clipboard().written(), vec!["482913", ""]);
        assert_eq!(sink.clipboard().content.lock().unwrap().as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_clipboard_is_cleared() {
        let mut sink = ClipboardDelivery::new(
            FakeClipboard::default(),
            FakeNotifier::default(),
            DeliveryConfig::default(),
        );

        sink.deliver(&token()).await.unwrap();

        assert_eq!(sink.clipboard().written(), vec!["482913", ""]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let mut sink = ClipboardDelivery::new(
            FakeClipboard::failing(2),
            FakeNotifier::default(),
            DeliveryConfig::default(),
        );

        sink.deliver(&token()).await.unwrap();

        assert_eq!(sink.clipboard().written(), vec!["482913"]);
        assert_eq!(*sink.notifier().shown.lock().unwrap(), vec![COPIED_MESSAGE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_show_token() {
        let mut sink = ClipboardDelivery::new(
            FakeClipboard::failing(3),
            FakeNotifier::default(),
            DeliveryConfig::default(),
        );

        sink.deliver(&token()).await.unwrap();

        assert!(sink.clipboard().written().is_empty());
        assert_eq!(
            *sink.notifier().shown.lock().unwrap(),
            vec!["Unable to copy token to clipboard! Token: 482913"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_restores_immediately() {
        let shutdown = CancellationToken::new();
        let mut sink = ClipboardDelivery::new(
            FakeClipboard::holding("previous"),
            FakeNotifier::default(),
            DeliveryConfig::default(),
        )
        .with_shutdown(shutdown.clone());
        shutdown.cancel();
        let start = Instant::now();

        sink.deliver(&token()).await.unwrap();

        assert_eq!(sink.clipboard().written(), vec!["482913", "previous"]);
        assert!(Instant::now() - start < Duration::from_secs(1));
    }
}
