//! Desktop backends: clipboard through external commands, notifications through notify-rust.

use async_trait::async_trait;
use otp_watch::{ClipboardWriter, DeliveryError, Notifier};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Default clipboard commands for the current platform, as (copy, paste).
pub fn default_clipboard_commands() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("clip", "powershell -NoProfile -Command Get-Clipboard")
    } else if cfg!(target_os = "macos") {
        ("pbcopy", "pbpaste")
    } else if std::env::var_os("WAYLAND_DISPLAY").is_some() {
        ("wl-copy", "wl-paste --no-newline")
    } else {
        ("xclip -selection clipboard -in", "xclip -selection clipboard -out")
    }
}

fn split_command(line: &str) -> Result<(String, Vec<String>), DeliveryError> {
    let mut words = line.split_whitespace().map(str::to_string);
    let program = words.next().ok_or_else(|| DeliveryError::Clipboard {
        message: "empty clipboard command".into(),
    })?;
    Ok((program, words.collect()))
}

/// Clipboard driven by a copy command (text on stdin) and a paste command (text on stdout).
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    copy: String,
    paste: String,
}

impl CommandClipboard {
    pub fn new(copy: impl Into<String>, paste: impl Into<String>) -> Self {
        Self {
            copy: copy.into(),
            paste: paste.into(),
        }
    }

    async fn read(&self) -> Option<String> {
        let (program, args) = split_command(&self.paste).ok()?;
        match Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                debug!(status = %output.status, "Clipboard read failed");
                None
            }
            Err(e) => {
                debug!(error = %e, program = %program, "Clipboard read failed");
                None
            }
        }
    }

    async fn write(&self, text: &str) -> Result<(), DeliveryError> {
        let (program, args) = split_command(&self.copy)?;
        let failed = |message: String| DeliveryError::Clipboard { message };

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| failed(format!("{program}: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| failed(format!("{program}: {e}")))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| failed(format!("{program}: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(failed(format!("{program} exited with {status}")))
        }
    }
}

#[async_trait]
impl ClipboardWriter for CommandClipboard {
    async fn put(&self, text: &str) -> Result<Option<String>, DeliveryError> {
        let previous = self.read().await;
        self.write(text).await?;
        Ok(previous)
    }
}

/// Desktop notification via the platform notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    summary: String,
}

impl DesktopNotifier {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn show(&self, message: &str) -> Result<(), DeliveryError> {
        let summary = self.summary.clone();
        let body = message.to_string();

        tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .summary(&summary)
                .body(&body)
                .show()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| DeliveryError::Notify {
            message: e.to_string(),
        })?
        .map_err(|message| DeliveryError::Notify { message })
    }
}
