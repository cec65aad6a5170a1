//! Watches a mailbox for one-time-password mail and copies the code to the clipboard.

mod desktop;

use clap::Parser;
use desktop::{default_clipboard_commands, CommandClipboard, DesktopNotifier};
use otp_watch::{
    ClipboardDelivery, DeliveryConfig, ImapTransport, PollingEngine, TimestampPolicy, WatchConfig,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "otp-watch", version)]
#[command(about = "Copies one-time codes from incoming mail to the clipboard")]
struct Args {
    /// IMAP server host
    #[arg(long, env = "OTP_WATCH_HOST")]
    host: String,

    /// IMAP server port
    #[arg(long, env = "OTP_WATCH_PORT", default_value = "993")]
    port: u16,

    /// Login name
    #[arg(long, env = "OTP_WATCH_USERNAME")]
    username: String,

    /// Login password
    #[arg(long, env = "OTP_WATCH_PASSWORD", hide_env_values = true)]
    password: String,

    /// Connect without TLS
    #[arg(long, env = "OTP_WATCH_NO_TLS")]
    no_tls: bool,

    /// Address the codes are sent from
    #[arg(long, env = "OTP_WATCH_SENDER")]
    sender: String,

    /// Mailbox to watch
    #[arg(long, env = "OTP_WATCH_MAILBOX", default_value = "INBOX")]
    mailbox: String,

    /// Body section holding the code
    #[arg(long, env = "OTP_WATCH_BODY_PART", default_value = "1")]
    body_part: u32,

    /// Fetch the whole message instead of one body section
    #[arg(long, env = "OTP_WATCH_FULL_BODY", conflicts_with = "body_part")]
    full_body: bool,

    /// Ignore messages older than this many seconds
    #[arg(long, env = "OTP_WATCH_WINDOW_SECS", default_value = "300")]
    window_secs: u64,

    /// Correct message dates by their zone offset
    #[arg(long, env = "OTP_WATCH_APPLY_OFFSET")]
    apply_offset: bool,

    /// Seconds between polls
    #[arg(long, env = "OTP_WATCH_INTERVAL_SECS", default_value = "5")]
    interval_secs: u64,

    /// Seconds between reconnect attempts
    #[arg(long, env = "OTP_WATCH_BACKOFF_SECS", default_value = "1")]
    backoff_secs: u64,

    /// Clipboard write attempts
    #[arg(long, env = "OTP_WATCH_CLIPBOARD_RETRIES", default_value = "3")]
    clipboard_retries: u32,

    /// Seconds before the previous clipboard content is put back
    #[arg(long, env = "OTP_WATCH_RESTORE_SECS", default_value = "10")]
    restore_secs: u64,

    /// Command that reads clipboard text from stdin
    #[arg(long, env = "OTP_WATCH_COPY_CMD")]
    copy_cmd: Option<String>,

    /// Command that writes clipboard text to stdout
    #[arg(long, env = "OTP_WATCH_PASTE_CMD")]
    paste_cmd: Option<String>,

    /// Log filter (falls back to RUST_LOG, then "info")
    #[arg(long, env = "OTP_WATCH_LOG")]
    log: Option<String>,
}

impl Args {
    fn watch_config(&self) -> otp_watch::Result<WatchConfig> {
        let policy = if self.apply_offset {
            TimestampPolicy::ApplyOffset
        } else {
            TimestampPolicy::IgnoreOffset
        };

        WatchConfig::builder()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .use_tls(!self.no_tls)
            .target_sender(&self.sender)
            .mailbox(&self.mailbox)
            .body_part((!self.full_body).then_some(self.body_part))
            .recency_window(Duration::from_secs(self.window_secs))
            .timestamp_policy(policy)
            .poll_interval(Duration::from_secs(self.interval_secs))
            .reconnect_backoff(Duration::from_secs(self.backoff_secs))
            .delivery(DeliveryConfig {
                clipboard_retries: self.clipboard_retries,
                restore_delay: Duration::from_secs(self.restore_secs),
                ..DeliveryConfig::default()
            })
            .build()
    }
}

fn init_tracing(filter: Option<&str>) -> anyhow::Result<()> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.log.as_deref())?;

    let config = args.watch_config()?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "Cannot listen for interrupts"),
        }
    });

    let (default_copy, default_paste) = default_clipboard_commands();
    let clipboard = CommandClipboard::new(
        args.copy_cmd.as_deref().unwrap_or(default_copy),
        args.paste_cmd.as_deref().unwrap_or(default_paste),
    );
    let sink = ClipboardDelivery::new(
        clipboard,
        DesktopNotifier::new("otp-watch"),
        config.delivery.clone(),
    )
    .with_shutdown(shutdown.clone());

    let transport = ImapTransport::from_config(&config);
    let mut engine = PollingEngine::new(&config, transport, sink)?;

    engine.run(shutdown).await;
    Ok(())
}
