//! Turning fetched message data into an [`OtpToken`].
//!
//! Every step degrades to `None`: an unparseable date, a stale message, a body
//! that is not base64, or text without a code all mean "no token here".

use crate::config::{TimestampPolicy, WatchConfig};
use crate::error::{Error, Result};
use crate::mailbox::Uid;
use crate::matcher::{Matcher, OtpMatcher};
use crate::parser::{self, InternalDate};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, NaiveDateTime};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A code found in a message.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpToken {
    /// The code itself.
    pub code: String,
    /// Message it came from.
    pub uid: Uid,
}

impl fmt::Debug for OtpToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpToken")
            .field("code", &"[REDACTED]")
            .field("uid", &self.uid)
            .finish()
    }
}

/// Recency check, body decoding and code matching.
#[derive(Clone)]
pub struct TokenExtractor {
    matcher: Arc<dyn Matcher>,
    window: Duration,
    policy: TimestampPolicy,
}

impl TokenExtractor {
    /// Extractor with the default [`OtpMatcher::delimited`] matcher.
    #[must_use]
    pub fn new(window: Duration, policy: TimestampPolicy) -> Self {
        Self {
            matcher: Arc::new(OtpMatcher::delimited()),
            window,
            policy,
        }
    }

    /// Extractor using the window and timestamp policy of `config`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the recency window is out of range.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let window = Duration::from_std(config.recency_window).map_err(|_| Error::InvalidConfig {
            message: "recency window is out of range".into(),
        })?;
        Ok(Self::new(window, config.timestamp_policy))
    }

    /// Replaces the matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// The recency window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// `true` when `0 <= now - date <= window`, both bounds inclusive.
    #[must_use]
    pub fn is_recent(&self, date: &InternalDate, now: NaiveDateTime) -> bool {
        let age = now - date.instant(self.policy);
        let recent = age >= Duration::zero() && age <= self.window;
        debug!(
            age_secs = age.num_seconds(),
            window_secs = self.window.num_seconds(),
            recent,
            "Recency check"
        );
        recent
    }

    /// Decodes the base64 payload of a fetched body section and runs the matcher.
    #[must_use]
    pub fn token_from_body(&self, raw_body: &str) -> Option<String> {
        let mut payload = parser::parse_base64_body(raw_body);
        payload.retain(|c| !c.is_ascii_whitespace());

        let decoded = match STANDARD.decode(payload.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Body is not valid base64");
                return None;
            }
        };

        let text = String::from_utf8_lossy(&decoded);
        let code = self.matcher.find_match(&text).map(|m| m.into_owned());
        if code.is_none() {
            debug!(matcher = %self.matcher.description(), "No code in body");
        }
        code
    }

    /// Full extraction for one message: date check first, then the body.
    ///
    /// The body is not decoded when the date is missing or outside the window.
    #[must_use]
    pub fn extract_token(
        &self,
        uid: &Uid,
        date_text: &str,
        body_text: &str,
        now: NaiveDateTime,
    ) -> Option<OtpToken> {
        if !self.date_accepted(uid, date_text, now) {
            return None;
        }
        self.token_for(uid, body_text)
    }

    /// First half of [`extract_token`](Self::extract_token): parses the
    /// INTERNALDATE response and applies the recency window.
    pub(crate) fn date_accepted(&self, uid: &Uid, date_text: &str, now: NaiveDateTime) -> bool {
        let Some(date) = parser::parse_internal_date(date_text) else {
            debug!(uid = %uid, "No usable INTERNALDATE");
            return false;
        };
        let recent = self.is_recent(&date, now);
        if !recent {
            debug!(uid = %uid, "Message outside the recency window");
        }
        recent
    }

    /// Second half of [`extract_token`](Self::extract_token).
    pub(crate) fn token_for(&self, uid: &Uid, body_text: &str) -> Option<OtpToken> {
        let code = self.token_from_body(body_text)?;
        Some(OtpToken {
            code,
            uid: uid.clone(),
        })
    }
}

impl fmt::Debug for TokenExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExtractor")
            .field("matcher", &self.matcher.description())
            .field("window", &self.window)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::ClosureMatcher;
    use chrono::NaiveDate;
    use std::borrow::Cow;

    const DATE: &str = "* 1 FETCH (UID 7 INTERNALDATE \"17-Jul-2026 09:00:00 +0000\")\r\n";

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 7, 17)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn extractor() -> TokenExtractor {
        TokenExtractor::new(Duration::seconds(300), TimestampPolicy::IgnoreOffset)
    }

    /// Wraps `html` the way a `UID FETCH ... BODY[1]` response carries it.
    fn fetched_body(html: &str) -> String {
        let encoded = STANDARD.encode(html);
        let (first, second) = encoded.split_at(encoded.len() / 2);
        let literal = format!("{first}\r\n{second}\r\n");
        format!(
            "* 1 FETCH (UID 7 BODY[1] {{{}}}\r\n{literal})\r\n",
            literal.len()
        )
    }

    #[test]
    fn test_recency_bounds_inclusive() {
        let ex = extractor();
        let date = parser::parse_internal_date(DATE).unwrap();

        assert!(ex.is_recent(&date, at(9, 0, 0)));
        assert!(ex.is_recent(&date, at(9, 5, 0)));
        assert!(!ex.is_recent(&date, at(9, 5, 1)));
        // Future-dated messages are rejected.
        assert!(!ex.is_recent(&date, at(8, 59, 59)));
    }

    #[test]
    fn test_recency_offset_policies() {
        let date =
            parser::parse_internal_date("INTERNALDATE \"17-Jul-2026 11:00:00 +0200\"").unwrap();

        let ignore = TokenExtractor::new(Duration::seconds(300), TimestampPolicy::IgnoreOffset);
        let apply = TokenExtractor::new(Duration::seconds(300), TimestampPolicy::ApplyOffset);

        assert!(!ignore.is_recent(&date, at(9, 1, 0)));
        assert!(apply.is_recent(&date, at(9, 1, 0)));
    }

    #[test]
    fn test_token_from_html_body() {
        let body = fetched_body("<html><p>Your code</p><p><b>482913</b></p></html>");
        assert_eq!(extractor().token_from_body(&body).as_deref(), Some("482913"));
    }

    #[test]
    fn test_token_from_body_rejects_non_base64() {
        let body = "* 1 FETCH (UID 7 BODY[1] {12}\r\n<b>48291\r\n)\r\n";
        assert_eq!(extractor().token_from_body(body), None);
    }

    #[test]
    fn test_token_from_body_total_over_garbage() {
        let ex = extractor();
        for body in [
            "",
            ")",
            "\r\n\r\n\r\n",
            "* 1 FETCH\r\n////\r\n)\r\n",
            "* 1 FETCH\r\n\u{0}\u{1}\u{2}\r\n)\r\n",
            "* 1 FETCH\r\n=====\r\n)\r\n",
        ] {
            assert_eq!(ex.token_from_body(body), None, "matched {body:?}");
        }
    }

    #[test]
    fn test_truncated_bodies_never_panic() {
        let ex = extractor();
        let uid = Uid::from("7");
        let body = fetched_body("<html><p>Your code</p><p><b>482913</b></p></html>");

        for end in 0..=body.len() {
            let cut = &body[..end];
            let _ = ex.token_from_body(cut);
            let _ = ex.extract_token(&uid, DATE, cut, at(9, 1, 0));
        }
        for end in 0..=DATE.len() {
            let _ = ex.extract_token(&uid, &DATE[..end], &body, at(9, 1, 0));
        }
    }

    #[test]
    fn test_random_bytes_never_panic() {
        let ex = extractor();
        let uid = Uid::from("7");
        // xorshift64, fixed seed
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        for _ in 0..500 {
            let len = usize::try_from(next() % 512).unwrap();
            let bytes: Vec<u8> = (0..len).map(|_| next().to_le_bytes()[0]).collect();
            let text = String::from_utf8_lossy(&bytes);

            let _ = ex.token_from_body(&text);
            let _ = ex.extract_token(&uid, &text, &text, at(9, 1, 0));
            let _ = ex.extract_token(&uid, DATE, &text, at(9, 1, 0));
        }
    }

    #[test]
    fn test_extract_token() {
        let ex = extractor();
        let uid = Uid::from("7");
        let body = fetched_body("<p><b>482913</b></p>");

        let token = ex.extract_token(&uid, DATE, &body, at(9, 1, 0)).unwrap();
        assert_eq!(token.code, "482913");
        assert_eq!(token.uid, uid);

        assert_eq!(ex.extract_token(&uid, DATE, &body, at(9, 10, 0)), None);
        assert_eq!(ex.extract_token(&uid, "* 1 FETCH (UID 7)", &body, at(9, 1, 0)), None);
    }

    #[test]
    fn test_custom_matcher() {
        let ex = extractor().with_matcher(Arc::new(ClosureMatcher::new(
            |text| text.strip_prefix("CODE=").map(Cow::Borrowed),
            "code prefix",
        )));
        let body = fetched_body("CODE=ABCDEF");
        assert_eq!(ex.token_from_body(&body).as_deref(), Some("ABCDEF"));
    }

    #[test]
    fn test_token_debug_redacts_code() {
        let token = OtpToken {
            code: "482913".into(),
            uid: Uid::from("7"),
        };
        assert!(!format!("{token:?}").contains("482913"));
    }
}
