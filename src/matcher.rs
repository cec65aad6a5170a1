//! Locating the one-time code inside decoded message text.
//!
//! [`Matcher`] is the seam the extractor calls. [`OtpMatcher::delimited`] is
//! the default: six digits wrapped in HTML bold, or in asterisks for plain
//! text mail.
//!
//! # Example
//!
//! ```
//! use otp_watch::matcher::{Matcher, OtpMatcher, RegexMatcher};
//!
//! let otp = OtpMatcher::delimited();
//! assert_eq!(otp.find_match("<p><b>482913</b></p>").as_deref(), Some("482913"));
//! assert_eq!(otp.find_match("Your code: *482913*").as_deref(), Some("482913"));
//!
//! let custom = RegexMatcher::new(r"code=(\d{8})").unwrap();
//! assert_eq!(custom.find_match("?code=12345678").as_deref(), Some("12345678"));
//! ```

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static BOLD_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<b>(\d{6})</b>").expect("valid bold code regex"));

static STARRED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*(\d{6})\*").expect("valid starred code regex"));

/// Finds a code in decoded text.
///
/// Implementations must be total: any input, including binary garbage
/// decoded lossily, yields `Some` or `None` without panicking.
pub trait Matcher: Send + Sync {
    /// Returns the first code found in `text`.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// What this matcher looks for, for logs.
    fn description(&self) -> &str;
}

/// Regex matcher returning the first capture group that participated in the
/// match, or the whole match when the pattern has no groups.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
    description: String,
}

impl RegexMatcher {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPattern`] if the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_description(pattern, format!("pattern {pattern}"))
    }

    /// Compiles `pattern` with a description used in logs.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPattern`] if the pattern does not compile.
    pub fn with_description(pattern: &str, description: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern { source })?;
        Ok(Self::from_regex(regex, description))
    }

    fn from_regex(regex: Regex, description: impl Into<String>) -> Self {
        Self {
            regex,
            description: description.into(),
        }
    }
}

impl Matcher for RegexMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        let caps = self.regex.captures(text)?;
        let found = if caps.len() > 1 {
            caps.iter().skip(1).flatten().next()?
        } else {
            caps.get(0)?
        };
        Some(Cow::Borrowed(found.as_str()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Ordered set of code patterns; the first pattern with a match wins.
#[derive(Debug, Clone)]
pub struct OtpMatcher {
    patterns: Vec<RegexMatcher>,
    description: String,
}

impl OtpMatcher {
    /// Six digits in `<b>…</b>`, falling back to six digits in `*…*`.
    ///
    /// A body containing both forms yields the bold one.
    #[must_use]
    pub fn delimited() -> Self {
        Self {
            patterns: vec![
                RegexMatcher::from_regex(BOLD_CODE.clone(), "bold 6-digit code"),
                RegexMatcher::from_regex(STARRED_CODE.clone(), "starred 6-digit code"),
            ],
            description: "6-digit code in <b></b> or **".into(),
        }
    }

    /// Tries `patterns` in order.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPattern`] for the first pattern that does not compile,
    /// or [`Error::InvalidConfig`] if `patterns` is empty.
    pub fn from_patterns<'p>(patterns: impl IntoIterator<Item = &'p str>) -> Result<Self> {
        let patterns = patterns
            .into_iter()
            .map(RegexMatcher::new)
            .collect::<Result<Vec<_>>>()?;

        if patterns.is_empty() {
            return Err(Error::InvalidConfig {
                message: "at least one code pattern is required".into(),
            });
        }

        let description = patterns
            .iter()
            .map(RegexMatcher::description)
            .collect::<Vec<_>>()
            .join(", then ");

        Ok(Self {
            patterns,
            description,
        })
    }
}

impl Default for OtpMatcher {
    fn default() -> Self {
        Self::delimited()
    }
}

impl Matcher for OtpMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.patterns.iter().find_map(|p| p.find_match(text))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Matcher backed by a closure.
///
/// ```
/// use otp_watch::matcher::{ClosureMatcher, Matcher};
/// use std::borrow::Cow;
///
/// let matcher = ClosureMatcher::new(
///     |text| {
///         text.lines()
///             .find_map(|line| line.strip_prefix("Code: "))
///             .map(|code| Cow::Borrowed(code.trim()))
///     },
///     "code line",
/// );
/// assert_eq!(matcher.find_match("Hi\nCode: 123456\n").as_deref(), Some("123456"));
/// ```
pub struct ClosureMatcher<F>
where
    F: for<'a> Fn(&'a str) -> Option<Cow<'a, str>> + Send + Sync,
{
    matcher_fn: F,
    description: String,
}

impl<F> ClosureMatcher<F>
where
    F: for<'a> Fn(&'a str) -> Option<Cow<'a, str>> + Send + Sync,
{
    /// Wraps `matcher_fn`.
    #[must_use]
    pub fn new(matcher_fn: F, description: impl Into<String>) -> Self {
        Self {
            matcher_fn,
            description: description.into(),
        }
    }
}

impl<F> Matcher for ClosureMatcher<F>
where
    F: for<'a> Fn(&'a str) -> Option<Cow<'a, str>> + Send + Sync,
{
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        (self.matcher_fn)(text)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl<F> std::fmt::Debug for ClosureMatcher<F>
where
    F: for<'a> Fn(&'a str) -> Option<Cow<'a, str>> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureMatcher")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
