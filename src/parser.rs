//! Pure parsers over response text.
//!
//! None of these fail: malformed input yields an empty list or `None`, so
//! odd server output never aborts a polling cycle on its own.

use crate::config::TimestampPolicy;
use crate::mailbox::Uid;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// `INTERNALDATE "dd-Mon-yyyy HH:MM:SS +ZZZZ"`; a space-padded day is accepted.
static INTERNALDATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\bINTERNALDATE\s+"([ \d]\d)-([A-Za-z]{3})-(\d{4}) (\d{2}):(\d{2}):(\d{2}) ([+-])(\d{2})(\d{2})""#,
    )
    .expect("valid INTERNALDATE regex")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Server-recorded arrival time of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalDate {
    local: NaiveDateTime,
    offset: FixedOffset,
}

impl InternalDate {
    /// Wall-clock time as written by the server.
    #[must_use]
    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    /// Zone offset as written by the server.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The wall-clock time corrected by the offset, i.e. the UTC instant.
    #[must_use]
    pub fn to_utc(&self) -> NaiveDateTime {
        self.local - chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()))
    }

    /// The instant used for recency checks under `policy`.
    #[must_use]
    pub fn instant(&self, policy: TimestampPolicy) -> NaiveDateTime {
        match policy {
            TimestampPolicy::IgnoreOffset => self.local,
            TimestampPolicy::ApplyOffset => self.to_utc(),
        }
    }
}

/// Extracts UIDs from a `UID SEARCH` response body.
///
/// Scans for the first whitespace-separated token equal to `SEARCH` and
/// returns the rest of that line's tokens in server order. Returns an empty
/// list when the marker is absent.
#[must_use]
pub fn parse_search_uids(body: &str) -> Vec<Uid> {
    for line in body.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.any(|token| token == "SEARCH") {
            return tokens.map(Uid::from).collect();
        }
    }
    Vec::new()
}

/// Extracts the `INTERNALDATE` of a `UID FETCH` response body.
///
/// Returns `None` if the attribute is absent or any field is out of range.
#[must_use]
pub fn parse_internal_date(body: &str) -> Option<InternalDate> {
    let caps = INTERNALDATE_RE.captures(body)?;

    let day: u32 = caps[1].trim_start().parse().ok()?;
    let month_abbrev = caps[2].to_ascii_lowercase();
    let month = MONTHS.iter().position(|m| *m == month_abbrev)? + 1;
    let year: i32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;
    let second: u32 = caps[6].parse().ok()?;

    let local = NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, day)?
        .and_hms_opt(hour, minute, second)?;

    let offset_hours: i32 = caps[8].parse().ok()?;
    let offset_minutes: i32 = caps[9].parse().ok()?;
    if offset_minutes >= 60 {
        return None;
    }
    let offset_secs = (offset_hours * 60 + offset_minutes) * 60;
    let offset = match &caps[7] {
        "-" => FixedOffset::west_opt(offset_secs)?,
        _ => FixedOffset::east_opt(offset_secs)?,
    };

    Some(InternalDate { local, offset })
}

/// Extracts the base64 payload of a fetched body section.
///
/// Drops the first line (the `* n FETCH (... {len}` line) and the last line
/// (the closing parenthesis) and joins the rest, each followed by `\n`.
/// Positional only; no MIME parsing happens here.
#[must_use]
pub fn parse_base64_body(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 3 {
        return String::new();
    }

    lines[1..lines.len() - 1]
        .iter()
        .fold(String::new(), |mut payload, line| {
            payload.push_str(line);
            payload.push('\n');
            payload
        })
}
