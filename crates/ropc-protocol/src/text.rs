// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed text values carried by text and attribute records.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};

/// Date/time value together with its offset kind.
///
/// The kind survives encoding: a UTC value is written with a `Z` suffix, an
/// offset value with its explicit `+hh:mm`, and an unspecified value with no
/// zone designator at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateTimeValue {
    /// Wall-clock time without zone information
    Unspecified(NaiveDateTime),
    /// Instant in UTC
    Utc(DateTime<Utc>),
    /// Wall-clock time with an explicit offset
    Offset(DateTime<FixedOffset>),
}

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

impl DateTimeValue {
    /// Local wall-clock reading of the value.
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            DateTimeValue::Unspecified(naive) => *naive,
            DateTimeValue::Utc(dt) => dt.naive_utc(),
            DateTimeValue::Offset(dt) => dt.naive_local(),
        }
    }

    /// Whether the value carries zone information.
    pub fn has_offset(&self) -> bool {
        !matches!(self, DateTimeValue::Unspecified(_))
    }

    /// Lexical form used in query strings and JSON.
    pub fn to_lexical(&self) -> String {
        match self {
            DateTimeValue::Unspecified(naive) => naive.format(NAIVE_FORMAT).to_string(),
            DateTimeValue::Utc(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            DateTimeValue::Offset(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        }
    }

    /// Parse the lexical form produced by [`DateTimeValue::to_lexical`].
    pub fn parse_lexical(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.ends_with('Z') || text.ends_with('z') {
            return DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| DateTimeValue::Utc(dt.with_timezone(&Utc)));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(DateTimeValue::Offset(dt));
        }
        NaiveDateTime::parse_from_str(text, NAIVE_FORMAT)
            .ok()
            .map(DateTimeValue::Unspecified)
    }
}

/// Value of a text or attribute record.
#[derive(Debug, Clone, PartialEq)]
pub enum TextValue {
    Empty,
    Chars(String),
    Bool(bool),
    Int64(i64),
    Double(f64),
    DateTime(DateTimeValue),
    Bytes(Bytes),
}

impl TextValue {
    pub fn chars(value: impl Into<String>) -> Self {
        TextValue::Chars(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TextValue::Empty => true,
            TextValue::Chars(s) => s.is_empty(),
            TextValue::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TextValue::Chars(s) => Some(s),
            TextValue::Empty => Some(""),
            _ => None,
        }
    }

    /// Boolean reading; character data is parsed case-insensitively.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TextValue::Bool(b) => Some(*b),
            TextValue::Chars(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") || s == "1" {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") || s == "0" {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TextValue::Int64(v) => Some(*v),
            TextValue::Chars(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TextValue::Double(v) => Some(*v),
            TextValue::Int64(v) => Some(*v as f64),
            TextValue::Chars(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTimeValue> {
        match self {
            TextValue::DateTime(dt) => Some(*dt),
            TextValue::Chars(s) => DateTimeValue::parse_lexical(s),
            _ => None,
        }
    }

    /// Short description used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TextValue::Empty => "empty text",
            TextValue::Chars(_) => "characters",
            TextValue::Bool(_) => "boolean",
            TextValue::Int64(_) => "integer",
            TextValue::Double(_) => "double",
            TextValue::DateTime(_) => "date/time",
            TextValue::Bytes(_) => "bytes",
        }
    }
}

impl From<&str> for TextValue {
    fn from(value: &str) -> Self {
        TextValue::Chars(value.to_string())
    }
}

impl From<String> for TextValue {
    fn from(value: String) -> Self {
        TextValue::Chars(value)
    }
}

impl From<bool> for TextValue {
    fn from(value: bool) -> Self {
        TextValue::Bool(value)
    }
}

impl From<i64> for TextValue {
    fn from(value: i64) -> Self {
        TextValue::Int64(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn sample_naive() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 250)
            .unwrap()
    }

    #[test]
    fn test_lexical_forms_per_kind() {
        let naive = sample_naive();
        assert_eq!(
            DateTimeValue::Unspecified(naive).to_lexical(),
            "2024-01-02T03:04:05.250"
        );
        assert_eq!(
            DateTimeValue::Utc(Utc.from_utc_datetime(&naive)).to_lexical(),
            "2024-01-02T03:04:05.250Z"
        );
        let offset = FixedOffset::east_opt(-5 * 3600).unwrap();
        assert_eq!(
            DateTimeValue::Offset(offset.from_local_datetime(&naive).unwrap()).to_lexical(),
            "2024-01-02T03:04:05.250-05:00"
        );
    }

    #[test]
    fn test_lexical_parse_keeps_kind() {
        let naive = sample_naive();
        let zero = FixedOffset::east_opt(0).unwrap();
        for value in [
            DateTimeValue::Unspecified(naive),
            DateTimeValue::Utc(Utc.from_utc_datetime(&naive)),
            DateTimeValue::Offset(zero.from_local_datetime(&naive).unwrap()),
        ] {
            let parsed = DateTimeValue::parse_lexical(&value.to_lexical()).unwrap();
            assert_eq!(parsed, value);
        }
    }

    #[test]
    fn test_whole_seconds_have_no_fraction() {
        let naive = NaiveDate::from_ymd_opt(2020, 6, 30)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(
            DateTimeValue::Unspecified(naive).to_lexical(),
            "2020-06-30T23:59:59"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DateTimeValue::parse_lexical("yesterday").is_none());
        assert!(DateTimeValue::parse_lexical("").is_none());
    }

    #[test]
    fn test_text_accessors() {
        assert_eq!(TextValue::chars("True").as_bool(), Some(true));
        assert_eq!(TextValue::chars("0").as_bool(), Some(false));
        assert_eq!(TextValue::chars(" 17 ").as_i64(), Some(17));
        assert_eq!(TextValue::Int64(3).as_f64(), Some(3.0));
        assert_eq!(TextValue::Empty.as_str(), Some(""));
        assert_eq!(TextValue::Int64(3).as_str(), None);
        assert!(TextValue::chars("").is_empty());
        assert!(!TextValue::Bool(false).is_empty());
    }
}
