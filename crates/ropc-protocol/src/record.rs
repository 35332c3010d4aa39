// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Record layout for the binary document format.
//!
//! A document is a flat sequence of records. Every record starts with a one
//! byte tag:
//! - element start: tag, name
//! - element end: tag
//! - attribute: tag, name, one text record
//! - text: one of the text tags followed by its payload
//!
//! Names, characters and byte payloads are written as a 4 byte big-endian
//! length followed by the data. Nesting is purely structural: there is no
//! document length prefix and no checksum.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, FixedOffset, TimeZone};
use thiserror::Error;

use crate::text::{DateTimeValue, TextValue};

/// Maximum accepted document size (64 MB)
pub const MAX_DOCUMENT_SIZE: usize = 64 * 1024 * 1024;

/// Maximum element nesting depth accepted by the writer and the reader
pub const MAX_DEPTH: usize = 128;

/// Media type of a binary document carried in an HTTP body
pub const CONTENT_TYPE: &str = "application/vnd.ropc.binary-document";

/// Record tags of the binary document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Start of an element, followed by its name
    StartElement = 0x01,
    /// End of the innermost open element
    EndElement = 0x02,
    /// Attribute of the element just started
    Attribute = 0x03,
    /// Text without content
    EmptyText = 0x10,
    /// UTF-8 character data
    Chars = 0x11,
    /// Boolean `true`
    True = 0x12,
    /// Boolean `false`
    False = 0x13,
    /// Signed 64-bit integer
    Int64 = 0x14,
    /// IEEE-754 double
    Double = 0x15,
    /// Date/time with its offset kind
    DateTime = 0x16,
    /// Raw bytes
    Bytes = 0x17,
}

impl RecordType {
    /// Whether this tag introduces a text record
    pub fn is_text(self) -> bool {
        (self as u8) >= 0x10
    }
}

impl TryFrom<u8> for RecordType {
    type Error = DocumentError;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(RecordType::StartElement),
            0x02 => Ok(RecordType::EndElement),
            0x03 => Ok(RecordType::Attribute),
            0x10 => Ok(RecordType::EmptyText),
            0x11 => Ok(RecordType::Chars),
            0x12 => Ok(RecordType::True),
            0x13 => Ok(RecordType::False),
            0x14 => Ok(RecordType::Int64),
            0x15 => Ok(RecordType::Double),
            0x16 => Ok(RecordType::DateTime),
            0x17 => Ok(RecordType::Bytes),
            _ => Err(DocumentError::InvalidRecordType(value)),
        }
    }
}

/// Errors that can occur while writing or reading a document
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document too large: {0} bytes (max: {MAX_DOCUMENT_SIZE})")]
    DocumentTooLarge(usize),

    #[error("invalid record type: {0:#04x}")]
    InvalidRecordType(u8),

    #[error("unexpected end of document")]
    UnexpectedEof,

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("invalid date/time value")]
    InvalidDateTime,

    #[error("unbalanced document: {0}")]
    Unbalanced(String),

    #[error("element nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,

    #[error("expected {expected}, found {found}")]
    Unexpected { expected: String, found: String },

    #[error("attribute written after element content")]
    MisplacedAttribute,
}

// DateTime record kinds
const KIND_UNSPECIFIED: u8 = 0;
const KIND_UTC: u8 = 1;
const KIND_OFFSET: u8 = 2;

pub(crate) fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub(crate) fn put_text(buf: &mut BytesMut, value: &TextValue) {
    match value {
        TextValue::Empty => buf.put_u8(RecordType::EmptyText as u8),
        TextValue::Chars(s) => {
            buf.put_u8(RecordType::Chars as u8);
            put_string(buf, s);
        }
        TextValue::Bool(true) => buf.put_u8(RecordType::True as u8),
        TextValue::Bool(false) => buf.put_u8(RecordType::False as u8),
        TextValue::Int64(v) => {
            buf.put_u8(RecordType::Int64 as u8);
            buf.put_i64(*v);
        }
        TextValue::Double(v) => {
            buf.put_u8(RecordType::Double as u8);
            buf.put_f64(*v);
        }
        TextValue::DateTime(dt) => {
            buf.put_u8(RecordType::DateTime as u8);
            let micros = dt.naive_local().and_utc().timestamp_micros();
            match dt {
                DateTimeValue::Unspecified(_) => {
                    buf.put_u8(KIND_UNSPECIFIED);
                    buf.put_i64(micros);
                }
                DateTimeValue::Utc(_) => {
                    buf.put_u8(KIND_UTC);
                    buf.put_i64(micros);
                }
                DateTimeValue::Offset(value) => {
                    buf.put_u8(KIND_OFFSET);
                    buf.put_i64(micros);
                    buf.put_i32(value.offset().local_minus_utc());
                }
            }
        }
        TextValue::Bytes(bytes) => {
            buf.put_u8(RecordType::Bytes as u8);
            buf.put_u32(bytes.len() as u32);
            buf.put_slice(bytes);
        }
    }
}

fn ensure(bytes: &Bytes, needed: usize) -> Result<(), DocumentError> {
    if bytes.remaining() < needed {
        return Err(DocumentError::UnexpectedEof);
    }
    Ok(())
}

pub(crate) fn get_tag(bytes: &mut Bytes) -> Result<RecordType, DocumentError> {
    ensure(bytes, 1)?;
    RecordType::try_from(bytes.get_u8())
}

fn get_raw(bytes: &mut Bytes) -> Result<Bytes, DocumentError> {
    ensure(bytes, 4)?;
    let length = bytes.get_u32() as usize;
    ensure(bytes, length)?;
    Ok(bytes.split_to(length))
}

pub(crate) fn get_string(bytes: &mut Bytes, what: &'static str) -> Result<String, DocumentError> {
    let raw = get_raw(bytes)?;
    String::from_utf8(raw.to_vec()).map_err(|_| DocumentError::InvalidUtf8(what))
}

/// Decode the payload of a text record whose tag was already consumed.
pub(crate) fn get_text(tag: RecordType, bytes: &mut Bytes) -> Result<TextValue, DocumentError> {
    match tag {
        RecordType::EmptyText => Ok(TextValue::Empty),
        RecordType::Chars => Ok(TextValue::Chars(get_string(bytes, "character data")?)),
        RecordType::True => Ok(TextValue::Bool(true)),
        RecordType::False => Ok(TextValue::Bool(false)),
        RecordType::Int64 => {
            ensure(bytes, 8)?;
            Ok(TextValue::Int64(bytes.get_i64()))
        }
        RecordType::Double => {
            ensure(bytes, 8)?;
            Ok(TextValue::Double(bytes.get_f64()))
        }
        RecordType::DateTime => {
            ensure(bytes, 9)?;
            let kind = bytes.get_u8();
            let micros = bytes.get_i64();
            let naive = DateTime::from_timestamp_micros(micros)
                .ok_or(DocumentError::InvalidDateTime)?
                .naive_utc();
            let value = match kind {
                KIND_UNSPECIFIED => DateTimeValue::Unspecified(naive),
                KIND_UTC => DateTimeValue::Utc(naive.and_utc()),
                KIND_OFFSET => {
                    ensure(bytes, 4)?;
                    let offset = FixedOffset::east_opt(bytes.get_i32())
                        .ok_or(DocumentError::InvalidDateTime)?;
                    let local = offset
                        .from_local_datetime(&naive)
                        .single()
                        .ok_or(DocumentError::InvalidDateTime)?;
                    DateTimeValue::Offset(local)
                }
                _ => return Err(DocumentError::InvalidDateTime),
            };
            Ok(TextValue::DateTime(value))
        }
        RecordType::Bytes => Ok(TextValue::Bytes(get_raw(bytes)?)),
        RecordType::StartElement | RecordType::EndElement | RecordType::Attribute => {
            Err(DocumentError::Unexpected {
                expected: "text record".to_string(),
                found: format!("{:?}", tag),
            })
        }
    }
}
