// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Text form of parameter values carried in GET query strings.
//!
//! Scalars use their lexical form; sequences, maps and structs are sent as
//! JSON. Percent-encoding is applied by the caller.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ropc_protocol::DateTimeValue;

use crate::codec::CodecError;
use crate::schema::{TypeDescriptor, TypeTable};
use crate::value::{Value, non_finite_lexical, parse_double};

/// Format a non-null value declared as `ty` for a query string.
///
/// The value is not checked against `ty`; [`crate::Codec::query_text`] does
/// that before formatting.
pub fn format_value(value: &Value, ty: &TypeDescriptor, table: &TypeTable) -> Result<String, CodecError> {
    let text = match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Double(d) if d.is_finite() => d.to_string(),
        Value::Double(d) => non_finite_lexical(*d).to_string(),
        Value::String(s) | Value::Enum(s) => s.clone(),
        Value::Bytes(b) => BASE64.encode(b),
        Value::DateTime(dt) => dt.to_lexical(),
        Value::Sequence(_) | Value::Map(_) | Value::Struct(_) => {
            serde_json::to_string(&value.to_typed_json(ty, table))?
        }
    };
    Ok(text)
}

/// Parse query string text back into a value of type `ty`.
pub fn parse_value(text: &str, ty: &TypeDescriptor, table: &TypeTable) -> Result<Value, CodecError> {
    let invalid = || CodecError::invalid(ty, text);
    let value = match ty {
        TypeDescriptor::Nullable(_) if text.is_empty() => Value::Null,
        TypeDescriptor::Nullable(inner) => parse_value(text, inner, table)?,
        TypeDescriptor::String => Value::String(text.to_string()),
        TypeDescriptor::Boolean => {
            if text.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if text.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                return Err(invalid());
            }
        }
        TypeDescriptor::Int32 => {
            let i: i32 = text.trim().parse().map_err(|_| invalid())?;
            Value::Int(i.into())
        }
        TypeDescriptor::Int64 => Value::Int(text.trim().parse().map_err(|_| invalid())?),
        TypeDescriptor::Double => Value::Double(parse_double(text).ok_or_else(invalid)?),
        TypeDescriptor::Bytes => Value::Bytes(BASE64.decode(text)?),
        TypeDescriptor::DateTime | TypeDescriptor::DateTimeOffset => {
            let dt = DateTimeValue::parse_lexical(text).ok_or_else(invalid)?;
            if *ty == TypeDescriptor::DateTimeOffset && !dt.has_offset() {
                return Err(invalid());
            }
            Value::DateTime(dt)
        }
        TypeDescriptor::Enum(name) => {
            let def = table
                .enumeration(name)
                .ok_or_else(|| CodecError::UnknownType(name.clone()))?;
            if !def.contains(text) {
                return Err(invalid());
            }
            Value::Enum(text.to_string())
        }
        TypeDescriptor::Collection { .. }
        | TypeDescriptor::Map { .. }
        | TypeDescriptor::Complex(_)
        | TypeDescriptor::Entity(_) => {
            let json: serde_json::Value = serde_json::from_str(text)?;
            Value::from_json(&json, ty, table)?
        }
        TypeDescriptor::ChangeSet => {
            return Err(CodecError::mismatch(ty, "change-sets cannot be sent in a query string"));
        }
    };
    Ok(value)
}
