// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dynamically typed payload values and their bridge to serde.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ropc_protocol::DateTimeValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::codec::CodecError;
use crate::schema::{TypeDescriptor, TypeTable};

/// JSON member naming the runtime type of a struct value.
pub const JSON_TYPE_MEMBER: &str = "$type";

/// A parameter, field or result value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTimeValue),
    /// Enum member name
    Enum(String),
    Sequence(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Struct(StructValue),
}

/// Instance of an entity or complex type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    /// Runtime type name; may name a type derived from the declared one.
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl StructValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTimeValue> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to JSON.
    ///
    /// Date/times use their lexical form, bytes are base64 and non-finite
    /// doubles become `"NaN"`, `"INF"` or `"-INF"`. Maps whose keys are all
    /// strings become objects; other maps become `[{"Key", "Value"}]` arrays.
    pub fn to_json(&self) -> Json {
        self.json_with(None)
    }

    /// Convert to JSON read back as `ty`.
    ///
    /// Like [`Value::to_json`], but a struct whose runtime type differs
    /// from the type declared at its position carries a `$type` member, so
    /// [`Value::from_json`] resolves the same derived type.
    pub fn to_typed_json(&self, ty: &TypeDescriptor, table: &TypeTable) -> Json {
        self.json_with(Some((ty, table)))
    }

    fn json_with(&self, declared: Option<(&TypeDescriptor, &TypeTable)>) -> Json {
        if let Some((TypeDescriptor::Nullable(inner), table)) = declared {
            return self.json_with(Some((inner.as_ref(), table)));
        }
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Double(d) => match Number::from_f64(*d) {
                Some(n) => Json::Number(n),
                None => Json::String(non_finite_lexical(*d).to_string()),
            },
            Value::String(s) | Value::Enum(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(BASE64.encode(b)),
            Value::DateTime(dt) => Json::String(dt.to_lexical()),
            Value::Sequence(items) => {
                let element = match declared {
                    Some((TypeDescriptor::Collection { element, .. }, table)) => {
                        Some((element.as_ref(), table))
                    }
                    _ => None,
                };
                Json::Array(items.iter().map(|item| item.json_with(element)).collect())
            }
            Value::Map(pairs) => {
                let (key_ty, value_ty) = match declared {
                    Some((TypeDescriptor::Map { key, value, .. }, table)) => {
                        (Some((key.as_ref(), table)), Some((value.as_ref(), table)))
                    }
                    _ => (None, None),
                };
                if pairs.iter().all(|(k, _)| k.as_str().is_some()) {
                    let object = pairs
                        .iter()
                        .filter_map(|(k, v)| {
                            k.as_str().map(|k| (k.to_string(), v.json_with(value_ty)))
                        })
                        .collect();
                    Json::Object(object)
                } else {
                    Json::Array(
                        pairs
                            .iter()
                            .map(|(k, v)| {
                                let mut entry = JsonMap::new();
                                entry.insert("Key".to_string(), k.json_with(key_ty));
                                entry.insert("Value".to_string(), v.json_with(value_ty));
                                Json::Object(entry)
                            })
                            .collect(),
                    )
                }
            }
            Value::Struct(s) => {
                let mut object = JsonMap::new();
                let table = match declared {
                    Some((
                        TypeDescriptor::Complex(name) | TypeDescriptor::Entity(name),
                        table,
                    )) => {
                        if *name != s.type_name {
                            object.insert(
                                JSON_TYPE_MEMBER.to_string(),
                                Json::String(s.type_name.clone()),
                            );
                        }
                        Some(table)
                    }
                    _ => None,
                };
                let def = table.and_then(|t| t.structure(&s.type_name));
                for (name, value) in &s.fields {
                    let field_ty = def
                        .and_then(|d| d.field_named(name))
                        .zip(table)
                        .map(|(field, table)| (&field.ty, table));
                    object.insert(name.clone(), value.json_with(field_ty));
                }
                Json::Object(object)
            }
        }
    }

    /// Deserialize into a caller-defined type through the JSON bridge.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    /// Build a value from any serializable type, directed by `ty`.
    pub fn from_serialize<T: Serialize + ?Sized>(
        value: &T,
        ty: &TypeDescriptor,
        table: &TypeTable,
    ) -> Result<Value, CodecError> {
        Self::from_json(&serde_json::to_value(value)?, ty, table)
    }

    /// Build a value from JSON, directed by `ty`.
    ///
    /// Struct objects may name a derived runtime type in a `$type` member.
    pub fn from_json(json: &Json, ty: &TypeDescriptor, table: &TypeTable) -> Result<Value, CodecError> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || CodecError::mismatch(ty, format!("unexpected JSON {}", json_kind(json)));

        match ty {
            TypeDescriptor::Nullable(inner) => Self::from_json(json, inner, table),
            TypeDescriptor::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            TypeDescriptor::Boolean => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            TypeDescriptor::Int32 => {
                let i = json.as_i64().ok_or_else(mismatch)?;
                i32::try_from(i).map_err(|_| CodecError::invalid(ty, i))?;
                Ok(Value::Int(i))
            }
            TypeDescriptor::Int64 => json.as_i64().map(Value::Int).ok_or_else(mismatch),
            TypeDescriptor::Double => match json {
                Json::String(s) => parse_double(s)
                    .map(Value::Double)
                    .ok_or_else(|| CodecError::invalid(ty, s)),
                other => other.as_f64().map(Value::Double).ok_or_else(mismatch),
            },
            TypeDescriptor::Bytes => match json {
                Json::String(s) => Ok(Value::Bytes(BASE64.decode(s)?)),
                Json::Array(items) => items
                    .iter()
                    .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .map(Value::Bytes)
                    .ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            TypeDescriptor::DateTime | TypeDescriptor::DateTimeOffset => {
                let text = json.as_str().ok_or_else(mismatch)?;
                let dt = DateTimeValue::parse_lexical(text)
                    .ok_or_else(|| CodecError::invalid(ty, text))?;
                if *ty == TypeDescriptor::DateTimeOffset && !dt.has_offset() {
                    return Err(CodecError::invalid(ty, text));
                }
                Ok(Value::DateTime(dt))
            }
            TypeDescriptor::Enum(name) => {
                let member = json.as_str().ok_or_else(mismatch)?;
                let def = table
                    .enumeration(name)
                    .ok_or_else(|| CodecError::UnknownType(name.clone()))?;
                if !def.contains(member) {
                    return Err(CodecError::invalid(ty, member));
                }
                Ok(Value::Enum(member.to_string()))
            }
            TypeDescriptor::Collection { element, .. } => json
                .as_array()
                .ok_or_else(mismatch)?
                .iter()
                .map(|item| Self::from_json(item, element, table))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Sequence),
            TypeDescriptor::Map { key, value, .. } => match json {
                Json::Object(object) => object
                    .iter()
                    .map(|(k, v)| {
                        Ok((
                            Self::from_json(&Json::String(k.clone()), key, table)?,
                            Self::from_json(v, value, table)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, CodecError>>()
                    .map(Value::Map),
                Json::Array(entries) => entries
                    .iter()
                    .map(|entry| {
                        let k = entry.get("Key").unwrap_or(&Json::Null);
                        let v = entry.get("Value").unwrap_or(&Json::Null);
                        Ok((
                            Self::from_json(k, key, table)?,
                            Self::from_json(v, value, table)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, CodecError>>()
                    .map(Value::Map),
                _ => Err(mismatch()),
            },
            TypeDescriptor::Complex(declared) | TypeDescriptor::Entity(declared) => {
                let object = json.as_object().ok_or_else(mismatch)?;
                let runtime = match object.get(JSON_TYPE_MEMBER) {
                    Some(Json::String(name)) => name.as_str(),
                    Some(_) => return Err(mismatch()),
                    None => declared.as_str(),
                };
                let def = table
                    .structure(runtime)
                    .ok_or_else(|| CodecError::UnknownType(runtime.to_string()))?;

                if let Some(unknown) = object
                    .keys()
                    .find(|k| *k != JSON_TYPE_MEMBER && def.field_named(k).is_none())
                {
                    return Err(CodecError::mismatch(
                        ty,
                        format!("unknown member '{}' of '{}'", unknown, runtime),
                    ));
                }

                let mut result = StructValue::new(runtime);
                for field in &def.fields {
                    let value = match object.get(&field.name) {
                        Some(json) => Self::from_json(json, &field.ty, table)?,
                        None => Value::Null,
                    };
                    result.fields.push((field.name.clone(), value));
                }
                Ok(Value::Struct(result))
            }
            TypeDescriptor::ChangeSet => Err(CodecError::mismatch(
                ty,
                "change-sets are not representable as values",
            )),
        }
    }
}

pub(crate) fn non_finite_lexical(d: f64) -> &'static str {
    if d.is_nan() {
        "NaN"
    } else if d > 0.0 {
        "INF"
    } else {
        "-INF"
    }
}

/// Parse a double, accepting the `NaN`/`INF`/`-INF` spellings.
pub(crate) fn parse_double(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" => Some(f64::NAN),
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTimeValue> for Value {
    fn from(value: DateTimeValue) -> Self {
        Value::DateTime(value)
    }
}

impl From<StructValue> for Value {
    fn from(value: StructValue) -> Self {
        Value::Struct(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Sequence(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
