// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema-directed serializers between [`Value`]s and document elements.
//!
//! A [`Codec`] is built once per (interface, payload type) by the
//! [`TypeRegistry`](crate::registry::TypeRegistry) and reused for every call.
//! The change-set codec additionally carries the interface's
//! [`KnownTypeSet`], which decides which types may appear polymorphically as
//! custom action parameters.
//!
//! Element layout:
//!
//! ```text
//! scalar      <name>text</name>
//! null        <name nil="true"/>
//! sequence    <name><ElemWireName>..</ElemWireName>...</name>
//! map         <name><Entry><Key>..</Key><Value>..</Value></Entry>...</name>
//! struct      <name [type="Derived"]><Field1>..</Field1>...</name>
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ropc_protocol::{
    DocumentError, DocumentReader, DocumentWriter, NIL_ATTRIBUTE, StartElement, TYPE_ATTRIBUTE,
    TextValue,
};
use thiserror::Error;
use tracing::trace;

use crate::query_string::format_value;
use crate::schema::{CustomActionDescriptor, StructType, TypeDescriptor, TypeTable};
use crate::types::{ChangeOperation, ChangeSetEntry, EntityAction, ValidationError};
use crate::value::{StructValue, Value, parse_double};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("type mismatch for {ty}: {detail}")]
    TypeMismatch { ty: String, detail: String },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("type '{0}' is not a registered known type")]
    UnregisteredKnownType(String),

    #[error("invalid value for {ty}: {value}")]
    InvalidValue { ty: String, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl CodecError {
    pub(crate) fn mismatch(ty: &TypeDescriptor, detail: impl Into<String>) -> Self {
        CodecError::TypeMismatch {
            ty: ty.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid(ty: &TypeDescriptor, value: impl fmt::Display) -> Self {
        CodecError::InvalidValue {
            ty: ty.to_string(),
            value: value.to_string(),
        }
    }
}

/// What a codec reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Value(Value),
    ChangeSet(Vec<ChangeSetEntry>),
}

impl Payload {
    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Value(Value::Null))
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Payload::Value(value) => Some(value),
            Payload::ChangeSet(_) => None,
        }
    }

    pub fn into_change_set(self) -> Option<Vec<ChangeSetEntry>> {
        match self {
            Payload::ChangeSet(entries) => Some(entries),
            Payload::Value(Value::Null) => Some(Vec::new()),
            Payload::Value(_) => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

/// Types that must be registered before they can appear polymorphically in
/// a change-set, keyed by wire name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownTypeSet {
    types: BTreeMap<String, TypeDescriptor>,
}

impl KnownTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a type with the same wire name was already present.
    pub fn insert(&mut self, ty: TypeDescriptor) -> bool {
        self.types.insert(ty.wire_name(), ty).is_none()
    }

    pub fn contains(&self, wire_name: &str) -> bool {
        self.types.contains_key(wire_name)
    }

    pub fn contains_type(&self, ty: &TypeDescriptor) -> bool {
        self.types.get(&ty.wire_name()) == Some(ty)
    }

    pub fn get(&self, wire_name: &str) -> Option<&TypeDescriptor> {
        self.types.get(wire_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Reusable serializer for one payload type.
#[derive(Debug)]
pub struct Codec {
    ty: TypeDescriptor,
    types: Arc<TypeTable>,
    known: Option<Arc<KnownTypeSet>>,
}

impl Codec {
    pub fn new(ty: TypeDescriptor, types: Arc<TypeTable>) -> Self {
        Self {
            ty,
            types,
            known: None,
        }
    }

    pub fn with_known_types(
        ty: TypeDescriptor,
        types: Arc<TypeTable>,
        known: Arc<KnownTypeSet>,
    ) -> Self {
        Self {
            ty,
            types,
            known: Some(known),
        }
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn known_types(&self) -> Option<&KnownTypeSet> {
        self.known.as_deref()
    }

    /// Write `payload` as an element called `name`.
    pub fn write(
        &self,
        w: &mut DocumentWriter,
        name: &str,
        payload: &Payload,
    ) -> Result<(), CodecError> {
        match (payload, &self.ty) {
            (Payload::ChangeSet(entries), TypeDescriptor::ChangeSet) => {
                self.write_change_set(w, name, entries)
            }
            (Payload::ChangeSet(_), ty) => Err(CodecError::mismatch(ty, "change-set payload")),
            (Payload::Value(value), ty) => self.write_value(w, name, ty, value, false),
        }
    }

    /// Check `value` against the codec's type, discarding the output.
    pub fn check(&self, value: &Value) -> Result<(), CodecError> {
        let mut scratch = DocumentWriter::new();
        self.write_value(&mut scratch, "value", &self.ty, value, false)
    }

    /// Text of `value` for a GET query string.
    ///
    /// Runs the same checks as [`Codec::write`] first, so a value that
    /// cannot be sent in a body cannot be sent in a query string either.
    pub fn query_text(&self, value: &Value) -> Result<String, CodecError> {
        self.check(value)?;
        format_value(value, &self.ty, &self.types)
    }

    /// Read the next element and its content.
    pub fn read(&self, r: &mut DocumentReader) -> Result<Payload, CodecError> {
        let start = r.read_start()?;
        self.read_content(r, &start)
    }

    /// Read the content of an already started element.
    pub fn read_content(
        &self,
        r: &mut DocumentReader,
        start: &StartElement,
    ) -> Result<Payload, CodecError> {
        if let TypeDescriptor::ChangeSet = self.ty {
            if start.is_nil() {
                r.skip_content(start)?;
                return Ok(Payload::Value(Value::Null));
            }
            return self.read_change_set(r, start).map(Payload::ChangeSet);
        }
        self.read_value(r, start, &self.ty).map(Payload::Value)
    }

    fn is_known(&self, wire_name: &str) -> bool {
        self.known.as_ref().is_some_and(|k| k.contains(wire_name))
    }

    fn write_value(
        &self,
        w: &mut DocumentWriter,
        name: &str,
        ty: &TypeDescriptor,
        value: &Value,
        typed: bool,
    ) -> Result<(), CodecError> {
        if let TypeDescriptor::Nullable(inner) = ty {
            return self.write_value(w, name, inner, value, typed);
        }
        if value.is_null() {
            w.start_element(name)?;
            if typed {
                w.attribute(TYPE_ATTRIBUTE, &TextValue::chars(ty.canonical().wire_name()))?;
            }
            w.attribute(NIL_ATTRIBUTE, &TextValue::Bool(true))?;
            return Ok(w.end_element()?);
        }

        match ty {
            TypeDescriptor::Collection { element, .. } => {
                let Value::Sequence(items) = value else {
                    return Err(CodecError::mismatch(ty, "expected a sequence"));
                };
                self.open(w, name, ty, typed)?;
                let item_name = element.wire_name();
                for item in items {
                    self.write_value(w, &item_name, element, item, false)?;
                }
                Ok(w.end_element()?)
            }
            TypeDescriptor::Map { key, value: vty, .. } => {
                let Value::Map(pairs) = value else {
                    return Err(CodecError::mismatch(ty, "expected a map"));
                };
                self.open(w, name, ty, typed)?;
                for (k, v) in pairs {
                    w.start_element("Entry")?;
                    self.write_value(w, "Key", key, k, false)?;
                    self.write_value(w, "Value", vty, v, false)?;
                    w.end_element()?;
                }
                Ok(w.end_element()?)
            }
            TypeDescriptor::Complex(declared) | TypeDescriptor::Entity(declared) => {
                let Value::Struct(s) = value else {
                    return Err(CodecError::mismatch(ty, "expected a struct"));
                };
                self.write_struct(w, name, declared, s, typed)
            }
            TypeDescriptor::ChangeSet => Err(CodecError::mismatch(ty, "expected a change-set")),
            scalar => {
                let text = self.scalar_text(scalar, value)?;
                self.open(w, name, ty, typed)?;
                w.text(&text)?;
                Ok(w.end_element()?)
            }
        }
    }

    fn open(
        &self,
        w: &mut DocumentWriter,
        name: &str,
        ty: &TypeDescriptor,
        typed: bool,
    ) -> Result<(), CodecError> {
        w.start_element(name)?;
        if typed {
            w.attribute(TYPE_ATTRIBUTE, &TextValue::chars(ty.canonical().wire_name()))?;
        }
        Ok(())
    }

    fn write_struct(
        &self,
        w: &mut DocumentWriter,
        name: &str,
        declared: &str,
        value: &StructValue,
        force_type: bool,
    ) -> Result<(), CodecError> {
        let runtime = value.type_name.as_str();
        if runtime != declared
            && !self.types.is_assignable(declared, runtime)
            && !self.is_known(runtime)
        {
            return Err(CodecError::UnregisteredKnownType(runtime.to_string()));
        }
        let def = self.structure(runtime)?;
        if let Some((unknown, _)) = value.fields.iter().find(|(f, _)| def.field_named(f).is_none()) {
            return Err(CodecError::TypeMismatch {
                ty: runtime.to_string(),
                detail: format!("unknown member '{}'", unknown),
            });
        }

        w.start_element(name)?;
        if force_type || runtime != declared {
            w.attribute(TYPE_ATTRIBUTE, &TextValue::chars(runtime))?;
        }
        for field in &def.fields {
            match value.get(&field.name) {
                Some(v) => self.write_value(w, &field.name, &field.ty, v, false)?,
                None => w.nil_element(&field.name)?,
            }
        }
        Ok(w.end_element()?)
    }

    fn scalar_text(&self, ty: &TypeDescriptor, value: &Value) -> Result<TextValue, CodecError> {
        let text = match (ty, value) {
            (TypeDescriptor::String, Value::String(s)) => TextValue::chars(s.as_str()),
            (TypeDescriptor::Boolean, Value::Bool(b)) => TextValue::Bool(*b),
            (TypeDescriptor::Int32, Value::Int(i)) => {
                i32::try_from(*i).map_err(|_| CodecError::invalid(ty, i))?;
                TextValue::Int64(*i)
            }
            (TypeDescriptor::Int64, Value::Int(i)) => TextValue::Int64(*i),
            (TypeDescriptor::Double, Value::Double(d)) => TextValue::Double(*d),
            (TypeDescriptor::Double, Value::Int(i)) => TextValue::Double(*i as f64),
            (TypeDescriptor::Bytes, Value::Bytes(b)) => TextValue::Bytes(Bytes::copy_from_slice(b)),
            (TypeDescriptor::DateTime, Value::DateTime(dt)) => TextValue::DateTime(*dt),
            (TypeDescriptor::DateTimeOffset, Value::DateTime(dt)) => {
                if !dt.has_offset() {
                    return Err(CodecError::invalid(ty, dt.to_lexical()));
                }
                TextValue::DateTime(*dt)
            }
            (TypeDescriptor::Enum(name), Value::Enum(member) | Value::String(member)) => {
                self.check_member(ty, name, member)?;
                TextValue::chars(member.as_str())
            }
            _ => return Err(CodecError::mismatch(ty, format!("cannot write {:?}", value))),
        };
        Ok(text)
    }

    fn check_member(&self, ty: &TypeDescriptor, name: &str, member: &str) -> Result<(), CodecError> {
        let def = self
            .types
            .enumeration(name)
            .ok_or_else(|| CodecError::UnknownType(name.to_string()))?;
        if !def.contains(member) {
            return Err(CodecError::invalid(ty, member));
        }
        Ok(())
    }

    fn structure(&self, name: &str) -> Result<&StructType, CodecError> {
        self.types
            .structure(name)
            .ok_or_else(|| CodecError::UnknownType(name.to_string()))
    }

    fn read_value(
        &self,
        r: &mut DocumentReader,
        start: &StartElement,
        ty: &TypeDescriptor,
    ) -> Result<Value, CodecError> {
        if start.is_nil() {
            r.skip_content(start)?;
            return Ok(Value::Null);
        }

        match ty {
            TypeDescriptor::Nullable(inner) => self.read_value(r, start, inner),
            TypeDescriptor::Collection { element, .. } => {
                let mut items = Vec::new();
                r.for_each_child::<CodecError, _>(start, |r, child| {
                    items.push(self.read_value(r, &child, element)?);
                    Ok(())
                })?;
                Ok(Value::Sequence(items))
            }
            TypeDescriptor::Map { key, value, .. } => {
                let mut pairs = Vec::new();
                r.for_each_child::<CodecError, _>(start, |r, entry| {
                    if entry.local_name() != "Entry" {
                        return Ok(r.skip_content(&entry)?);
                    }
                    let (mut k, mut v) = (Value::Null, Value::Null);
                    r.for_each_child::<CodecError, _>(&entry, |r, part| {
                        match part.local_name() {
                            "Key" => k = self.read_value(r, &part, key)?,
                            "Value" => v = self.read_value(r, &part, value)?,
                            _ => r.skip_content(&part)?,
                        }
                        Ok(())
                    })?;
                    pairs.push((k, v));
                    Ok(())
                })?;
                Ok(Value::Map(pairs))
            }
            TypeDescriptor::Complex(declared) | TypeDescriptor::Entity(declared) => {
                self.read_struct(r, start, declared).map(Value::Struct)
            }
            TypeDescriptor::ChangeSet => Err(CodecError::mismatch(ty, "nested change-set")),
            scalar => {
                let text = r.read_text_content(start)?;
                self.scalar_value(scalar, text)
            }
        }
    }

    fn read_struct(
        &self,
        r: &mut DocumentReader,
        start: &StartElement,
        declared: &str,
    ) -> Result<StructValue, CodecError> {
        let runtime = match start.attribute(TYPE_ATTRIBUTE) {
            Some(text) => text
                .as_str()
                .ok_or_else(|| CodecError::TypeMismatch {
                    ty: declared.to_string(),
                    detail: format!("type attribute holds {}", text.kind()),
                })?
                .to_string(),
            None => declared.to_string(),
        };
        if runtime != declared
            && !self.types.is_assignable(declared, &runtime)
            && !self.is_known(&runtime)
        {
            return Err(CodecError::UnregisteredKnownType(runtime));
        }
        let def = self.structure(&runtime)?;

        let mut seen: HashMap<String, Value> = HashMap::new();
        r.for_each_child::<CodecError, _>(start, |r, child| {
            match def.field_named(child.local_name()) {
                Some(field) => {
                    let value = self.read_value(r, &child, &field.ty)?;
                    seen.insert(field.name.clone(), value);
                }
                None => {
                    trace!(member = %child.name, ty = %runtime, "ignoring unknown member");
                    r.skip_content(&child)?;
                }
            }
            Ok(())
        })?;

        let fields = def
            .fields
            .iter()
            .map(|f| (f.name.clone(), seen.remove(&f.name).unwrap_or(Value::Null)))
            .collect();
        Ok(StructValue {
            type_name: runtime,
            fields,
        })
    }

    fn scalar_value(&self, ty: &TypeDescriptor, text: TextValue) -> Result<Value, CodecError> {
        let invalid = |text: &TextValue| match text.as_str() {
            Some(s) => CodecError::invalid(ty, s),
            None => CodecError::invalid(ty, text.kind()),
        };
        let value = match ty {
            TypeDescriptor::String => match text {
                TextValue::Chars(s) => Value::String(s),
                TextValue::Empty => Value::String(String::new()),
                other => return Err(invalid(&other)),
            },
            TypeDescriptor::Boolean => Value::Bool(text.as_bool().ok_or_else(|| invalid(&text))?),
            TypeDescriptor::Int32 => {
                let i = text.as_i64().ok_or_else(|| invalid(&text))?;
                i32::try_from(i).map_err(|_| CodecError::invalid(ty, i))?;
                Value::Int(i)
            }
            TypeDescriptor::Int64 => Value::Int(text.as_i64().ok_or_else(|| invalid(&text))?),
            TypeDescriptor::Double => match &text {
                TextValue::Chars(s) => {
                    Value::Double(parse_double(s).ok_or_else(|| invalid(&text))?)
                }
                other => Value::Double(other.as_f64().ok_or_else(|| invalid(other))?),
            },
            TypeDescriptor::Bytes => match text {
                TextValue::Bytes(b) => Value::Bytes(b.to_vec()),
                TextValue::Chars(s) => Value::Bytes(BASE64.decode(s.trim())?),
                TextValue::Empty => Value::Bytes(Vec::new()),
                other => return Err(invalid(&other)),
            },
            TypeDescriptor::DateTime | TypeDescriptor::DateTimeOffset => {
                let dt = text.as_datetime().ok_or_else(|| invalid(&text))?;
                if *ty == TypeDescriptor::DateTimeOffset && !dt.has_offset() {
                    return Err(CodecError::invalid(ty, dt.to_lexical()));
                }
                Value::DateTime(dt)
            }
            TypeDescriptor::Enum(name) => {
                let member = text.as_str().ok_or_else(|| invalid(&text))?;
                self.check_member(ty, name, member)?;
                Value::Enum(member.to_string())
            }
            other => return Err(CodecError::mismatch(other, "not a scalar type")),
        };
        Ok(value)
    }

    fn write_change_set(
        &self,
        w: &mut DocumentWriter,
        name: &str,
        entries: &[ChangeSetEntry],
    ) -> Result<(), CodecError> {
        w.start_element(name)?;
        for entry in entries {
            self.write_entry(w, entry)?;
        }
        Ok(w.end_element()?)
    }

    fn write_entry(&self, w: &mut DocumentWriter, entry: &ChangeSetEntry) -> Result<(), CodecError> {
        w.start_element("ChangeSetEntry")?;
        w.element_text("Id", &TextValue::Int64(entry.id.into()))?;
        w.element_text("Operation", &TextValue::chars(entry.operation.as_str()))?;
        self.write_entity(w, "Entity", &entry.entity)?;
        if let Some(original) = &entry.original {
            self.write_entity(w, "OriginalEntity", original)?;
        }

        if !entry.actions.is_empty() {
            w.start_element("EntityActions")?;
            for action in &entry.actions {
                let declared = self.action(&entry.entity.type_name, &action.name)?;
                let params = declared.value_parameters();
                if params.len() != action.parameters.len() {
                    return Err(CodecError::TypeMismatch {
                        ty: entry.entity.type_name.clone(),
                        detail: format!(
                            "action '{}' takes {} parameters, got {}",
                            action.name,
                            params.len(),
                            action.parameters.len()
                        ),
                    });
                }
                w.start_element("EntityAction")?;
                w.element_text("Name", &TextValue::chars(action.name.as_str()))?;
                w.start_element("Parameters")?;
                for (param, value) in params.iter().zip(&action.parameters) {
                    self.require_resolvable(&param.ty)?;
                    self.write_value(w, "Parameter", &param.ty, value, true)?;
                }
                w.end_element()?;
                w.end_element()?;
            }
            w.end_element()?;
        }

        if !entry.conflict_members.is_empty() {
            w.start_element("ConflictMembers")?;
            for member in &entry.conflict_members {
                w.element_text("string", &TextValue::chars(member.as_str()))?;
            }
            w.end_element()?;
        }
        if let Some(store) = &entry.store_entity {
            self.write_entity(w, "StoreEntity", store)?;
        }
        if !entry.validation_errors.is_empty() {
            w.start_element("ValidationErrors")?;
            for error in &entry.validation_errors {
                write_validation_error(w, error)?;
            }
            w.end_element()?;
        }
        Ok(w.end_element()?)
    }

    fn write_entity(
        &self,
        w: &mut DocumentWriter,
        name: &str,
        entity: &StructValue,
    ) -> Result<(), CodecError> {
        self.write_struct(w, name, &entity.type_name, entity, true)
    }

    fn action(&self, entity: &str, action: &str) -> Result<&CustomActionDescriptor, CodecError> {
        self.structure(entity)?
            .action_named(action)
            .ok_or_else(|| CodecError::TypeMismatch {
                ty: entity.to_string(),
                detail: format!("no custom action named '{}'", action),
            })
    }

    /// Non-primitive action parameter types must be registered known types
    /// or exposed struct types.
    fn require_resolvable(&self, ty: &TypeDescriptor) -> Result<(), CodecError> {
        match ty {
            TypeDescriptor::Nullable(inner) => self.require_resolvable(inner),
            ty if ty.is_primitive() => Ok(()),
            ty => self
                .resolve_wire_type(&ty.canonical().wire_name())
                .map(|_| ()),
        }
    }

    fn resolve_wire_type(&self, wire_name: &str) -> Result<TypeDescriptor, CodecError> {
        if let Some(primitive) = TypeDescriptor::primitive_from_wire_name(wire_name) {
            return Ok(primitive);
        }
        if let Some(known) = self.known.as_ref().and_then(|k| k.get(wire_name)) {
            return Ok(known.clone());
        }
        if let Some(def) = self.types.structure(wire_name) {
            return Ok(def.descriptor());
        }
        Err(CodecError::UnregisteredKnownType(wire_name.to_string()))
    }

    /// Read an element whose type is named by its `type` attribute.
    fn read_polymorphic(
        &self,
        r: &mut DocumentReader,
        start: &StartElement,
    ) -> Result<Value, CodecError> {
        let type_name = start.attribute(TYPE_ATTRIBUTE).and_then(TextValue::as_str);
        match type_name {
            Some(name) => {
                let ty = self.resolve_wire_type(name)?;
                self.read_value(r, start, &ty)
            }
            None if start.is_nil() => {
                r.skip_content(start)?;
                Ok(Value::Null)
            }
            None => Err(CodecError::TypeMismatch {
                ty: start.name.clone(),
                detail: "missing type attribute".to_string(),
            }),
        }
    }

    fn read_change_set(
        &self,
        r: &mut DocumentReader,
        start: &StartElement,
    ) -> Result<Vec<ChangeSetEntry>, CodecError> {
        let mut entries = Vec::new();
        r.for_each_child::<CodecError, _>(start, |r, child| {
            if child.local_name() == "ChangeSetEntry" {
                entries.push(self.read_entry(r, &child)?);
            } else {
                r.skip_content(&child)?;
            }
            Ok(())
        })?;
        Ok(entries)
    }

    fn read_entry(
        &self,
        r: &mut DocumentReader,
        start: &StartElement,
    ) -> Result<ChangeSetEntry, CodecError> {
        let mut id = None;
        let mut operation = ChangeOperation::Custom;
        let mut entity = None;
        let mut original = None;
        let mut actions = Vec::new();
        let mut conflict_members = Vec::new();
        let mut store_entity = None;
        let mut validation_errors = Vec::new();

        r.for_each_child::<CodecError, _>(start, |r, child| {
            match child.local_name() {
                "Id" => {
                    let text = r.read_text_content(&child)?;
                    let raw = text
                        .as_i64()
                        .ok_or_else(|| CodecError::invalid(&TypeDescriptor::Int32, text.kind()))?;
                    id = Some(
                        i32::try_from(raw)
                            .map_err(|_| CodecError::invalid(&TypeDescriptor::Int32, raw))?,
                    );
                }
                "Operation" => {
                    let text = r.read_text_content(&child)?;
                    operation = text.as_str().unwrap_or_default().parse()?;
                }
                "Entity" => entity = self.read_entity(r, &child)?,
                "OriginalEntity" => original = self.read_entity(r, &child)?,
                "StoreEntity" => store_entity = self.read_entity(r, &child)?,
                "EntityActions" => {
                    r.for_each_child::<CodecError, _>(&child, |r, action| {
                        actions.push(self.read_action(r, &action)?);
                        Ok(())
                    })?;
                }
                "ConflictMembers" => {
                    r.for_each_child::<CodecError, _>(&child, |r, member| {
                        let text = r.read_text_content(&member)?;
                        conflict_members.push(text.as_str().unwrap_or_default().to_string());
                        Ok(())
                    })?;
                }
                "ValidationErrors" => {
                    r.for_each_child::<CodecError, _>(&child, |r, error| {
                        validation_errors.push(read_validation_error(r, &error)?);
                        Ok(())
                    })?;
                }
                _ => r.skip_content(&child)?,
            }
            Ok(())
        })?;

        let missing = |what: &str| CodecError::TypeMismatch {
            ty: "ChangeSetEntry".to_string(),
            detail: format!("missing {}", what),
        };
        Ok(ChangeSetEntry {
            id: id.ok_or_else(|| missing("Id"))?,
            operation,
            entity: entity.ok_or_else(|| missing("Entity"))?,
            original,
            actions,
            conflict_members,
            store_entity,
            validation_errors,
        })
    }

    fn read_entity(
        &self,
        r: &mut DocumentReader,
        start: &StartElement,
    ) -> Result<Option<StructValue>, CodecError> {
        if start.is_nil() {
            r.skip_content(start)?;
            return Ok(None);
        }
        let type_name = start
            .attribute(TYPE_ATTRIBUTE)
            .and_then(TextValue::as_str)
            .ok_or_else(|| CodecError::TypeMismatch {
                ty: start.name.clone(),
                detail: "missing type attribute".to_string(),
            })?
            .to_string();
        self.read_struct(r, start, &type_name).map(Some)
    }

    fn read_action(
        &self,
        r: &mut DocumentReader,
        start: &StartElement,
    ) -> Result<EntityAction, CodecError> {
        let mut action = EntityAction::new(String::new());
        r.for_each_child::<CodecError, _>(start, |r, child| {
            match child.local_name() {
                "Name" => {
                    let text = r.read_text_content(&child)?;
                    action.name = text.as_str().unwrap_or_default().to_string();
                }
                "Parameters" => {
                    r.for_each_child::<CodecError, _>(&child, |r, param| {
                        action.parameters.push(self.read_polymorphic(r, &param)?);
                        Ok(())
                    })?;
                }
                _ => r.skip_content(&child)?,
            }
            Ok(())
        })?;
        Ok(action)
    }
}

/// Write `ValidationResult(Message, SourceMemberNames(string*))`.
pub(crate) fn write_validation_error(
    w: &mut DocumentWriter,
    error: &ValidationError,
) -> Result<(), CodecError> {
    w.start_element("ValidationResult")?;
    w.element_text("Message", &TextValue::chars(error.message.as_str()))?;
    if !error.member_names.is_empty() {
        w.start_element("SourceMemberNames")?;
        for member in &error.member_names {
            w.element_text("string", &TextValue::chars(member.as_str()))?;
        }
        w.end_element()?;
    }
    Ok(w.end_element()?)
}

pub(crate) fn read_validation_error(
    r: &mut DocumentReader,
    start: &StartElement,
) -> Result<ValidationError, DocumentError> {
    let mut error = ValidationError::default();
    r.for_each_child::<DocumentError, _>(start, |r, child| {
        match child.local_name() {
            "Message" | "ErrorMessage" => {
                let text = r.read_text_content(&child)?;
                error.message = text.as_str().unwrap_or_default().to_string();
            }
            "SourceMemberNames" | "MemberNames" => {
                r.for_each_child::<DocumentError, _>(&child, |r, member| {
                    let text = r.read_text_content(&member)?;
                    error
                        .member_names
                        .push(text.as_str().unwrap_or_default().to_string());
                    Ok(())
                })?;
            }
            _ => r.skip_content(&child)?,
        }
        Ok(())
    })?;
    Ok(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        CustomActionDescriptor, EnumType, InterfaceDescriptor, StructType,
    };
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use ropc_protocol::DateTimeValue;

    fn table() -> Arc<TypeTable> {
        let descriptor = InterfaceDescriptor::new("Orders")
            .entity(
                StructType::entity("Order")
                    .field("Id", TypeDescriptor::Int32)
                    .field("Status", TypeDescriptor::Enum("Status".into()))
                    .field("Lines", TypeDescriptor::list_of(TypeDescriptor::Complex("Line".into())))
                    .field("Placed", TypeDescriptor::nullable(TypeDescriptor::DateTimeOffset))
                    .derived("RushOrder")
                    .custom_action(
                        CustomActionDescriptor::new("Split")
                            .parameter("order", TypeDescriptor::Entity("Order".into()))
                            .parameter("parts", TypeDescriptor::list_of(TypeDescriptor::Int32))
                            .parameter("reason", TypeDescriptor::String),
                    ),
            )
            .complex(
                StructType::complex("Line")
                    .field("Sku", TypeDescriptor::String)
                    .field("Qty", TypeDescriptor::Int32),
            )
            .derived(
                StructType::entity("RushOrder")
                    .field("Id", TypeDescriptor::Int32)
                    .field("Status", TypeDescriptor::Enum("Status".into()))
                    .field("Lines", TypeDescriptor::list_of(TypeDescriptor::Complex("Line".into())))
                    .field("Placed", TypeDescriptor::nullable(TypeDescriptor::DateTimeOffset))
                    .field("Courier", TypeDescriptor::String),
            )
            .enumeration(EnumType::new("Status", ["Open", "Shipped"]));
        Arc::new(TypeTable::from_interface(&descriptor))
    }

    fn order(id: i32) -> StructValue {
        let placed = FixedOffset::east_opt(3600)
            .unwrap()
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2024, 5, 1)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap(),
            )
            .unwrap();
        StructValue::new("Order")
            .with("Id", id)
            .with("Status", Value::Enum("Open".into()))
            .with(
                "Lines",
                vec![Value::Struct(
                    StructValue::new("Line").with("Sku", "A-1").with("Qty", 2),
                )],
            )
            .with("Placed", DateTimeValue::Offset(placed))
    }

    fn write_then_read(codec: &Codec, payload: &Payload) -> Payload {
        let mut w = DocumentWriter::new();
        codec.write(&mut w, "value", payload).unwrap();
        let mut r = DocumentReader::new(w.finish().unwrap()).unwrap();
        codec.read(&mut r).unwrap()
    }

    #[test]
    fn test_struct_with_nested_collection() {
        let codec = Codec::new(TypeDescriptor::Entity("Order".into()), table());
        let value = Payload::Value(Value::Struct(order(1)));
        assert_eq!(write_then_read(&codec, &value), value);
    }

    #[test]
    fn test_sequence_items_named_after_element_type() {
        let codec = Codec::new(
            TypeDescriptor::sequence_of(TypeDescriptor::Complex("Line".into())),
            table(),
        );
        let mut w = DocumentWriter::new();
        codec
            .write(
                &mut w,
                "lines",
                &Payload::Value(Value::Sequence(vec![Value::Struct(
                    StructValue::new("Line").with("Sku", "B").with("Qty", 1),
                )])),
            )
            .unwrap();
        let mut r = DocumentReader::new(w.finish().unwrap()).unwrap();
        r.read_start().unwrap();
        assert_eq!(r.read_start().unwrap().name, "Line");
    }

    #[test]
    fn test_derived_type_carries_type_attribute() {
        let codec = Codec::new(TypeDescriptor::Entity("Order".into()), table());
        let mut rush = order(2);
        rush.type_name = "RushOrder".to_string();
        rush.set("Courier", "Fast Ltd");

        let mut w = DocumentWriter::new();
        codec
            .write(&mut w, "o", &Payload::Value(Value::Struct(rush.clone())))
            .unwrap();
        let bytes = w.finish().unwrap();
        let start = DocumentReader::new(bytes.clone()).unwrap().read_start().unwrap();
        assert_eq!(start.attribute("type"), Some(&TextValue::chars("RushOrder")));

        let mut r = DocumentReader::new(bytes).unwrap();
        assert_eq!(codec.read(&mut r).unwrap(), Payload::Value(Value::Struct(rush)));
    }

    #[test]
    fn test_unrelated_runtime_type_rejected() {
        let codec = Codec::new(TypeDescriptor::Entity("Order".into()), table());
        let mut w = DocumentWriter::new();
        let err = codec
            .write(
                &mut w,
                "o",
                &Payload::Value(Value::Struct(StructValue::new("Line").with("Sku", "x"))),
            )
            .unwrap_err();
        assert!(matches!(err, CodecError::UnregisteredKnownType(name) if name == "Line"));
    }

    #[test]
    fn test_unknown_member_on_write() {
        let codec = Codec::new(TypeDescriptor::Complex("Line".into()), table());
        let mut w = DocumentWriter::new();
        let err = codec
            .write(
                &mut w,
                "l",
                &Payload::Value(Value::Struct(StructValue::new("Line").with("Colour", "red"))),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Colour"));
    }

    #[test]
    fn test_unknown_member_skipped_on_read() {
        let mut w = DocumentWriter::new();
        w.start_element("l").unwrap();
        w.element_text("Sku", &TextValue::chars("S")).unwrap();
        w.start_element("Extra").unwrap();
        w.element_text("Deep", &TextValue::Int64(1)).unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();

        let codec = Codec::new(TypeDescriptor::Complex("Line".into()), table());
        let mut r = DocumentReader::new(w.finish().unwrap()).unwrap();
        let value = codec.read(&mut r).unwrap().into_value().unwrap();
        let line = value.as_struct().unwrap();
        assert_eq!(line.get("Sku"), Some(&Value::String("S".into())));
        assert_eq!(line.get("Qty"), Some(&Value::Null));
    }

    #[test]
    fn test_int32_range_checked() {
        let codec = Codec::new(TypeDescriptor::Int32, table());
        let mut w = DocumentWriter::new();
        assert!(matches!(
            codec.write(&mut w, "n", &Payload::Value(Value::Int(i64::MAX))),
            Err(CodecError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_map_entries() {
        let codec = Codec::new(
            TypeDescriptor::map(
                crate::schema::MapShape::HashMap,
                TypeDescriptor::String,
                TypeDescriptor::Double,
            ),
            table(),
        );
        let value = Payload::Value(Value::Map(vec![
            ("a".into(), Value::Double(1.5)),
            ("b".into(), Value::Null),
        ]));
        assert_eq!(write_then_read(&codec, &value), value);
    }

    #[test]
    fn test_null_written_as_nil() {
        let codec = Codec::new(TypeDescriptor::String, table());
        let mut w = DocumentWriter::new();
        codec.write(&mut w, "s", &Payload::Value(Value::Null)).unwrap();
        let start = DocumentReader::new(w.finish().unwrap())
            .unwrap()
            .read_start()
            .unwrap();
        assert!(start.is_nil());
    }

    fn change_set_codec() -> Codec {
        let mut known = KnownTypeSet::new();
        known.insert(TypeDescriptor::sequence_of(TypeDescriptor::Int32));
        Codec::with_known_types(TypeDescriptor::ChangeSet, table(), Arc::new(known))
    }

    #[test]
    fn test_change_set_entries() {
        let codec = change_set_codec();
        let mut updated = ChangeSetEntry::update(1, order(1), order(1))
            .with_action(
                EntityAction::new("Split")
                    .arg(vec![Value::Int(1), Value::Int(2)])
                    .arg(Value::Null),
            );
        updated.conflict_members.push("Status".to_string());
        updated
            .validation_errors
            .push(ValidationError::new("Too many lines").member("Lines"));
        updated.store_entity = Some(order(1));
        let payload = Payload::ChangeSet(vec![ChangeSetEntry::insert(0, order(5)), updated]);

        assert_eq!(write_then_read(&codec, &payload), payload);
    }

    #[test]
    fn test_action_parameters_carry_type() {
        let codec = change_set_codec();
        let entry = ChangeSetEntry::custom(3, order(3))
            .with_action(EntityAction::new("Split").arg(vec![Value::Int(1)]).arg("why"));
        let mut w = DocumentWriter::new();
        codec
            .write(&mut w, "changeSet", &Payload::ChangeSet(vec![entry]))
            .unwrap();

        let mut r = DocumentReader::new(w.finish().unwrap()).unwrap();
        let mut types = Vec::new();
        while let Some(node) = r.read_node().unwrap() {
            if let ropc_protocol::Node::Start(start) = node {
                if start.local_name() == "Parameter" {
                    types.push(start.attribute("type").unwrap().as_str().unwrap().to_string());
                }
            }
        }
        assert_eq!(types, vec!["ArrayOfint", "string"]);
    }

    #[test]
    fn test_unregistered_action_parameter_type() {
        let codec = Codec::with_known_types(
            TypeDescriptor::ChangeSet,
            table(),
            Arc::new(KnownTypeSet::new()),
        );
        let entry = ChangeSetEntry::custom(3, order(3))
            .with_action(EntityAction::new("Split").arg(vec![Value::Int(1)]).arg("why"));
        let mut w = DocumentWriter::new();
        let err = codec
            .write(&mut w, "changeSet", &Payload::ChangeSet(vec![entry]))
            .unwrap_err();
        assert!(matches!(err, CodecError::UnregisteredKnownType(name) if name == "ArrayOfint"));
    }

    #[test]
    fn test_known_type_set_keyed_by_wire_name() {
        let mut known = KnownTypeSet::new();
        assert!(known.insert(TypeDescriptor::sequence_of(TypeDescriptor::String)));
        assert!(!known.insert(TypeDescriptor::sequence_of(TypeDescriptor::String)));
        assert!(known.contains("ArrayOfstring"));
        assert!(known.contains_type(&TypeDescriptor::sequence_of(TypeDescriptor::String)));
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn test_query_text_checks_declared_type() {
        let codec = Codec::new(TypeDescriptor::String, table());
        assert_eq!(codec.query_text(&"WA".into()).unwrap(), "WA");
        assert!(matches!(
            codec.query_text(&Value::Int(42)),
            Err(CodecError::TypeMismatch { .. })
        ));

        let status = Codec::new(TypeDescriptor::Enum("Status".into()), table());
        assert!(matches!(
            status.query_text(&Value::Enum("Lost".into())),
            Err(CodecError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_query_text_names_derived_type() {
        let codec = Codec::new(TypeDescriptor::Entity("Order".into()), table());
        let mut rush = order(5);
        rush.type_name = "RushOrder".to_string();
        rush.set("Courier", "DHL");

        let text = codec.query_text(&Value::Struct(rush)).unwrap();
        assert!(text.starts_with(r#"{"$type":"RushOrder","#));
    }
}
