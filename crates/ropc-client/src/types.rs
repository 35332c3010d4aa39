// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request and result types of remote calls.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;

use crate::codec::CodecError;
use crate::value::{StructValue, Value};

/// One query composition directive, e.g. `("take", "10")`.
///
/// Parts are applied by the server in the order they were sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPart {
    pub operator: String,
    pub expression: String,
}

impl QueryPart {
    pub fn new(operator: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            expression: expression.into(),
        }
    }

    pub fn filter(expression: impl Into<String>) -> Self {
        Self::new("where", expression)
    }

    pub fn order_by(expression: impl Into<String>) -> Self {
        Self::new("orderby", expression)
    }

    pub fn skip(count: usize) -> Self {
        Self::new("skip", count.to_string())
    }

    pub fn take(count: usize) -> Self {
        Self::new("take", count.to_string())
    }

    pub fn select(expression: impl Into<String>) -> Self {
        Self::new("select", expression)
    }

    /// Ask the server to report the unpaged total in the result.
    pub fn include_total_count() -> Self {
        Self::new("includeTotalCount", "True")
    }
}

/// Field-level validation error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub message: String,
    pub member_names: Vec<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            member_names: Vec::new(),
        }
    }

    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.member_names.push(name.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.member_names.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{} ({})", self.message, self.member_names.join(", "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
    /// Entity carries custom actions only
    Custom,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "Insert",
            ChangeOperation::Update => "Update",
            ChangeOperation::Delete => "Delete",
            ChangeOperation::Custom => "Custom",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Insert" => Ok(ChangeOperation::Insert),
            "Update" => Ok(ChangeOperation::Update),
            "Delete" => Ok(ChangeOperation::Delete),
            "Custom" | "None" => Ok(ChangeOperation::Custom),
            other => Err(CodecError::InvalidValue {
                ty: "ChangeOperation".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Invocation of a custom action declared on the entity's type.
///
/// `parameters` excludes the owning entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityAction {
    pub name: String,
    pub parameters: Vec<Value>,
}

impl EntityAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.parameters.push(value.into());
        self
    }
}

/// One mutation unit of a change-set.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSetEntry {
    /// Correlates the request entry with the returned one
    pub id: i32,
    pub operation: ChangeOperation,
    pub entity: StructValue,
    /// Snapshot used for optimistic concurrency on update
    pub original: Option<StructValue>,
    pub actions: Vec<EntityAction>,
    pub conflict_members: Vec<String>,
    /// Current server state, returned on conflict
    pub store_entity: Option<StructValue>,
    pub validation_errors: Vec<ValidationError>,
}

impl ChangeSetEntry {
    pub fn new(id: i32, operation: ChangeOperation, entity: StructValue) -> Self {
        Self {
            id,
            operation,
            entity,
            original: None,
            actions: Vec::new(),
            conflict_members: Vec::new(),
            store_entity: None,
            validation_errors: Vec::new(),
        }
    }

    pub fn insert(id: i32, entity: StructValue) -> Self {
        Self::new(id, ChangeOperation::Insert, entity)
    }

    pub fn update(id: i32, entity: StructValue, original: StructValue) -> Self {
        Self {
            original: Some(original),
            ..Self::new(id, ChangeOperation::Update, entity)
        }
    }

    pub fn delete(id: i32, entity: StructValue) -> Self {
        Self::new(id, ChangeOperation::Delete, entity)
    }

    pub fn custom(id: i32, entity: StructValue) -> Self {
        Self::new(id, ChangeOperation::Custom, entity)
    }

    pub fn with_action(mut self, action: EntityAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn has_conflict(&self) -> bool {
        !self.conflict_members.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.has_conflict() || !self.validation_errors.is_empty()
    }
}

/// Values bound to an operation's parameters by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: Vec<(String, Value)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<Value> {
        let index = self.values.iter().position(|(n, _)| n == name)?;
        Some(self.values.remove(index).1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub items: Vec<Value>,
    /// Unpaged count, present when requested with `includeTotalCount`
    pub total_count: Option<i64>,
    pub validation_errors: Vec<ValidationError>,
}

impl QueryResult {
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    /// Deserialize every item into `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Vec<T>, CodecError> {
        self.items.iter().map(Value::deserialize).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeResult {
    pub value: Value,
    pub validation_errors: Vec<ValidationError>,
}

impl InvokeResult {
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    pub fn typed<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        self.value.deserialize()
    }
}

/// Entries returned by a submit, with server-merged entity state.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResult {
    pub entries: Vec<ChangeSetEntry>,
}

impl SubmitResult {
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(ChangeSetEntry::has_errors)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ChangeSetEntry> {
        self.entries.iter().filter(|e| e.has_conflict())
    }

    pub fn entry(&self, id: i32) -> Option<&ChangeSetEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_query_part_helpers() {
        assert_eq!(QueryPart::filter("x > 1").operator, "where");
        assert_eq!(QueryPart::order_by("Name").operator, "orderby");
        assert_eq!(QueryPart::take(10), QueryPart::new("take", "10"));
        assert_eq!(QueryPart::skip(5).expression, "5");
        assert_eq!(
            QueryPart::include_total_count(),
            QueryPart::new("includeTotalCount", "True")
        );
    }

    #[test]
    fn test_parameters_replace_in_place() {
        let mut params = Parameters::new().with("a", 1).with("b", "x");
        params.set("a", 2);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.get("a"), Some(&Value::Int(2)));
        assert_eq!(params.take("b"), Some(Value::String("x".into())));
        assert!(params.get("b").is_none());
    }

    #[test]
    fn test_change_operation_parse() {
        assert_eq!("Update".parse::<ChangeOperation>().unwrap(), ChangeOperation::Update);
        assert_eq!("None".parse::<ChangeOperation>().unwrap(), ChangeOperation::Custom);
        assert!("Upsert".parse::<ChangeOperation>().is_err());
    }

    #[test]
    fn test_submit_result_lookup() {
        let mut conflicted = ChangeSetEntry::update(
            2,
            StructValue::new("Order").with("Id", 2),
            StructValue::new("Order").with("Id", 2),
        );
        conflicted.conflict_members.push("Total".to_string());
        let result = SubmitResult {
            entries: vec![
                ChangeSetEntry::insert(1, StructValue::new("Order").with("Id", 1)),
                conflicted,
            ],
        };
        assert!(result.has_errors());
        assert_eq!(result.conflicts().map(|e| e.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(result.entry(1).unwrap().operation, ChangeOperation::Insert);
        assert!(result.entry(3).is_none());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        name: String,
    }

    #[test]
    fn test_query_result_into_typed() {
        let result = QueryResult {
            items: vec![Value::Struct(StructValue::new("Row").with("name", "a"))],
            total_count: None,
            validation_errors: vec![],
        };
        assert_eq!(
            result.into_typed::<Row>().unwrap(),
            vec![Row { name: "a".to_string() }]
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("Required").member("Name").member("Email");
        assert_eq!(err.to_string(), "Required (Name, Email)");
    }
}
