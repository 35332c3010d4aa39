// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Statically supplied operation and type metadata.
//!
//! Remote interfaces are described by plain tables instead of being
//! discovered at runtime: a code generator (or a hand-written module) builds
//! an [`InterfaceDescriptor`] and hands it to the client through a
//! [`MetadataProvider`].

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Shape of an ordered collection. All shapes share one wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionShape {
    /// Canonical shape
    Sequence,
    List,
    Array,
    Set,
    Queue,
}

/// Shape of a keyed pair collection. All shapes share one wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapShape {
    /// Canonical shape
    Map,
    HashMap,
    BTreeMap,
    PairList,
}

/// Type of a parameter, field or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeDescriptor {
    String,
    Boolean,
    Int32,
    Int64,
    Double,
    Bytes,
    /// Date/time whose offset kind may be unspecified
    DateTime,
    /// Date/time that always carries an offset
    DateTimeOffset,
    Enum(String),
    Complex(String),
    Entity(String),
    Nullable(Box<TypeDescriptor>),
    Collection {
        shape: CollectionShape,
        element: Box<TypeDescriptor>,
    },
    Map {
        shape: MapShape,
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    /// The change-set collection sent by submit operations
    ChangeSet,
}

impl TypeDescriptor {
    pub fn nullable(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Nullable(Box::new(inner))
    }

    pub fn sequence_of(element: TypeDescriptor) -> Self {
        Self::collection(CollectionShape::Sequence, element)
    }

    pub fn list_of(element: TypeDescriptor) -> Self {
        Self::collection(CollectionShape::List, element)
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        Self::collection(CollectionShape::Array, element)
    }

    pub fn collection(shape: CollectionShape, element: TypeDescriptor) -> Self {
        TypeDescriptor::Collection {
            shape,
            element: Box::new(element),
        }
    }

    pub fn map_of(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::map(MapShape::Map, key, value)
    }

    pub fn map(shape: MapShape, key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Map {
            shape,
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Types that never need explicit registration.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::String
                | TypeDescriptor::Boolean
                | TypeDescriptor::Int32
                | TypeDescriptor::Int64
                | TypeDescriptor::Double
                | TypeDescriptor::Bytes
                | TypeDescriptor::DateTime
        )
    }

    /// Map every collection shape to its canonical representative.
    pub fn canonical(&self) -> TypeDescriptor {
        match self {
            TypeDescriptor::Nullable(inner) => TypeDescriptor::nullable(inner.canonical()),
            TypeDescriptor::Collection { element, .. } => {
                TypeDescriptor::sequence_of(element.canonical())
            }
            TypeDescriptor::Map { key, value, .. } => {
                TypeDescriptor::map_of(key.canonical(), value.canonical())
            }
            other => other.clone(),
        }
    }

    /// Name used for this type on the wire.
    ///
    /// Independent of collection shape, so every concrete collection of the
    /// same element type is written under one name.
    pub fn wire_name(&self) -> String {
        match self {
            TypeDescriptor::String => "string".to_string(),
            TypeDescriptor::Boolean => "boolean".to_string(),
            TypeDescriptor::Int32 => "int".to_string(),
            TypeDescriptor::Int64 => "long".to_string(),
            TypeDescriptor::Double => "double".to_string(),
            TypeDescriptor::Bytes => "base64Binary".to_string(),
            TypeDescriptor::DateTime => "dateTime".to_string(),
            TypeDescriptor::DateTimeOffset => "DateTimeOffset".to_string(),
            TypeDescriptor::Enum(name)
            | TypeDescriptor::Complex(name)
            | TypeDescriptor::Entity(name) => name.clone(),
            TypeDescriptor::Nullable(inner) => inner.wire_name(),
            TypeDescriptor::Collection { element, .. } => {
                format!("ArrayOf{}", element.wire_name())
            }
            TypeDescriptor::Map { key, value, .. } => {
                format!("ArrayOfKeyValueOf{}{}", key.wire_name(), value.wire_name())
            }
            TypeDescriptor::ChangeSet => "ArrayOfChangeSetEntry".to_string(),
        }
    }

    /// Resolve the wire name of a primitive type.
    pub fn primitive_from_wire_name(name: &str) -> Option<TypeDescriptor> {
        match name {
            "string" => Some(TypeDescriptor::String),
            "boolean" => Some(TypeDescriptor::Boolean),
            "int" => Some(TypeDescriptor::Int32),
            "long" => Some(TypeDescriptor::Int64),
            "double" => Some(TypeDescriptor::Double),
            "base64Binary" => Some(TypeDescriptor::Bytes),
            "dateTime" => Some(TypeDescriptor::DateTime),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Nullable(inner) => write!(f, "{}?", inner),
            other => f.write_str(&other.wire_name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Named action attached to an entity type and executed during submit.
///
/// The first parameter is always the owning entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomActionDescriptor {
    pub name: String,
    pub parameters: Vec<ParameterDescriptor>,
}

impl CustomActionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.parameters.push(ParameterDescriptor::new(name, ty));
        self
    }

    /// Parameters after the owning entity.
    pub fn value_parameters(&self) -> &[ParameterDescriptor] {
        self.parameters.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    Entity,
    Complex,
}

/// Entity or complex type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    pub name: String,
    pub kind: StructKind,
    pub fields: Vec<FieldDescriptor>,
    /// Names of types declared as deriving from this one
    pub derived_types: Vec<String>,
    pub custom_actions: Vec<CustomActionDescriptor>,
}

impl StructType {
    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, StructKind::Entity)
    }

    pub fn complex(name: impl Into<String>) -> Self {
        Self::new(name, StructKind::Complex)
    }

    fn new(name: impl Into<String>, kind: StructKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: Vec::new(),
            derived_types: Vec::new(),
            custom_actions: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn derived(mut self, name: impl Into<String>) -> Self {
        self.derived_types.push(name.into());
        self
    }

    pub fn custom_action(mut self, action: CustomActionDescriptor) -> Self {
        self.custom_actions.push(action);
        self
    }

    pub fn descriptor(&self) -> TypeDescriptor {
        match self.kind {
            StructKind::Entity => TypeDescriptor::Entity(self.name.clone()),
            StructKind::Complex => TypeDescriptor::Complex(self.name.clone()),
        }
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn action_named(&self, name: &str) -> Option<&CustomActionDescriptor> {
        self.custom_actions.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub members: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Invoke,
    Submit,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Query => "query",
            OperationKind::Invoke => "invoke",
            OperationKind::Submit => "submit",
        })
    }
}

/// Name of the change-set parameter of a submit operation
pub const CHANGE_SET_PARAMETER: &str = "changeSet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: String,
    pub kind: OperationKind,
    pub has_side_effects: bool,
    pub parameters: Vec<ParameterDescriptor>,
    /// `None` for operations returning nothing
    pub return_type: Option<TypeDescriptor>,
}

impl OperationDescriptor {
    /// A read operation without side effects.
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Query,
            has_side_effects: false,
            parameters: Vec::new(),
            return_type: None,
        }
    }

    /// A named action without side effects unless marked otherwise.
    pub fn invoke(name: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Invoke,
            ..Self::query(name)
        }
    }

    /// A change-set submission, which always has side effects.
    pub fn submit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Submit,
            has_side_effects: true,
            parameters: vec![ParameterDescriptor::new(
                CHANGE_SET_PARAMETER,
                TypeDescriptor::ChangeSet,
            )],
            return_type: Some(TypeDescriptor::ChangeSet),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.parameters.push(ParameterDescriptor::new(name, ty));
        self
    }

    pub fn returns(mut self, ty: TypeDescriptor) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_side_effects(mut self, has_side_effects: bool) -> Self {
        self.has_side_effects = has_side_effects;
        self
    }
}

/// Everything the client knows about one remote interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub id: String,
    pub operations: Vec<OperationDescriptor>,
    /// Entity types exposed by the interface
    pub entity_types: Vec<StructType>,
    /// Complex types exposed by the interface
    pub complex_types: Vec<StructType>,
    /// Types reachable only through derived-type declarations
    pub derived_types: Vec<StructType>,
    pub enums: Vec<EnumType>,
}

impl InterfaceDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operations: Vec::new(),
            entity_types: Vec::new(),
            complex_types: Vec::new(),
            derived_types: Vec::new(),
            enums: Vec::new(),
        }
    }

    pub fn operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn entity(mut self, ty: StructType) -> Self {
        self.entity_types.push(ty);
        self
    }

    pub fn complex(mut self, ty: StructType) -> Self {
        self.complex_types.push(ty);
        self
    }

    pub fn derived(mut self, ty: StructType) -> Self {
        self.derived_types.push(ty);
        self
    }

    pub fn enumeration(mut self, ty: EnumType) -> Self {
        self.enums.push(ty);
        self
    }

    /// Names of the entity and complex types the interface exposes directly.
    pub fn exposed_type_names(&self) -> HashSet<&str> {
        self.entity_types
            .iter()
            .chain(&self.complex_types)
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// Name lookup over every struct and enum definition of an interface.
#[derive(Debug, Default)]
pub struct TypeTable {
    structs: HashMap<String, StructType>,
    enums: HashMap<String, EnumType>,
}

impl TypeTable {
    pub fn from_interface(descriptor: &InterfaceDescriptor) -> Self {
        let structs = descriptor
            .entity_types
            .iter()
            .chain(&descriptor.complex_types)
            .chain(&descriptor.derived_types)
            .map(|t| (t.name.clone(), t.clone()))
            .collect();
        let enums = descriptor
            .enums
            .iter()
            .map(|e| (e.name.clone(), e.clone()))
            .collect();
        Self { structs, enums }
    }

    pub fn structure(&self, name: &str) -> Option<&StructType> {
        self.structs.get(name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumType> {
        self.enums.get(name)
    }

    /// Whether `actual` is `base` or declared (transitively) as derived from it.
    pub fn is_assignable(&self, base: &str, actual: &str) -> bool {
        if base == actual {
            return true;
        }
        let mut visited = HashSet::new();
        let mut stack = vec![base];
        while let Some(name) = stack.pop() {
            if !visited.insert(name) {
                continue;
            }
            let Some(def) = self.structs.get(name) else {
                continue;
            };
            for derived in &def.derived_types {
                if derived == actual {
                    return true;
                }
                stack.push(derived.as_str());
            }
        }
        false
    }
}

/// Source of interface metadata consumed by the client.
pub trait MetadataProvider: Send + Sync {
    /// Describe the interface, or `None` when it is unknown.
    fn interface(&self, interface_id: &str) -> Option<InterfaceDescriptor>;
}

/// Table-backed [`MetadataProvider`].
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    interfaces: HashMap<String, InterfaceDescriptor>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(mut self, descriptor: InterfaceDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn register(&mut self, descriptor: InterfaceDescriptor) {
        self.interfaces.insert(descriptor.id.clone(), descriptor);
    }
}

impl MetadataProvider for StaticMetadata {
    fn interface(&self, interface_id: &str) -> Option<InterfaceDescriptor> {
        self.interfaces.get(interface_id).cloned()
    }
}
