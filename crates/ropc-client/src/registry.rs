// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-interface cache of operation metadata, codecs and known types.
//!
//! A [`TypeRegistry`] is owned by the client (usually shared through an
//! `Arc` between clients of the same interface). Every cache is populated
//! on first use and never mutated afterwards, so later lookups only take a
//! shard read lock or read an initialized `OnceCell`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::codec::{Codec, KnownTypeSet};
use crate::error::{ClientError, Result};
use crate::schema::{
    InterfaceDescriptor, MetadataProvider, OperationDescriptor, ParameterDescriptor,
    TypeDescriptor, TypeTable,
};

/// Cached state of one remote interface.
#[derive(Debug)]
pub struct InterfaceEntry {
    descriptor: InterfaceDescriptor,
    types: Arc<TypeTable>,
    operations: HashMap<String, Arc<OperationDescriptor>>,
    parameters: HashMap<String, Arc<[ParameterDescriptor]>>,
    serializers: DashMap<TypeDescriptor, Arc<Codec>>,
    change_set: OnceCell<Arc<Codec>>,
    known_types: OnceCell<Arc<KnownTypeSet>>,
}

impl InterfaceEntry {
    fn new(descriptor: InterfaceDescriptor) -> Self {
        let types = Arc::new(TypeTable::from_interface(&descriptor));
        let operations = descriptor
            .operations
            .iter()
            .map(|op| (op.name.clone(), Arc::new(op.clone())))
            .collect();
        let parameters = descriptor
            .operations
            .iter()
            .map(|op| (op.name.clone(), Arc::from(op.parameters.clone())))
            .collect();
        Self {
            descriptor,
            types,
            operations,
            parameters,
            serializers: DashMap::new(),
            change_set: OnceCell::new(),
            known_types: OnceCell::new(),
        }
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }

    pub fn types(&self) -> &Arc<TypeTable> {
        &self.types
    }

    pub fn operation(&self, name: &str) -> Result<Arc<OperationDescriptor>> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| self.missing_operation(name))
    }

    pub fn parameters_for(&self, operation: &str) -> Result<Arc<[ParameterDescriptor]>> {
        self.parameters
            .get(operation)
            .cloned()
            .ok_or_else(|| self.missing_operation(operation))
    }

    /// Codec for `ty`; the change-set type gets the known-type codec.
    pub fn serializer_for(&self, ty: &TypeDescriptor) -> Arc<Codec> {
        if *ty == TypeDescriptor::ChangeSet {
            return self.change_set_codec();
        }
        let key = ty.canonical();
        if let Some(codec) = self.serializers.get(&key) {
            return codec.clone();
        }
        self.serializers
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(interface = %self.descriptor.id, ty = %key, "Creating serializer");
                Arc::new(Codec::new(key, self.types.clone()))
            })
            .clone()
    }

    pub fn known_types(&self) -> Arc<KnownTypeSet> {
        self.known_types
            .get_or_init(|| {
                let known = compute_known_types(&self.descriptor, &self.types);
                debug!(
                    interface = %self.descriptor.id,
                    count = known.len(),
                    "Computed known types"
                );
                Arc::new(known)
            })
            .clone()
    }

    fn change_set_codec(&self) -> Arc<Codec> {
        self.change_set
            .get_or_init(|| {
                Arc::new(Codec::with_known_types(
                    TypeDescriptor::ChangeSet,
                    self.types.clone(),
                    self.known_types(),
                ))
            })
            .clone()
    }

    fn missing_operation(&self, name: &str) -> ClientError {
        ClientError::MissingOperation {
            interface: self.descriptor.id.clone(),
            operation: name.to_string(),
        }
    }
}

/// Registry of interface caches, keyed by interface id.
pub struct TypeRegistry {
    metadata: Arc<dyn MetadataProvider>,
    interfaces: DashMap<String, Arc<InterfaceEntry>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("interfaces", &self.interfaces.len())
            .finish_non_exhaustive()
    }
}

impl TypeRegistry {
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            metadata,
            interfaces: DashMap::new(),
        }
    }

    /// Cached entry for `interface_id`, resolving its metadata on first use.
    pub fn interface(&self, interface_id: &str) -> Result<Arc<InterfaceEntry>> {
        if let Some(entry) = self.interfaces.get(interface_id) {
            return Ok(entry.clone());
        }
        let descriptor = self
            .metadata
            .interface(interface_id)
            .ok_or_else(|| ClientError::MissingInterface(interface_id.to_string()))?;
        let entry = self
            .interfaces
            .entry(interface_id.to_string())
            .or_insert_with(|| {
                debug!(
                    interface = interface_id,
                    operations = descriptor.operations.len(),
                    "Registered interface"
                );
                Arc::new(InterfaceEntry::new(descriptor))
            })
            .clone();
        Ok(entry)
    }

    pub fn operation(&self, interface_id: &str, name: &str) -> Result<Arc<OperationDescriptor>> {
        self.interface(interface_id)?.operation(name)
    }

    pub fn parameters_for(
        &self,
        interface_id: &str,
        operation: &str,
    ) -> Result<Arc<[ParameterDescriptor]>> {
        self.interface(interface_id)?.parameters_for(operation)
    }

    pub fn serializer_for(&self, interface_id: &str, ty: &TypeDescriptor) -> Result<Arc<Codec>> {
        Ok(self.interface(interface_id)?.serializer_for(ty))
    }

    pub fn known_types(&self, interface_id: &str) -> Result<Arc<KnownTypeSet>> {
        Ok(self.interface(interface_id)?.known_types())
    }
}

/// Closure of types that may appear polymorphically in a change-set.
///
/// Walks every exposed entity and complex type and its derived types, then
/// classifies the value parameters of each custom action.
fn compute_known_types(descriptor: &InterfaceDescriptor, types: &TypeTable) -> KnownTypeSet {
    let roots = descriptor.exposed_type_names();
    let mut known = KnownTypeSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = roots.iter().map(|name| name.to_string()).collect();

    while let Some(name) = stack.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        let Some(def) = types.structure(&name) else {
            continue;
        };
        if !roots.contains(name.as_str()) {
            known.insert(def.descriptor());
        }
        stack.extend(def.derived_types.iter().cloned());

        for action in &def.custom_actions {
            for param in action.value_parameters() {
                register_parameter_type(&param.ty, &roots, &mut known);
            }
        }
    }
    known
}

fn register_parameter_type(ty: &TypeDescriptor, roots: &HashSet<&str>, known: &mut KnownTypeSet) {
    let mut pending = vec![ty.clone()];
    while let Some(ty) = pending.pop() {
        match ty {
            TypeDescriptor::Nullable(inner) => pending.push(*inner),
            TypeDescriptor::String
            | TypeDescriptor::Boolean
            | TypeDescriptor::Int32
            | TypeDescriptor::Int64
            | TypeDescriptor::Double
            | TypeDescriptor::Bytes
            | TypeDescriptor::DateTime
            | TypeDescriptor::ChangeSet => {}
            TypeDescriptor::Enum(_) | TypeDescriptor::DateTimeOffset => {
                known.insert(ty);
            }
            TypeDescriptor::Collection { ref element, .. } => {
                pending.push((**element).clone());
                known.insert(ty.canonical());
            }
            TypeDescriptor::Map {
                ref key, ref value, ..
            } => {
                pending.push((**key).clone());
                pending.push((**value).clone());
                known.insert(ty.canonical());
            }
            TypeDescriptor::Complex(ref name) | TypeDescriptor::Entity(ref name)
                if roots.contains(name.as_str()) => {}
            TypeDescriptor::Complex(_) | TypeDescriptor::Entity(_) => {
                known.insert(ty);
            }
        }
    }
}
