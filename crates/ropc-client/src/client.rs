// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RemoteClient for calling operations of one remote interface.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::codec::Payload;
use crate::config::ClientConfig;
use crate::decoder::{DecodedResponse, decode_response};
use crate::encoder::BoundParameter;
use crate::error::{ClientError, Result};
use crate::registry::{InterfaceEntry, TypeRegistry};
use crate::schema::{CHANGE_SET_PARAMETER, OperationDescriptor, OperationKind, TypeDescriptor};
use crate::transport::{HttpTransport, ReqwestTransport, TransportSelector};
use crate::types::{
    ChangeSetEntry, InvokeResult, Parameters, QueryPart, QueryResult, SubmitResult,
};
use crate::value::Value;

/// Client for the query, invoke and submit operations of one interface.
///
/// Each call is a single encode/send/decode attempt. Calls are independent
/// and may run concurrently; the only shared state is the [`TypeRegistry`].
pub struct RemoteClient {
    interface_id: String,
    registry: Arc<TypeRegistry>,
    selector: TransportSelector,
    config: ClientConfig,
}

impl RemoteClient {
    /// Create a client that sends requests through `transport`.
    pub fn new(
        config: ClientConfig,
        interface_id: impl Into<String>,
        registry: Arc<TypeRegistry>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let interface_id = interface_id.into();
        let selector = TransportSelector::new(transport, &config);
        info!(
            interface = %interface_id,
            base_uri = %config.base_uri,
            "Created remote client"
        );
        Ok(Self {
            interface_id,
            registry,
            selector,
            config,
        })
    }

    /// Create a client using the reqwest transport.
    pub fn from_config(
        config: ClientConfig,
        interface_id: impl Into<String>,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Self::new(config, interface_id, registry, transport)
    }

    pub fn interface_id(&self) -> &str {
        &self.interface_id
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Run a query, applying `query` parts on the server in order.
    ///
    /// A result that is not a sequence is returned as a single item; a null
    /// result yields no items.
    #[instrument(skip(self, params, query, cancel), fields(interface = %self.interface_id))]
    pub async fn query(
        &self,
        operation: &str,
        params: Parameters,
        query: &[QueryPart],
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let (entry, op) = self.resolve(operation, OperationKind::Query)?;
        let bound = self.bind(&entry, &op, params)?;

        match self.call(&entry, &op, &bound, query, cancel).await? {
            DecodedResponse::Payload {
                payload,
                total_count,
            } => {
                let items = match payload.into_value() {
                    Some(Value::Sequence(items)) => items,
                    Some(Value::Null) | None => Vec::new(),
                    Some(single) => {
                        debug!("Query returned a single value, wrapping it as one item");
                        vec![single]
                    }
                };
                debug!(items = items.len(), ?total_count, "Query completed");
                Ok(QueryResult {
                    items,
                    total_count,
                    validation_errors: Vec::new(),
                })
            }
            DecodedResponse::ValidationFailure(errors) => Ok(QueryResult {
                items: Vec::new(),
                total_count: None,
                validation_errors: errors,
            }),
        }
    }

    /// Invoke a named operation.
    #[instrument(skip(self, params, cancel), fields(interface = %self.interface_id))]
    pub async fn invoke(
        &self,
        operation: &str,
        params: Parameters,
        cancel: &CancellationToken,
    ) -> Result<InvokeResult> {
        let (entry, op) = self.resolve(operation, OperationKind::Invoke)?;
        let bound = self.bind(&entry, &op, params)?;

        match self.call(&entry, &op, &bound, &[], cancel).await? {
            DecodedResponse::Payload { payload, .. } => Ok(InvokeResult {
                value: payload.into_value().unwrap_or(Value::Null),
                validation_errors: Vec::new(),
            }),
            DecodedResponse::ValidationFailure(errors) => Ok(InvokeResult {
                value: Value::Null,
                validation_errors: errors,
            }),
        }
    }

    /// Submit a change-set and return the entries as merged by the server.
    #[instrument(skip(self, entries, cancel), fields(interface = %self.interface_id, entries = entries.len()))]
    pub async fn submit(
        &self,
        operation: &str,
        entries: Vec<ChangeSetEntry>,
        cancel: &CancellationToken,
    ) -> Result<SubmitResult> {
        let (entry, op) = self.resolve(operation, OperationKind::Submit)?;
        let name = entry
            .parameters_for(&op.name)?
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| CHANGE_SET_PARAMETER.to_string());
        let bound = [BoundParameter::new(
            name,
            Payload::ChangeSet(entries),
            entry.serializer_for(&TypeDescriptor::ChangeSet),
        )];

        match self.call(&entry, &op, &bound, &[], cancel).await? {
            DecodedResponse::Payload { payload, .. } => {
                let entries = payload.into_change_set().ok_or_else(|| {
                    ClientError::MalformedResponse {
                        expected: "change-set".to_string(),
                        found: "value".to_string(),
                    }
                })?;
                Ok(SubmitResult { entries })
            }
            DecodedResponse::ValidationFailure(errors) => Err(ClientError::ValidationFailed(errors)),
        }
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn resolve(
        &self,
        operation: &str,
        kind: OperationKind,
    ) -> Result<(Arc<InterfaceEntry>, Arc<OperationDescriptor>)> {
        let entry = self.registry.interface(&self.interface_id)?;
        let op = entry.operation(operation)?;
        if op.kind != kind {
            return Err(ClientError::KindMismatch {
                operation: operation.to_string(),
                expected: kind,
                actual: op.kind,
            });
        }
        Ok((entry, op))
    }

    /// Bind named values to the declared parameters; missing ones are null.
    fn bind(
        &self,
        entry: &InterfaceEntry,
        op: &OperationDescriptor,
        mut params: Parameters,
    ) -> Result<Vec<BoundParameter>> {
        let declared = entry.parameters_for(&op.name)?;
        if let Some(unknown) = params
            .names()
            .find(|name| !declared.iter().any(|p| p.name == *name))
        {
            return Err(ClientError::UnknownParameter {
                operation: op.name.clone(),
                parameter: unknown.to_string(),
            });
        }

        Ok(declared
            .iter()
            .map(|p| {
                let value = params.take(&p.name).unwrap_or(Value::Null);
                BoundParameter::new(p.name.clone(), value, entry.serializer_for(&p.ty))
            })
            .collect())
    }

    async fn call(
        &self,
        entry: &InterfaceEntry,
        op: &OperationDescriptor,
        bound: &[BoundParameter],
        query: &[QueryPart],
        cancel: &CancellationToken,
    ) -> Result<DecodedResponse> {
        let response = self
            .selector
            .execute(&op.name, op.has_side_effects, bound, query, cancel)
            .await?;
        let codec = op.return_type.as_ref().map(|ty| entry.serializer_for(ty));
        decode_response(
            response,
            op,
            codec.as_deref(),
            self.config.max_response_size,
            self.config.include_exception_details,
            cancel,
        )
        .await
    }
}
