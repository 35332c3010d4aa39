// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! ROPC Client
//!
//! Client engine for remote operation services. It turns a typed call into
//! an HTTP request carrying a binary structured document (see
//! `ropc-protocol`) and turns the response back into a typed result, a list
//! of validation errors, or a translated error.
//!
//! # Architecture
//!
//! ```text
//!   RemoteClient::{query, invoke, submit}
//!        │
//!        ├── TypeRegistry ──────── operations, codecs, known types
//!        │
//!        ├── TransportSelector ─── GET (query string) or POST (encoder)
//!        │        │
//!        │        └── HttpTransport (reqwest by default)
//!        │
//!        └── decoder ──────────── {op}Response/{op}Result or Fault
//!                 │
//!                 └── fault::translate ── ClientError taxonomy
//! ```
//!
//! Operation metadata is supplied statically through a [`MetadataProvider`];
//! nothing is discovered at runtime.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ropc_client::{
//!     ClientConfig, InterfaceDescriptor, OperationDescriptor, Parameters, QueryPart,
//!     RemoteClient, StaticMetadata, StructType, TypeDescriptor, TypeRegistry,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metadata = StaticMetadata::new().with_interface(
//!     InterfaceDescriptor::new("Crm")
//!         .entity(
//!             StructType::entity("Customer")
//!                 .field("Id", TypeDescriptor::Int32)
//!                 .field("Region", TypeDescriptor::String),
//!         )
//!         .operation(
//!             OperationDescriptor::query("GetCustomers")
//!                 .parameter("region", TypeDescriptor::String)
//!                 .returns(TypeDescriptor::sequence_of(TypeDescriptor::Entity(
//!                     "Customer".into(),
//!                 ))),
//!         ),
//! );
//! let registry = Arc::new(TypeRegistry::new(Arc::new(metadata)));
//! let client = RemoteClient::from_config(ClientConfig::from_env()?, "Crm", registry)?;
//!
//! let result = client
//!     .query(
//!         "GetCustomers",
//!         Parameters::new().with("region", "WA"),
//!         &[QueryPart::take(10)],
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{} customers", result.items.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fault;
pub mod query_string;
pub mod registry;
pub mod schema;
pub mod transport;
pub mod types;
pub mod value;

pub use client::RemoteClient;
pub use codec::{Codec, CodecError, KnownTypeSet, Payload};
pub use config::ClientConfig;
pub use error::{ClientError, HttpStatusError, Result};
pub use fault::{Fault, FaultCode, FaultDetail, FaultReason};
pub use registry::TypeRegistry;
pub use schema::{
    CollectionShape, CustomActionDescriptor, EnumType, InterfaceDescriptor, MapShape,
    MetadataProvider, OperationDescriptor, OperationKind, ParameterDescriptor, StaticMetadata,
    StructType, TypeDescriptor,
};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
    TransportSelector,
};
pub use types::{
    ChangeOperation, ChangeSetEntry, EntityAction, InvokeResult, Parameters, QueryPart,
    QueryResult, SubmitResult, ValidationError,
};
pub use value::{StructValue, Value};

pub use ropc_protocol::DateTimeValue;
