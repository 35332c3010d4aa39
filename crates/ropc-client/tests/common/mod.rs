// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for ropc-client tests.
//!
//! Provides a sample interface, a recording transport and helpers for
//! building response documents.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use ropc_client::{
    ClientConfig, CustomActionDescriptor, EnumType, HttpRequest, HttpResponse, HttpTransport,
    InterfaceDescriptor, OperationDescriptor, Payload, RemoteClient, StaticMetadata, StructType,
    StructValue, TransportError, TypeDescriptor, TypeRegistry, Value,
};
use ropc_protocol::{CONTENT_TYPE, DocumentWriter, TextValue};

pub const BASE_URI: &str = "http://svc.test/Crm";

pub fn customer_type() -> TypeDescriptor {
    TypeDescriptor::Entity("Customer".to_string())
}

/// Interface with one operation of each kind.
pub fn crm_interface() -> InterfaceDescriptor {
    InterfaceDescriptor::new("Crm")
        .entity(
            StructType::entity("Customer")
                .field("Id", TypeDescriptor::Int32)
                .field("Name", TypeDescriptor::String)
                .field("Region", TypeDescriptor::String)
                .field("Tier", TypeDescriptor::nullable(TypeDescriptor::Enum("Tier".into())))
                .custom_action(
                    CustomActionDescriptor::new("Promote")
                        .parameter("customer", customer_type())
                        .parameter("tier", TypeDescriptor::Enum("Tier".into()))
                        .parameter("notes", TypeDescriptor::list_of(TypeDescriptor::String)),
                ),
        )
        .enumeration(EnumType::new("Tier", ["Standard", "Gold"]))
        .operation(
            OperationDescriptor::query("GetCustomers")
                .parameter("region", TypeDescriptor::String)
                .parameter("since", TypeDescriptor::nullable(TypeDescriptor::DateTime))
                .returns(TypeDescriptor::sequence_of(customer_type())),
        )
        .operation(
            OperationDescriptor::query("GetCustomer")
                .parameter("id", TypeDescriptor::Int32)
                .returns(customer_type()),
        )
        .operation(
            OperationDescriptor::invoke("Rename")
                .parameter("id", TypeDescriptor::Int32)
                .parameter("name", TypeDescriptor::String)
                .returns(TypeDescriptor::String)
                .with_side_effects(true),
        )
        .operation(
            OperationDescriptor::invoke("CountCustomers")
                .parameter("region", TypeDescriptor::String)
                .returns(TypeDescriptor::Int64),
        )
        .operation(OperationDescriptor::submit("SubmitChanges"))
}

pub fn registry() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::new(Arc::new(
        StaticMetadata::new().with_interface(crm_interface()),
    )))
}

pub fn customer(id: i32, name: &str, region: &str) -> StructValue {
    StructValue::new("Customer")
        .with("Id", id)
        .with("Name", name)
        .with("Region", region)
        .with("Tier", Value::Null)
}

/// Transport that records requests and replays queued responses.
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<HttpResponse>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: HttpResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Http("no response queued".to_string()))
    }
}

/// Transport whose requests never complete.
pub struct PendingTransport;

#[async_trait]
impl HttpTransport for PendingTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        std::future::pending().await
    }
}

pub fn client_with(transport: Arc<dyn HttpTransport>) -> RemoteClient {
    RemoteClient::new(
        ClientConfig::new().with_base_uri(BASE_URI),
        "Crm",
        registry(),
        transport,
    )
    .unwrap()
}

pub fn document_response(status: u16, body: Bytes) -> HttpResponse {
    HttpResponse::new(status, Some(CONTENT_TYPE), body)
}

/// `{op}Response/{op}Result` holding `payload` written with the codec of `ty`.
pub fn result_document(
    registry: &TypeRegistry,
    operation: &str,
    ty: &TypeDescriptor,
    payload: &Payload,
) -> Bytes {
    let codec = registry.serializer_for("Crm", ty).unwrap();
    let mut w = DocumentWriter::new();
    w.start_element(&format!("{}Response", operation)).unwrap();
    codec
        .write(&mut w, &format!("{}Result", operation), payload)
        .unwrap();
    w.end_element().unwrap();
    w.finish().unwrap()
}

/// Fault document. `detail` is `(error_code, message, is_domain_exception)`.
pub fn fault_document(detail: Option<(i64, &str, bool)>, validation: &[(&str, &[&str])]) -> Bytes {
    let mut w = DocumentWriter::new();
    w.start_element("Fault").unwrap();
    w.start_element("Code").unwrap();
    w.element_text("Value", &TextValue::chars("Receiver")).unwrap();
    w.end_element().unwrap();
    w.start_element("Reason").unwrap();
    w.start_element("Text").unwrap();
    w.attribute("lang", &TextValue::chars("en-US")).unwrap();
    w.text(&TextValue::chars("The operation failed")).unwrap();
    w.end_element().unwrap();
    w.end_element().unwrap();

    if let Some((code, message, domain)) = detail {
        w.start_element("Detail").unwrap();
        w.start_element("DomainServiceFault").unwrap();
        w.element_text("ErrorCode", &TextValue::Int64(code)).unwrap();
        w.element_text("ErrorMessage", &TextValue::chars(message)).unwrap();
        w.element_text("IsDomainException", &TextValue::Bool(domain)).unwrap();
        w.element_text("StackTrace", &TextValue::chars("   at Crm.Service.Run()"))
            .unwrap();
        if !validation.is_empty() {
            w.start_element("OperationErrors").unwrap();
            for (message, members) in validation {
                w.start_element("ValidationResult").unwrap();
                w.element_text("Message", &TextValue::chars(*message)).unwrap();
                w.start_element("SourceMemberNames").unwrap();
                for member in *members {
                    w.element_text("string", &TextValue::chars(*member)).unwrap();
                }
                w.end_element().unwrap();
                w.end_element().unwrap();
            }
            w.end_element().unwrap();
        }
        w.end_element().unwrap();
        w.end_element().unwrap();
    }
    w.end_element().unwrap();
    w.finish().unwrap()
}
