// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error formatting tests for ropc-client.

use ropc_client::{
    ClientError, Fault, FaultCode, FaultReason, HttpStatusError, OperationKind, TransportError,
    ValidationError,
};

#[test]
fn test_config_error_display() {
    let err = ClientError::Config("invalid base URI".to_string());
    assert_eq!(err.to_string(), "configuration error: invalid base URI");
}

#[test]
fn test_missing_operation_display() {
    let err = ClientError::MissingOperation {
        interface: "Crm".to_string(),
        operation: "GetOrders".to_string(),
    };
    assert_eq!(err.to_string(), "missing operation metadata: Crm.GetOrders");
}

#[test]
fn test_kind_mismatch_display() {
    let err = ClientError::KindMismatch {
        operation: "GetCustomers".to_string(),
        expected: OperationKind::Invoke,
        actual: OperationKind::Query,
    };
    assert_eq!(
        err.to_string(),
        "operation GetCustomers is a query operation, not invoke"
    );
}

#[test]
fn test_server_error_display() {
    let err = ClientError::Server {
        code: 500,
        message: "Boom".to_string(),
        stack_trace: Some("at Run()".to_string()),
    };
    assert_eq!(err.to_string(), "server error [500]: Boom");
    assert_eq!(err.status_code(), Some(500));
}

#[test]
fn test_validation_failed_display() {
    let err = ClientError::ValidationFailed(vec![
        ValidationError::new("Name is required").member("Name"),
        ValidationError::new("Too many changes"),
    ]);
    assert_eq!(
        err.to_string(),
        "validation failed: Name is required (Name); Too many changes"
    );
    assert_eq!(err.status_code(), None);
}

#[test]
fn test_protocol_fault_display() {
    let err = ClientError::ProtocolFault(Fault {
        code: Some(FaultCode {
            value: "Sender".to_string(),
            subcode: None,
        }),
        reasons: vec![FaultReason {
            lang: Some("en-US".to_string()),
            text: "Bad envelope".to_string(),
        }],
        detail: None,
    });
    assert_eq!(err.to_string(), "protocol fault: Sender: Bad envelope");
}

#[test]
fn test_not_found_display() {
    let err = ClientError::NotFound(HttpStatusError {
        status: 404,
        body: "missing".to_string(),
    });
    assert_eq!(err.to_string(), "not found: HTTP 404: missing");
    assert_eq!(err.status_code(), Some(404));
}

#[test]
fn test_transport_error_conversion() {
    let err: ClientError = TransportError::Timeout.into();
    assert!(matches!(err, ClientError::Transport(TransportError::Timeout)));
    assert!(err.to_string().starts_with("transport error:"));
}

#[test]
fn test_cancelled_display() {
    assert_eq!(ClientError::Cancelled.to_string(), "operation cancelled");
}
