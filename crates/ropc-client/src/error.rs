// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for ropc-client.

use ropc_protocol::DocumentError;
use thiserror::Error;

use crate::codec::CodecError;
use crate::fault::Fault;
use crate::schema::OperationKind;
use crate::transport::TransportError;
use crate::types::ValidationError;

/// Result type using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Non-success HTTP status without a structured fault body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status}: {body}")]
pub struct HttpStatusError {
    pub status: u16,
    pub body: String,
}

/// Errors that can occur when calling a remote interface.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// No metadata is available for the interface.
    #[error("missing interface metadata: {0}")]
    MissingInterface(String),

    /// The interface declares no operation with this name.
    #[error("missing operation metadata: {interface}.{operation}")]
    MissingOperation { interface: String, operation: String },

    /// Operation called through the wrong entry point.
    #[error("operation {operation} is a {actual} operation, not {expected}")]
    KindMismatch {
        operation: String,
        expected: OperationKind,
        actual: OperationKind,
    },

    #[error("operation {operation} has no parameter named {parameter}")]
    UnknownParameter { operation: String, parameter: String },

    /// Response element names violate the protocol.
    #[error("malformed response: expected <{expected}>, found <{found}>")]
    MalformedResponse { expected: String, found: String },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Server failure. The stack trace is only kept when exception details
    /// are enabled in the client configuration.
    #[error("server error [{code}]: {message}")]
    Server {
        code: i32,
        message: String,
        stack_trace: Option<String>,
    },

    /// Server-declared domain rule violation.
    #[error("business rule violation [{code}]: {message}")]
    BusinessRule {
        code: i32,
        message: String,
        stack_trace: Option<String>,
    },

    /// Field-level validation errors on a submit.
    #[error("validation failed: {}", join_errors(.0))]
    ValidationFailed(Vec<ValidationError>),

    /// Fault without a structured detail payload.
    #[error("protocol fault: {0}")]
    ProtocolFault(Fault),

    /// 404 without a structured fault, passed through unchanged.
    #[error("not found: {0}")]
    NotFound(HttpStatusError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// HTTP-equivalent status class of the error, where one applies.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::NotSupported(_) => Some(400),
            ClientError::Unauthorized(_) => Some(401),
            ClientError::NotFound(err) => Some(err.status),
            ClientError::Server { .. } | ClientError::MalformedResponse { .. } => Some(500),
            _ => None,
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
