// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Response body decoding.

use bytes::Bytes;
use ropc_protocol::{DocumentReader, Node, TextValue};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::{Codec, Payload};
use crate::error::{ClientError, Result};
use crate::fault::{parse_fault, status_error, translate};
use crate::schema::OperationDescriptor;
use crate::transport::HttpResponse;
use crate::types::ValidationError;
use crate::value::Value;

/// Attribute of the result element carrying the unpaged item count
pub const TOTAL_COUNT_ATTRIBUTE: &str = "totalCount";

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResponse {
    Payload {
        payload: Payload,
        total_count: Option<i64>,
    },
    /// Fault carrying field-level errors on a query or invoke
    ValidationFailure(Vec<ValidationError>),
}

impl DecodedResponse {
    fn null() -> Self {
        DecodedResponse::Payload {
            payload: Payload::Value(Value::Null),
            total_count: None,
        }
    }
}

/// Read and decode a response.
///
/// A non-success status without a binary document body is turned into an
/// error from the status alone. The response is consumed, so its body is
/// released on every return path.
pub async fn decode_response(
    response: HttpResponse,
    operation: &OperationDescriptor,
    codec: Option<&Codec>,
    max_size: usize,
    include_details: bool,
    cancel: &CancellationToken,
) -> Result<DecodedResponse> {
    let status = response.status;
    if !response.is_success() && !response.has_binary_content() {
        debug!(status, "Non-success status without document body");
        let body = match response.read_body(max_size, cancel).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
            Err(e) => {
                debug!(status, error = %e, "Failed to read error response body");
                String::new()
            }
        };
        return Err(status_error(status, body));
    }

    let body = response.read_body(max_size, cancel).await?;
    decode_document(body, operation, codec, status, include_details)
}

/// Decode a complete response document.
pub fn decode_document(
    body: Bytes,
    operation: &OperationDescriptor,
    codec: Option<&Codec>,
    status: u16,
    include_details: bool,
) -> Result<DecodedResponse> {
    let mut r = DocumentReader::new(body)?;
    let root = r.read_start()?;

    if root.local_name() == "Fault" {
        let fault = parse_fault(&mut r, &root)?;
        return translate(fault, operation.kind, status, include_details)
            .map(DecodedResponse::ValidationFailure);
    }

    let expected = format!("{}Response", operation.name);
    if root.local_name() != expected {
        return Err(ClientError::MalformedResponse {
            expected,
            found: root.name,
        });
    }
    if root.is_empty {
        return Ok(DecodedResponse::null());
    }

    let expected = format!("{}Result", operation.name);
    let inner = loop {
        match r.read_node()? {
            Some(Node::Start(start)) => break start,
            Some(Node::Text(TextValue::Empty)) => continue,
            Some(Node::End) | None => return Ok(DecodedResponse::null()),
            Some(Node::Text(text)) => {
                return Err(ClientError::MalformedResponse {
                    expected,
                    found: text.kind().to_string(),
                });
            }
        }
    };
    if inner.local_name() != expected {
        return Err(ClientError::MalformedResponse {
            expected,
            found: inner.name,
        });
    }

    let total_count = inner
        .attribute(TOTAL_COUNT_ATTRIBUTE)
        .and_then(TextValue::as_i64);
    let payload = match codec {
        Some(codec) => codec.read_content(&mut r, &inner)?,
        None => {
            r.skip_content(&inner)?;
            Payload::Value(Value::Null)
        }
    };
    Ok(DecodedResponse::Payload {
        payload,
        total_count,
    })
}
