// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Structured faults and their translation into [`ClientError`]s.
//!
//! A fault body looks like
//!
//! ```text
//! Fault
//! ├── Code?     Value, Subcode? (Value, Subcode? ...)
//! ├── Reason?   Text[lang]*
//! └── Detail?   <payload> ErrorCode, ErrorMessage, IsDomainException,
//!                         StackTrace?, OperationErrors?
//! ```
//!
//! Every section is optional. A fault without `Detail` is a protocol-level
//! fault and carries no structured payload.

use std::fmt;

use ropc_protocol::{DocumentError, DocumentReader, StartElement, TextValue};
use tracing::warn;

use crate::codec::read_validation_error;
use crate::error::{ClientError, HttpStatusError};
use crate::schema::OperationKind;
use crate::types::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultCode {
    pub value: String,
    pub subcode: Option<Box<FaultCode>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReason {
    pub lang: Option<String>,
    pub text: String,
}

/// Structured payload of a fault.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultDetail {
    pub error_code: i32,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub is_domain_exception: bool,
    pub operation_errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fault {
    pub code: Option<FaultCode>,
    pub reasons: Vec<FaultReason>,
    pub detail: Option<FaultDetail>,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut code = self.code.as_ref();
        let mut first = true;
        while let Some(c) = code {
            if !first {
                f.write_str("/")?;
            }
            f.write_str(&c.value)?;
            first = false;
            code = c.subcode.as_deref();
        }
        let reasons: Vec<&str> = self.reasons.iter().map(|r| r.text.as_str()).collect();
        match (first, reasons.is_empty()) {
            (true, true) => f.write_str("unspecified fault"),
            (true, false) => f.write_str(&reasons.join("; ")),
            (false, true) => Ok(()),
            (false, false) => write!(f, ": {}", reasons.join("; ")),
        }
    }
}

fn text_of(r: &mut DocumentReader, start: &StartElement) -> Result<String, DocumentError> {
    Ok(r
        .read_text_content(start)?
        .as_str()
        .unwrap_or_default()
        .to_string())
}

/// Parse the content of a `Fault` element.
pub fn parse_fault(r: &mut DocumentReader, start: &StartElement) -> Result<Fault, DocumentError> {
    let mut fault = Fault::default();
    r.for_each_child::<DocumentError, _>(start, |r, child| {
        match child.local_name() {
            "Code" => fault.code = Some(parse_code(r, &child)?),
            "Reason" => {
                r.for_each_child::<DocumentError, _>(&child, |r, text| {
                    if text.local_name() != "Text" {
                        return r.skip_content(&text);
                    }
                    let lang = text
                        .attribute("lang")
                        .and_then(TextValue::as_str)
                        .map(str::to_string);
                    fault.reasons.push(FaultReason {
                        lang,
                        text: text_of(r, &text)?,
                    });
                    Ok(())
                })?;
            }
            "Detail" => {
                r.for_each_child::<DocumentError, _>(&child, |r, payload| {
                    if fault.detail.is_some() {
                        return r.skip_content(&payload);
                    }
                    fault.detail = Some(parse_detail(r, &payload)?);
                    Ok(())
                })?;
            }
            _ => r.skip_content(&child)?,
        }
        Ok(())
    })?;
    Ok(fault)
}

fn parse_code(r: &mut DocumentReader, start: &StartElement) -> Result<FaultCode, DocumentError> {
    let mut code = FaultCode::default();
    r.for_each_child::<DocumentError, _>(start, |r, child| {
        match child.local_name() {
            "Value" => code.value = text_of(r, &child)?,
            "Subcode" => code.subcode = Some(Box::new(parse_code(r, &child)?)),
            _ => r.skip_content(&child)?,
        }
        Ok(())
    })?;
    Ok(code)
}

fn parse_detail(r: &mut DocumentReader, start: &StartElement) -> Result<FaultDetail, DocumentError> {
    let mut detail = FaultDetail::default();
    r.for_each_child::<DocumentError, _>(start, |r, child| {
        match child.local_name() {
            "ErrorCode" => {
                let text = r.read_text_content(&child)?;
                detail.error_code = text
                    .as_i64()
                    .and_then(|c| i32::try_from(c).ok())
                    .unwrap_or_default();
            }
            "ErrorMessage" => detail.error_message = text_of(r, &child)?,
            "IsDomainException" => {
                detail.is_domain_exception =
                    r.read_text_content(&child)?.as_bool().unwrap_or(false);
            }
            "StackTrace" => {
                let trace = text_of(r, &child)?;
                detail.stack_trace = (!trace.is_empty()).then_some(trace);
            }
            "OperationErrors" => {
                r.for_each_child::<DocumentError, _>(&child, |r, error| {
                    detail.operation_errors.push(read_validation_error(r, &error)?);
                    Ok(())
                })?;
            }
            _ => r.skip_content(&child)?,
        }
        Ok(())
    })?;
    Ok(detail)
}

/// Translate a decoded fault.
///
/// Returns the validation errors when a query or invoke fault carries
/// field-level errors; every other fault becomes an error.
pub fn translate(
    fault: Fault,
    kind: OperationKind,
    status: u16,
    include_details: bool,
) -> Result<Vec<ValidationError>, ClientError> {
    let Some(detail) = fault.detail.clone() else {
        if status == 404 {
            return Err(ClientError::NotFound(HttpStatusError {
                status,
                body: fault.to_string(),
            }));
        }
        warn!(status, fault = %fault, "Protocol fault without detail");
        return Err(ClientError::ProtocolFault(fault));
    };

    if !detail.operation_errors.is_empty() {
        return match kind {
            OperationKind::Query | OperationKind::Invoke => Ok(detail.operation_errors),
            OperationKind::Submit => Err(ClientError::ValidationFailed(detail.operation_errors)),
        };
    }

    warn!(
        status,
        error_code = detail.error_code,
        domain = detail.is_domain_exception,
        "Server returned fault"
    );
    let FaultDetail {
        error_code,
        error_message,
        stack_trace,
        is_domain_exception,
        ..
    } = detail;

    if is_domain_exception {
        return Err(ClientError::BusinessRule {
            code: error_code,
            message: error_message,
            stack_trace,
        });
    }
    Err(match error_code {
        400 => ClientError::NotSupported(error_message),
        401 => ClientError::Unauthorized(error_message),
        code => ClientError::Server {
            code,
            message: error_message,
            stack_trace: if include_details { stack_trace } else { None },
        },
    })
}

/// Error for a non-success status whose body is not a binary document.
pub fn status_error(status: u16, body: String) -> ClientError {
    match status {
        400 => ClientError::NotSupported(body),
        401 => ClientError::Unauthorized(body),
        404 => ClientError::NotFound(HttpStatusError { status, body }),
        _ => ClientError::Server {
            code: status.into(),
            message: body,
            stack_trace: None,
        },
    }
}
