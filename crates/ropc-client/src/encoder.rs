// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request body encoding.

use std::sync::Arc;

use bytes::Bytes;
use ropc_protocol::{DocumentWriter, TextValue};

use crate::codec::{Codec, CodecError, Payload};
use crate::types::QueryPart;

/// A parameter value paired with the codec of its declared type.
#[derive(Debug, Clone)]
pub struct BoundParameter {
    pub name: String,
    pub value: Payload,
    pub codec: Arc<Codec>,
}

impl BoundParameter {
    pub fn new(name: impl Into<String>, value: impl Into<Payload>, codec: Arc<Codec>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            codec,
        }
    }
}

/// Write the request document for `operation`.
///
/// When `query` is non-empty the operation element is wrapped in
/// `MessageRoot` after a `QueryOptions` block listing the parts in order.
/// Null parameters are written with the nil marker.
pub fn encode(
    w: &mut DocumentWriter,
    operation: &str,
    params: &[BoundParameter],
    query: &[QueryPart],
) -> Result<(), CodecError> {
    let wrapped = !query.is_empty();
    if wrapped {
        w.start_element("MessageRoot")?;
        w.start_element("QueryOptions")?;
        for part in query {
            w.start_element("QueryOption")?;
            w.attribute("Name", &TextValue::chars(part.operator.as_str()))?;
            w.attribute("Value", &TextValue::chars(part.expression.as_str()))?;
            w.end_element()?;
        }
        w.end_element()?;
    }

    w.start_element(operation)?;
    for param in params {
        param.codec.write(w, &param.name, &param.value)?;
    }
    w.end_element()?;

    if wrapped {
        w.end_element()?;
    }
    Ok(())
}

pub fn encode_to_bytes(
    operation: &str,
    params: &[BoundParameter],
    query: &[QueryPart],
) -> Result<Bytes, CodecError> {
    let mut w = DocumentWriter::new();
    encode(&mut w, operation, params, query)?;
    Ok(w.finish()?)
}
