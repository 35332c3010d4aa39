// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! ROPC Protocol - binary structured document format
//!
//! This crate provides the body format used by the remote operation client:
//! a self-describing element/attribute document encoded as compact binary
//! records instead of text markup.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ropc-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Document API: DocumentWriter / DocumentReader (pull)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Values: TextValue (chars, bool, int, double, date, bytes)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Records: one-byte tag + length-prefixed payloads           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Framing is purely structural: a document is complete when every started
//! element has been ended. There is no length prefix and no checksum.
//!
//! # Usage
//!
//! ```
//! use ropc_protocol::{DocumentReader, DocumentWriter, TextValue};
//!
//! let mut writer = DocumentWriter::new();
//! writer.start_element("GetCustomers").unwrap();
//! writer.element_text("region", &TextValue::chars("WA")).unwrap();
//! writer.end_element().unwrap();
//! let bytes = writer.finish().unwrap();
//!
//! let mut reader = DocumentReader::new(bytes).unwrap();
//! let operation = reader.read_start().unwrap();
//! assert_eq!(operation.local_name(), "GetCustomers");
//! ```

pub mod reader;
pub mod record;
pub mod text;
pub mod writer;

pub use reader::{DocumentReader, Node, StartElement};
pub use record::{CONTENT_TYPE, DocumentError, MAX_DEPTH, MAX_DOCUMENT_SIZE, RecordType};
pub use text::{DateTimeValue, TextValue};
pub use writer::{DocumentWriter, NIL_ATTRIBUTE, TYPE_ATTRIBUTE};
