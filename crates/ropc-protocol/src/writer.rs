// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Streaming writer for binary documents.

use bytes::{BufMut, Bytes, BytesMut};

use crate::record::{
    DocumentError, MAX_DEPTH, MAX_DOCUMENT_SIZE, RecordType, put_string, put_text,
};
use crate::text::TextValue;

/// Name of the attribute marking an element as explicitly null
pub const NIL_ATTRIBUTE: &str = "nil";

/// Name of the attribute carrying a runtime type name
pub const TYPE_ATTRIBUTE: &str = "type";

/// Writes a document record by record, tracking open elements so that
/// [`DocumentWriter::finish`] can refuse an unbalanced document.
#[derive(Debug, Default)]
pub struct DocumentWriter {
    buf: BytesMut,
    open: Vec<String>,
    // true while attributes may still be added to the last started element
    in_start: bool,
}

impl DocumentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn start_element(&mut self, name: &str) -> Result<(), DocumentError> {
        if self.open.len() >= MAX_DEPTH {
            return Err(DocumentError::TooDeep);
        }
        self.buf.put_u8(RecordType::StartElement as u8);
        put_string(&mut self.buf, name);
        self.open.push(name.to_string());
        self.in_start = true;
        Ok(())
    }

    pub fn attribute(&mut self, name: &str, value: &TextValue) -> Result<(), DocumentError> {
        if !self.in_start {
            return Err(DocumentError::MisplacedAttribute);
        }
        self.buf.put_u8(RecordType::Attribute as u8);
        put_string(&mut self.buf, name);
        put_text(&mut self.buf, value);
        Ok(())
    }

    pub fn text(&mut self, value: &TextValue) -> Result<(), DocumentError> {
        if self.open.is_empty() {
            return Err(DocumentError::Unbalanced(
                "text outside of an element".to_string(),
            ));
        }
        self.in_start = false;
        put_text(&mut self.buf, value);
        Ok(())
    }

    pub fn end_element(&mut self) -> Result<(), DocumentError> {
        if self.open.pop().is_none() {
            return Err(DocumentError::Unbalanced(
                "end element without a matching start".to_string(),
            ));
        }
        self.in_start = false;
        self.buf.put_u8(RecordType::EndElement as u8);
        Ok(())
    }

    /// Write `<name>value</name>`.
    pub fn element_text(&mut self, name: &str, value: &TextValue) -> Result<(), DocumentError> {
        self.start_element(name)?;
        self.text(value)?;
        self.end_element()
    }

    /// Write an empty element carrying the nil marker.
    pub fn nil_element(&mut self, name: &str) -> Result<(), DocumentError> {
        self.start_element(name)?;
        self.attribute(NIL_ATTRIBUTE, &TextValue::Bool(true))?;
        self.end_element()
    }

    /// Finish the document and return its bytes.
    pub fn finish(self) -> Result<Bytes, DocumentError> {
        if let Some(name) = self.open.last() {
            return Err(DocumentError::Unbalanced(format!(
                "element '{}' is still open",
                name
            )));
        }
        if self.buf.len() > MAX_DOCUMENT_SIZE {
            return Err(DocumentError::DocumentTooLarge(self.buf.len()));
        }
        Ok(self.buf.freeze())
    }
}
