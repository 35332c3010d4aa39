// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pull reader for binary documents.

use bytes::{Buf, Bytes};
use tracing::trace;

use crate::record::{
    DocumentError, MAX_DEPTH, MAX_DOCUMENT_SIZE, RecordType, get_string, get_tag, get_text,
};
use crate::text::TextValue;
use crate::writer::NIL_ATTRIBUTE;

/// An element start together with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct StartElement {
    pub name: String,
    pub attributes: Vec<(String, TextValue)>,
    /// The element has no content and no separate end node follows.
    pub is_empty: bool,
}

impl StartElement {
    /// Element name without its `prefix:` part.
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&TextValue> {
        self.attributes
            .iter()
            .find(|(key, _)| local_name(key) == name)
            .map(|(_, value)| value)
    }

    /// Whether the element carries the nil marker.
    pub fn is_nil(&self) -> bool {
        self.attribute(NIL_ATTRIBUTE)
            .and_then(TextValue::as_bool)
            .unwrap_or(false)
    }
}

fn local_name(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

/// A node produced by [`DocumentReader::read_node`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Start(StartElement),
    End,
    Text(TextValue),
}

impl Node {
    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Node::Start(start) => format!("element '{}'", start.name),
            Node::End => "end of element".to_string(),
            Node::Text(text) => text.kind().to_string(),
        }
    }
}

/// Reads a document node by node.
///
/// Cloning is cheap (the underlying buffer is reference counted), which is
/// how [`DocumentReader::peek_node`] looks ahead.
#[derive(Debug, Clone)]
pub struct DocumentReader {
    data: Bytes,
    depth: usize,
}

impl DocumentReader {
    pub fn new(data: Bytes) -> Result<Self, DocumentError> {
        if data.len() > MAX_DOCUMENT_SIZE {
            return Err(DocumentError::DocumentTooLarge(data.len()));
        }
        Ok(Self { data, depth: 0 })
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True once every record has been consumed.
    pub fn is_eof(&self) -> bool {
        !self.data.has_remaining()
    }

    /// Read the next node, or `None` at the end of a balanced document.
    pub fn read_node(&mut self) -> Result<Option<Node>, DocumentError> {
        if self.is_eof() {
            if self.depth > 0 {
                return Err(DocumentError::UnexpectedEof);
            }
            return Ok(None);
        }

        match get_tag(&mut self.data)? {
            RecordType::StartElement => {
                let name = get_string(&mut self.data, "element name")?;
                let mut attributes = Vec::new();
                while self.next_tag() == Some(RecordType::Attribute as u8) {
                    self.data.advance(1);
                    let key = get_string(&mut self.data, "attribute name")?;
                    let tag = get_tag(&mut self.data)?;
                    attributes.push((key, get_text(tag, &mut self.data)?));
                }

                let is_empty = self.next_tag() == Some(RecordType::EndElement as u8);
                if is_empty {
                    self.data.advance(1);
                } else {
                    if self.depth >= MAX_DEPTH {
                        return Err(DocumentError::TooDeep);
                    }
                    self.depth += 1;
                }

                Ok(Some(Node::Start(StartElement {
                    name,
                    attributes,
                    is_empty,
                })))
            }
            RecordType::EndElement => {
                if self.depth == 0 {
                    return Err(DocumentError::Unbalanced(
                        "end element without a matching start".to_string(),
                    ));
                }
                self.depth -= 1;
                Ok(Some(Node::End))
            }
            RecordType::Attribute => Err(DocumentError::MisplacedAttribute),
            tag => {
                if self.depth == 0 {
                    return Err(DocumentError::Unbalanced(
                        "text outside of an element".to_string(),
                    ));
                }
                Ok(Some(Node::Text(get_text(tag, &mut self.data)?)))
            }
        }
    }

    /// Look at the next node without consuming it.
    pub fn peek_node(&self) -> Result<Option<Node>, DocumentError> {
        self.clone().read_node()
    }

    /// Read the next node and require it to be an element start.
    pub fn read_start(&mut self) -> Result<StartElement, DocumentError> {
        match self.read_node()? {
            Some(Node::Start(start)) => Ok(start),
            Some(other) => Err(DocumentError::Unexpected {
                expected: "element".to_string(),
                found: other.describe(),
            }),
            None => Err(DocumentError::UnexpectedEof),
        }
    }

    /// Read the text content of `start` up to and including its end.
    ///
    /// An empty element yields [`TextValue::Empty`]. Consecutive character
    /// records are concatenated.
    pub fn read_text_content(&mut self, start: &StartElement) -> Result<TextValue, DocumentError> {
        if start.is_empty {
            return Ok(TextValue::Empty);
        }
        let mut content = TextValue::Empty;
        loop {
            match self.read_node()? {
                Some(Node::Text(text)) => {
                    content = match (content, text) {
                        (TextValue::Chars(mut head), TextValue::Chars(tail)) => {
                            head.push_str(&tail);
                            TextValue::Chars(head)
                        }
                        (current, TextValue::Empty) => current,
                        (_, next) => next,
                    };
                }
                Some(Node::End) => return Ok(content),
                Some(other) => {
                    return Err(DocumentError::Unexpected {
                        expected: format!("text content of '{}'", start.name),
                        found: other.describe(),
                    });
                }
                None => return Err(DocumentError::UnexpectedEof),
            }
        }
    }

    /// Visit every child element of `start`, consuming its end.
    ///
    /// The callback must consume the child completely. Empty text records
    /// between children are ignored; any other text is an error.
    pub fn for_each_child<E, F>(&mut self, start: &StartElement, mut visit: F) -> Result<(), E>
    where
        E: From<DocumentError>,
        F: FnMut(&mut Self, StartElement) -> Result<(), E>,
    {
        if start.is_empty {
            return Ok(());
        }
        loop {
            match self.read_node()? {
                Some(Node::Start(child)) => visit(self, child)?,
                Some(Node::End) => return Ok(()),
                Some(Node::Text(TextValue::Empty)) => {}
                Some(other) => {
                    return Err(DocumentError::Unexpected {
                        expected: format!("child element of '{}'", start.name),
                        found: other.describe(),
                    }
                    .into());
                }
                None => return Err(DocumentError::UnexpectedEof.into()),
            }
        }
    }

    /// Skip everything up to and including the end of `start`.
    pub fn skip_content(&mut self, start: &StartElement) -> Result<(), DocumentError> {
        if start.is_empty {
            return Ok(());
        }
        trace!(element = %start.name, "skipping element");
        let target = self.depth - 1;
        while self.depth > target {
            if self.read_node()?.is_none() {
                return Err(DocumentError::UnexpectedEof);
            }
        }
        Ok(())
    }

    fn next_tag(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::DocumentWriter;

    fn sample() -> Bytes {
        let mut writer = DocumentWriter::new();
        writer.start_element("p:Outer").unwrap();
        writer
            .attribute("p:kind", &TextValue::chars("sample"))
            .unwrap();
        writer.element_text("Inner", &TextValue::Int64(7)).unwrap();
        writer.nil_element("Missing").unwrap();
        writer.start_element("Empty").unwrap();
        writer.end_element().unwrap();
        writer.end_element().unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_read_nodes_in_order() {
        let mut reader = DocumentReader::new(sample()).unwrap();

        let outer = reader.read_start().unwrap();
        assert_eq!(outer.name, "p:Outer");
        assert_eq!(outer.local_name(), "Outer");
        assert_eq!(outer.attribute("kind"), Some(&TextValue::chars("sample")));
        assert!(!outer.is_empty);
        assert_eq!(reader.depth(), 1);

        let inner = reader.read_start().unwrap();
        assert_eq!(
            reader.read_text_content(&inner).unwrap(),
            TextValue::Int64(7)
        );

        let missing = reader.read_start().unwrap();
        assert!(missing.is_nil());
        assert!(missing.is_empty);

        let empty = reader.read_start().unwrap();
        assert!(empty.is_empty);
        assert!(!empty.is_nil());

        assert_eq!(reader.read_node().unwrap(), Some(Node::End));
        assert_eq!(reader.read_node().unwrap(), None);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut reader = DocumentReader::new(sample()).unwrap();
        let peeked = reader.peek_node().unwrap();
        let read = reader.read_node().unwrap();
        assert_eq!(peeked, read);
    }

    #[test]
    fn test_for_each_child_visits_all() {
        let mut reader = DocumentReader::new(sample()).unwrap();
        let outer = reader.read_start().unwrap();
        let mut names = Vec::new();
        reader
            .for_each_child::<DocumentError, _>(&outer, |r, child| {
                names.push(child.local_name().to_string());
                r.skip_content(&child)
            })
            .unwrap();
        assert_eq!(names, vec!["Inner", "Missing", "Empty"]);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_skip_nested_content() {
        let mut reader = DocumentReader::new(sample()).unwrap();
        let outer = reader.read_start().unwrap();
        reader.skip_content(&outer).unwrap();
        assert_eq!(reader.depth(), 0);
        assert_eq!(reader.read_node().unwrap(), None);
    }

    #[test]
    fn test_truncated_document() {
        let bytes = sample();
        let mut reader = DocumentReader::new(bytes.slice(0..bytes.len() - 1)).unwrap();
        let outer = reader.read_start().unwrap();
        assert!(matches!(
            reader.skip_content(&outer),
            Err(DocumentError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_concatenated_chars() {
        let mut writer = DocumentWriter::new();
        writer.start_element("t").unwrap();
        writer.text(&TextValue::chars("ab")).unwrap();
        writer.text(&TextValue::chars("cd")).unwrap();
        writer.end_element().unwrap();
        let mut reader = DocumentReader::new(writer.finish().unwrap()).unwrap();
        let start = reader.read_start().unwrap();
        assert_eq!(
            reader.read_text_content(&start).unwrap(),
            TextValue::chars("abcd")
        );
    }

    #[test]
    fn test_text_where_element_expected() {
        let mut writer = DocumentWriter::new();
        writer.element_text("t", &TextValue::chars("x")).unwrap();
        let mut reader = DocumentReader::new(writer.finish().unwrap()).unwrap();
        reader.read_start().unwrap();
        let err = reader.read_start().unwrap_err();
        assert!(matches!(err, DocumentError::Unexpected { .. }));
    }

    #[test]
    fn test_stray_end_element() {
        let mut reader = DocumentReader::new(Bytes::from_static(&[0x02])).unwrap();
        assert!(matches!(
            reader.read_node(),
            Err(DocumentError::Unbalanced(_))
        ));
    }
}
