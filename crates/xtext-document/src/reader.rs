//! A strict reader for the XML subset the store delivers.
//!
//! Handles elements, attributes, character data, CDATA sections, comments,
//! processing instructions, a leading XML declaration, and a DOCTYPE without
//! an internal subset. Entity references are limited to the five predefined
//! entities plus numeric character references. Whitespace-only text between
//! elements is dropped so node numbering stays stable across pretty-printed
//! fixtures.

use crate::{
    error::DocumentError,
    id::{DocId, NodeId},
    qname::QName,
    tree::{Attribute, Content, Document, Element, Text},
};

/// Parses `input` into a [`Document`] with the given id and URI.
pub fn parse_document(id: DocId, uri: &str, input: &str) -> Result<Document, DocumentError> {
    let mut reader = Reader {
        bytes: input.as_bytes(),
        pos: 0,
    };
    reader.skip_misc()?;
    if !reader.at(b"<") {
        return Err(DocumentError::parse("expected document element", reader.pos));
    }
    let root = reader.read_element(NodeId::root())?;
    reader.skip_misc()?;
    if reader.pos != reader.bytes.len() {
        return Err(DocumentError::parse(
            "content after document element",
            reader.pos,
        ));
    }
    Ok(Document {
        id,
        uri: uri.to_string(),
        root,
    })
}

/// Cursor over the raw input.
struct Reader<'a> {
    /// The input bytes.
    bytes: &'a [u8],
    /// Current byte offset.
    pos: usize,
}

impl Reader<'_> {
    /// True if the input at the cursor starts with `expected`.
    fn at(&self, expected: &[u8]) -> bool {
        self.bytes[self.pos..].starts_with(expected)
    }

    /// Consumes `expected` or fails.
    fn expect(&mut self, expected: &[u8]) -> Result<(), DocumentError> {
        if !self.at(expected) {
            return Err(DocumentError::parse(
                format!("expected `{}`", String::from_utf8_lossy(expected)),
                self.pos,
            ));
        }
        self.pos += expected.len();
        Ok(())
    }

    /// Skips whitespace.
    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Skips whitespace, comments, processing instructions, the XML
    /// declaration, and a DOCTYPE.
    fn skip_misc(&mut self) -> Result<(), DocumentError> {
        loop {
            self.skip_ws();
            if self.at(b"<?") {
                self.skip_until(b"?>")?;
            } else if self.at(b"<!--") {
                self.skip_until(b"-->")?;
            } else if self.at(b"<!DOCTYPE") {
                self.skip_until(b">")?;
            } else {
                return Ok(());
            }
        }
    }

    /// Advances past the next occurrence of `marker`.
    fn skip_until(&mut self, marker: &[u8]) -> Result<(), DocumentError> {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            if self.at(marker) {
                self.pos += marker.len();
                return Ok(());
            }
            self.pos += 1;
        }
        Err(DocumentError::parse(
            format!("unterminated `{}`", String::from_utf8_lossy(marker)),
            start,
        ))
    }

    /// Reads a name token (everything up to whitespace, `/`, `>`, or `=`).
    fn read_name(&mut self) -> Result<QName, DocumentError> {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let byte = self.bytes[self.pos];
            if byte.is_ascii_whitespace() || matches!(byte, b'/' | b'>' | b'=') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(DocumentError::parse("expected name", start));
        }
        let raw = core::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| DocumentError::parse("name is not valid UTF-8", start))?;
        Ok(QName::parse(raw))
    }

    /// Reads an element whose `<` has not yet been consumed.
    fn read_element(&mut self, node_id: NodeId) -> Result<Element, DocumentError> {
        self.expect(b"<")?;
        let name = self.read_name()?;
        let mut next_child: u32 = 1;
        let mut attributes = Vec::new();

        loop {
            self.skip_ws();
            if self.at(b"/>") {
                self.pos += 2;
                return Ok(Element {
                    name,
                    node_id,
                    attributes,
                    children: Vec::new(),
                });
            }
            if self.at(b">") {
                self.pos += 1;
                break;
            }
            let attr_name = self.read_name()?;
            self.skip_ws();
            self.expect(b"=")?;
            self.skip_ws();
            let value = self.read_quoted()?;
            attributes.push(Attribute {
                name: attr_name,
                node_id: node_id.child(next_child),
                value,
            });
            next_child += 1;
        }

        let mut children = Vec::new();
        loop {
            if self.at(b"</") {
                self.pos += 2;
                let close = self.read_name()?;
                if close != name {
                    return Err(DocumentError::parse(
                        format!("mismatched closing tag `{close}`, expected `{name}`"),
                        self.pos,
                    ));
                }
                self.skip_ws();
                self.expect(b">")?;
                return Ok(Element {
                    name,
                    node_id,
                    attributes,
                    children,
                });
            }
            if self.at(b"<!--") {
                self.skip_until(b"-->")?;
                continue;
            }
            if self.at(b"<?") {
                self.skip_until(b"?>")?;
                continue;
            }
            if self.at(b"<![CDATA[") {
                let text = self.read_cdata()?;
                push_text(&mut children, &node_id, &mut next_child, text, false);
                continue;
            }
            if self.at(b"<") {
                let child = self.read_element(node_id.child(next_child))?;
                next_child += 1;
                children.push(Content::Element(child));
                continue;
            }
            if self.pos >= self.bytes.len() {
                return Err(DocumentError::parse(
                    format!("unterminated element `{name}`"),
                    self.pos,
                ));
            }
            let text = self.read_text()?;
            push_text(&mut children, &node_id, &mut next_child, text, true);
        }
    }

    /// Reads a quoted attribute value with entity expansion.
    fn read_quoted(&mut self) -> Result<String, DocumentError> {
        let quote = match self.bytes.get(self.pos) {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => return Err(DocumentError::parse("expected quoted value", self.pos)),
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(DocumentError::parse("unterminated attribute", self.pos)),
                Some(&byte) if byte == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'&') => out.push(self.read_entity()?),
                Some(_) => {
                    let start = self.pos;
                    while self
                        .bytes
                        .get(self.pos)
                        .is_some_and(|&b| b != quote && b != b'&')
                    {
                        self.pos += 1;
                    }
                    let chunk = core::str::from_utf8(&self.bytes[start..self.pos])
                        .map_err(|_| DocumentError::parse("value is not valid UTF-8", start))?;
                    out.push_str(chunk);
                }
            }
        }
    }

    /// Reads character data up to the next markup start.
    fn read_text(&mut self) -> Result<String, DocumentError> {
        let mut out = String::new();
        while self.pos < self.bytes.len() && !self.at(b"<") {
            if self.bytes[self.pos] == b'&' {
                out.push(self.read_entity()?);
            } else {
                // Raw byte copy; multi-byte UTF-8 sequences pass through
                // unchanged because no markup byte can occur inside them.
                let start = self.pos;
                while self.pos < self.bytes.len()
                    && !matches!(self.bytes[self.pos], b'<' | b'&')
                {
                    self.pos += 1;
                }
                let chunk = core::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| DocumentError::parse("text is not valid UTF-8", start))?;
                out.push_str(chunk);
            }
        }
        Ok(out)
    }

    /// Reads a CDATA section.
    fn read_cdata(&mut self) -> Result<String, DocumentError> {
        self.expect(b"<![CDATA[")?;
        let start = self.pos;
        while self.pos < self.bytes.len() {
            if self.at(b"]]>") {
                let chunk = core::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| DocumentError::parse("CDATA is not valid UTF-8", start))?;
                self.pos += 3;
                return Ok(chunk.to_string());
            }
            self.pos += 1;
        }
        Err(DocumentError::parse("unterminated CDATA section", start))
    }

    /// Reads an entity or character reference starting at `&`.
    fn read_entity(&mut self) -> Result<char, DocumentError> {
        let start = self.pos;
        self.expect(b"&")?;
        let end = self.bytes[self.pos..]
            .iter()
            .position(|&b| b == b';')
            .map(|offset| self.pos + offset)
            .ok_or_else(|| DocumentError::parse("unterminated entity reference", start))?;
        let name = core::str::from_utf8(&self.bytes[self.pos..end])
            .map_err(|_| DocumentError::parse("entity is not valid UTF-8", start))?;
        self.pos = end + 1;
        match name {
            "lt" => Ok('<'),
            "gt" => Ok('>'),
            "amp" => Ok('&'),
            "quot" => Ok('"'),
            "apos" => Ok('\''),
            _ => {
                let code = if let Some(hex) = name.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = name.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32).ok_or_else(|| {
                    DocumentError::parse(format!("unknown entity `&{name};`"), start)
                })
            }
        }
    }
}

/// Appends a text node, assigning it a child slot.
///
/// Whitespace-only character data outside CDATA is dropped without
/// consuming a slot.
fn push_text(
    children: &mut Vec<Content>,
    parent: &NodeId,
    next_child: &mut u32,
    value: String,
    drop_blank: bool,
) {
    if drop_blank && value.chars().all(char::is_whitespace) {
        return;
    }
    children.push(Content::Text(Text {
        node_id: parent.child(*next_child),
        value,
    }));
    *next_child += 1;
}
