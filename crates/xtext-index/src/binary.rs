//! Indexing of non-XML (binary/plain-text) resources.
//!
//! Binary resources have no node tree; their text arrives as a field
//! descriptor document and their entries are keyed purely by URI, which is
//! also how [`ReindexMode::RemoveBinaryResource`] removes them:
//!
//! ```xml
//! <doc>
//!   <field name="abstract" boost="2.0">text to index</field>
//!   <field name="body">more text</field>
//! </doc>
//! ```
//!
//! Field names must refer to named rules of the active configuration; the
//! entry text routes into the same `field:{name}` index fields.
//!
//! [`ReindexMode::RemoveBinaryResource`]: crate::session::ReindexMode::RemoveBinaryResource

use tantivy::TantivyDocument;
use xtext_document::{Content, Element};
use xtext_query::QueryDescError;

use crate::{error::IndexError, index::SearchIndex};

/// One field of a binary resource descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainTextField {
    /// Target field name.
    pub name: String,
    /// Text to index.
    pub content: String,
    /// Entry boost.
    pub boost: f32,
}

/// A parsed binary resource descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlainTextDoc {
    /// The descriptor's fields, in document order.
    pub fields: Vec<PlainTextField>,
}

impl PlainTextDoc {
    /// Parses a `<doc>` descriptor element.
    pub fn parse(root: &Element) -> Result<Self, QueryDescError> {
        if root.name.local != "doc" {
            return Err(QueryDescError::UnknownElement {
                name: root.name.local.clone(),
                fragment: root.to_xml(),
            });
        }
        let mut fields = Vec::new();
        for child in &root.children {
            let Content::Element(element) = child else {
                continue;
            };
            if element.name.local != "field" {
                return Err(QueryDescError::UnknownElement {
                    name: element.name.local.clone(),
                    fragment: element.to_xml(),
                });
            }
            let name = element
                .attribute(&xtext_document::QName::local("name"))
                .map(|attribute| attribute.value.clone())
                .ok_or_else(|| QueryDescError::Malformed {
                    message: "<field> requires a `name` attribute".to_string(),
                    fragment: element.to_xml(),
                })?;
            let boost = match element.attribute(&xtext_document::QName::local("boost")) {
                Some(attribute) => attribute.value.parse().map_err(|_| {
                    QueryDescError::InvalidAttribute {
                        name: "field".to_string(),
                        attribute: "boost".to_string(),
                        value: attribute.value.clone(),
                    }
                })?,
                None => 1.0,
            };
            fields.push(PlainTextField {
                name,
                content: element.text_content(),
                boost,
            });
        }
        Ok(Self { fields })
    }
}

impl SearchIndex {
    /// Indexes a binary resource's descriptor under its URI.
    ///
    /// Every field must name a configured named rule; unknown names are an
    /// [`IndexError::UnknownField`].
    pub fn index_plain_text(&self, uri: &str, descriptor: &PlainTextDoc) -> Result<(), IndexError> {
        let schema = self.schema();
        let mut doc = TantivyDocument::new();
        doc.add_text(schema.uri, uri);
        for field in &descriptor.fields {
            let key = format!("field:{}", field.name);
            let target = schema
                .content_field(&key)
                .ok_or_else(|| IndexError::UnknownField(field.name.clone()))?;
            doc.add_text(target, &field.content);
            doc.add_text(schema.qname, &key);
            doc.add_f64(schema.boost, f64::from(field.boost));
        }
        self.commit_manager().with_writer(|writer| {
            writer.add_document(doc).map_err(|e| IndexError::write(&e))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use xtext_document::{DocId, parse_document};

    use super::*;

    fn descriptor(xml: &str) -> Result<PlainTextDoc, QueryDescError> {
        let doc = parse_document(DocId(0), "/desc", xml).unwrap();
        PlainTextDoc::parse(&doc.root)
    }

    #[test]
    fn parses_fields_with_boosts() {
        let parsed = descriptor(
            r#"<doc><field name="abstract" boost="2.0">short text</field><field name="body">long text</field></doc>"#,
        )
        .unwrap();
        assert_eq!(parsed.fields.len(), 2);
        assert_eq!(parsed.fields[0].name, "abstract");
        assert!((parsed.fields[0].boost - 2.0).abs() < f32::EPSILON);
        assert_eq!(parsed.fields[1].content, "long text");
        assert!((parsed.fields[1].boost - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_wrong_root_and_missing_name() {
        assert!(matches!(
            descriptor("<document/>"),
            Err(QueryDescError::UnknownElement { .. })
        ));
        assert!(matches!(
            descriptor("<doc><field>text</field></doc>"),
            Err(QueryDescError::Malformed { .. })
        ));
        assert!(matches!(
            descriptor(r#"<doc><field name="a" boost="big">x</field></doc>"#),
            Err(QueryDescError::InvalidAttribute { .. })
        ));
    }
}
