//! Companion XSD metadata extraction.
//!
//! The schema document is small, so it is read into a minimal element tree
//! and queried by local name. Failures never abort the data parse; they are
//! recorded on [`XsdSchema::error`].

use super::reader;
use crate::models::{XsdAttribute, XsdComplexType, XsdElement, XsdSchema, XsdSimpleType};
use crate::parsers::deadline::Deadline;
use crate::{Result, SurveyError};
use quick_xml::events::Event;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Element of the in-memory schema tree.
#[derive(Debug, Default)]
struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Node {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Descendants named `name`, in document order.
    fn descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a Node>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.descendants(name, out);
        }
    }

    fn find_all(&self, name: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        self.descendants(name, &mut out);
        out
    }

    fn find(&self, name: &str) -> Option<&Node> {
        self.find_all(name).into_iter().next()
    }
}

/// Parses the XSD at `path`, recording any failure on the result.
pub(crate) fn parse_xsd(path: &Path, budget: Duration) -> XsdSchema {
    match read_tree(path, budget) {
        Ok(root) => {
            let schema = describe(&root);
            tracing::info!(
                "Parsed XSD schema with {} elements, {} complex types, {} simple types",
                schema.elements.len(),
                schema.complex_types.len(),
                schema.simple_types.len()
            );
            schema
        }
        Err(e) => {
            tracing::warn!("Failed to parse XSD {}: {}", path.display(), e);
            XsdSchema {
                error: Some(e.to_string()),
                ..XsdSchema::default()
            }
        }
    }
}

fn read_tree(path: &Path, budget: Duration) -> Result<Node> {
    let deadline = Deadline::start("XSD parsing", budget);
    let mut reader = reader::open(path)?;
    let mut buf = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut root = None;

    loop {
        deadline.check()?;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| reader::syntax_error(&reader, e))?;
        match event {
            Event::Start(start) => stack.push(Node {
                name: reader::element_name(&start, true),
                attributes: reader::attributes(&start, true)?,
                children: Vec::new(),
            }),
            Event::Empty(start) => {
                let node = Node {
                    name: reader::element_name(&start, true),
                    attributes: reader::attributes(&start, true)?,
                    children: Vec::new(),
                };
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(SurveyError::malformed("Malformed XSD", "unexpected end of document"));
    }
    root.ok_or_else(|| SurveyError::malformed("Malformed XSD", "document has no root element"))
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn describe(root: &Node) -> XsdSchema {
    let mut schema = XsdSchema {
        target_namespace: root.attr("targetNamespace").map(str::to_string),
        ..XsdSchema::default()
    };

    for element in root.find_all("element") {
        if let Some(name) = element.attr("name") {
            schema.elements.insert(name.to_string(), element_decl(element));
        }
    }

    for complex in root.find_all("complexType") {
        if let Some(name) = complex.attr("name") {
            schema
                .complex_types
                .insert(name.to_string(), complex_type(complex));
        }
    }

    for simple in root.find_all("simpleType") {
        if let Some(name) = simple.attr("name") {
            schema
                .simple_types
                .insert(name.to_string(), simple_type(simple));
        }
    }

    schema
}

fn element_decl(node: &Node) -> XsdElement {
    XsdElement {
        type_name: node.attr("type").map(str::to_string),
        min_occurs: node.attr("minOccurs").unwrap_or("1").to_string(),
        max_occurs: node.attr("maxOccurs").unwrap_or("1").to_string(),
        nillable: node.attr("nillable") == Some("true"),
        default: node.attr("default").map(str::to_string),
        fixed: node.attr("fixed").map(str::to_string),
    }
}

fn complex_type(node: &Node) -> XsdComplexType {
    let mut result = XsdComplexType::default();

    for compositor in ["sequence", "choice", "all"] {
        if let Some(group) = node.find(compositor) {
            result.compositor = Some(compositor.to_string());
            result.elements = group
                .find_all("element")
                .into_iter()
                .filter_map(|e| e.attr("name").or_else(|| e.attr("ref")))
                .map(str::to_string)
                .collect();
            break;
        }
    }

    result.attributes = node
        .find_all("attribute")
        .into_iter()
        .filter_map(|attr| {
            let name = attr.attr("name").or_else(|| attr.attr("ref"))?;
            Some(XsdAttribute {
                name: name.to_string(),
                type_name: attr.attr("type").map(str::to_string),
                usage: attr.attr("use").unwrap_or("optional").to_string(),
                default: attr.attr("default").map(str::to_string),
            })
        })
        .collect();

    result
}

fn simple_type(node: &Node) -> XsdSimpleType {
    let mut result = XsdSimpleType::default();
    let Some(restriction) = node.find("restriction") else {
        return result;
    };

    result.base_type = restriction.attr("base").map(str::to_string);
    let mut restrictions = BTreeMap::new();
    for facet in &restriction.children {
        let Some(value) = facet.attr("value") else {
            continue;
        };
        if facet.name == "enumeration" {
            result.enumeration.push(value.to_string());
        } else {
            restrictions.insert(facet.name.clone(), value.to_string());
        }
    }
    result.restrictions = restrictions;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:books">
  <xs:element name="catalog">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="book" type="BookType" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
  <xs:complexType name="BookType">
    <xs:sequence>
      <xs:element name="title" type="xs:string"/>
      <xs:element name="subtitle" type="xs:string" minOccurs="0" nillable="true"/>
      <xs:element name="format" type="FormatType"/>
    </xs:sequence>
    <xs:attribute name="id" type="xs:ID" use="required"/>
    <xs:attribute name="lang" type="xs:language"/>
  </xs:complexType>
  <xs:simpleType name="FormatType">
    <xs:restriction base="xs:string">
      <xs:maxLength value="20"/>
      <xs:enumeration value="hardcover"/>
      <xs:enumeration value="paperback"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

    fn write(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".xsd").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_elements_and_types() {
        let file = write(XSD);
        let schema = parse_xsd(file.path(), Duration::from_secs(30));

        assert!(schema.error.is_none());
        assert_eq!(schema.target_namespace.as_deref(), Some("urn:books"));

        let book = &schema.elements["book"];
        assert_eq!(book.type_name.as_deref(), Some("BookType"));
        assert_eq!(book.max_occurs, "unbounded");
        assert_eq!(book.min_occurs, "1");

        let subtitle = &schema.elements["subtitle"];
        assert_eq!(subtitle.min_occurs, "0");
        assert!(subtitle.nillable);

        let book_type = &schema.complex_types["BookType"];
        assert_eq!(book_type.compositor.as_deref(), Some("sequence"));
        assert_eq!(book_type.elements, vec!["title", "subtitle", "format"]);
        assert_eq!(book_type.attributes.len(), 2);
        assert_eq!(book_type.attributes[0].usage, "required");
        assert_eq!(book_type.attributes[1].usage, "optional");

        let format = &schema.simple_types["FormatType"];
        assert_eq!(format.base_type.as_deref(), Some("xs:string"));
        assert_eq!(format.restrictions.get("maxLength").map(String::as_str), Some("20"));
        assert_eq!(format.enumeration, vec!["hardcover", "paperback"]);
    }

    #[test]
    fn test_syntax_error_is_recorded() {
        let file = write("<xs:schema><xs:element name=\"a\"></xs:schema>");
        let schema = parse_xsd(file.path(), Duration::from_secs(30));
        assert!(schema.error.is_some());
        assert!(schema.elements.is_empty());
    }

    #[test]
    fn test_missing_file_is_recorded() {
        let schema = parse_xsd(Path::new("/nonexistent/schema.xsd"), Duration::from_secs(30));
        assert!(schema.error.unwrap().contains("Failed to open"));
    }
}
