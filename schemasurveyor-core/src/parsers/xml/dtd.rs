//! Inline DTD extraction.
//!
//! Only the internal subset of `<!DOCTYPE ...>` is read. External DTDs are
//! never fetched.

use super::reader;
use crate::Result;
use crate::models::{DtdAttribute, DtdChild, DtdElement, DtdSchema};
use crate::parsers::deadline::Deadline;
use crate::SurveyError;
use quick_xml::events::Event;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Declaration patterns for the DTD internal subset.
#[derive(Debug)]
pub(crate) struct DtdParser {
    element: Regex,
    attlist: Regex,
    attribute: Regex,
    entity: Regex,
}

impl DtdParser {
    pub(crate) fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| SurveyError::configuration(format!("Invalid DTD pattern: {}", e)))
        };
        Ok(Self {
            element: compile(r"<!ELEMENT\s+([^\s>]+)\s+([^>]+)>")?,
            attlist: compile(r"<!ATTLIST\s+([^\s>]+)\s+([^>]*)>")?,
            attribute: compile(
                r#"([^\s]+)\s+(NOTATION\s*\([^)]*\)|\([^)]*\)|[A-Z]+)\s+(#REQUIRED|#IMPLIED|#FIXED\s+(?:"[^"]*"|'[^']*')|"[^"]*"|'[^']*')"#,
            )?,
            entity: compile(r#"<!ENTITY\s+([^\s%>]+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#)?,
        })
    }

    /// Reads the inline DTD of `path`, if the document has one.
    pub(crate) fn extract(
        &self,
        path: &Path,
        budget: Duration,
    ) -> Result<Option<DtdSchema>> {
        let deadline = Deadline::start("DTD extraction", budget);
        let mut reader = reader::open(path)?;
        let mut buf = Vec::new();

        loop {
            deadline.check()?;
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| reader::syntax_error(&reader, e))?
            {
                Event::DocType(doctype) => {
                    let declaration = String::from_utf8_lossy(&doctype).into_owned();
                    return Ok(internal_subset(&declaration).map(|subset| self.parse(subset)));
                }
                Event::Start(_) | Event::Empty(_) | Event::Eof => return Ok(None),
                _ => {}
            }
            buf.clear();
        }
    }

    /// Parses the declarations of an internal subset.
    pub(crate) fn parse(&self, subset: &str) -> DtdSchema {
        let mut schema = DtdSchema::default();

        for caps in self.element.captures_iter(subset) {
            let model: String = caps[2].split_whitespace().collect();
            schema.elements.insert(
                caps[1].to_string(),
                DtdElement {
                    content_type: content_type(&model).to_string(),
                    children: children(&model),
                    content_model: model,
                },
            );
        }

        for caps in self.attlist.captures_iter(subset) {
            let declared = schema.attributes.entry(caps[1].to_string()).or_default();
            for attr in self.attribute.captures_iter(&caps[2]) {
                declared.insert(attr[1].to_string(), attribute(&attr[2], &attr[3]));
            }
        }

        for caps in self.entity.captures_iter(subset) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or_else(String::new, |m| m.as_str().to_string());
            schema.entities.insert(caps[1].to_string(), value);
        }

        tracing::debug!(
            "Parsed inline DTD: {} elements, {} attribute lists, {} entities",
            schema.elements.len(),
            schema.attributes.len(),
            schema.entities.len()
        );
        schema
    }
}

/// Text between the outermost brackets of a DOCTYPE declaration.
fn internal_subset(declaration: &str) -> Option<&str> {
    let start = declaration.find('[')?;
    let end = declaration.rfind(']')?;
    declaration.get(start.checked_add(1)?..end)
}

fn content_type(model: &str) -> &'static str {
    match model {
        "EMPTY" => "EMPTY",
        "ANY" => "ANY",
        "(#PCDATA)" => "PCDATA",
        m if m.contains("#PCDATA") => "MIXED",
        _ => "ELEMENT",
    }
}

fn children(model: &str) -> Vec<DtdChild> {
    if matches!(model, "EMPTY" | "ANY") {
        return Vec::new();
    }
    let flattened: String = model
        .replace("#PCDATA", "")
        .replace('|', ",")
        .chars()
        .filter(|c| *c != '(' && *c != ')')
        .collect();

    flattened
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (name, cardinality) = match part.chars().last() {
                Some('?') => (part.trim_end_matches('?'), "OPTIONAL"),
                Some('*') => (part.trim_end_matches('*'), "ZERO_OR_MORE"),
                Some('+') => (part.trim_end_matches('+'), "ONE_OR_MORE"),
                _ => (part, "REQUIRED"),
            };
            (!name.is_empty()).then(|| DtdChild {
                name: name.to_string(),
                cardinality: cardinality.to_string(),
            })
        })
        .collect()
}

fn attribute(attr_type: &str, default: &str) -> DtdAttribute {
    let (attr_type, allowed_values) = if attr_type.starts_with('(') {
        let values = attr_type
            .trim_matches(|c| c == '(' || c == ')')
            .split('|')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        ("ENUMERATION".to_string(), values)
    } else {
        (attr_type.split_whitespace().collect::<Vec<_>>().join(" "), Vec::new())
    };

    let (default_type, default_value) = match default {
        "#REQUIRED" => ("REQUIRED", None),
        "#IMPLIED" => ("IMPLIED", None),
        fixed if fixed.starts_with("#FIXED") => (
            "FIXED",
            Some(unquote(fixed.trim_start_matches("#FIXED").trim())),
        ),
        literal => ("DEFAULT", Some(unquote(literal))),
    };

    DtdAttribute {
        attr_type,
        default_type: default_type.to_string(),
        default_value,
        allowed_values,
    }
}

fn unquote(value: &str) -> String {
    value.trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// Entity replacement text keyed by entity name.
pub(crate) fn entity_map(dtd: Option<&DtdSchema>) -> BTreeMap<String, String> {
    dtd.map(|d| d.entities.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBSET: &str = r#"
        <!ELEMENT catalog (book+)>
        <!ELEMENT book (title, author*, note?, (isbn | ean))>
        <!ELEMENT title (#PCDATA)>
        <!ELEMENT note (#PCDATA | em)*>
        <!ELEMENT cover EMPTY>
        <!ATTLIST book
            id ID #REQUIRED
            format (hardcover|paperback) "paperback"
            lang CDATA #IMPLIED
            version CDATA #FIXED "1.0">
        <!ENTITY publisher "Acme Books">
        <!ENTITY % internal "ignored">
    "#;

    #[test]
    fn test_element_declarations() {
        let schema = DtdParser::new().unwrap().parse(SUBSET);

        let book = &schema.elements["book"];
        assert_eq!(book.content_type, "ELEMENT");
        assert_eq!(book.content_model, "(title,author*,note?,(isbn|ean))");
        let cardinalities: Vec<(&str, &str)> = book
            .children
            .iter()
            .map(|c| (c.name.as_str(), c.cardinality.as_str()))
            .collect();
        assert_eq!(
            cardinalities,
            vec![
                ("title", "REQUIRED"),
                ("author", "ZERO_OR_MORE"),
                ("note", "OPTIONAL"),
                ("isbn", "REQUIRED"),
                ("ean", "REQUIRED"),
            ]
        );

        assert_eq!(schema.elements["title"].content_type, "PCDATA");
        assert_eq!(schema.elements["note"].content_type, "MIXED");
        assert_eq!(schema.elements["cover"].content_type, "EMPTY");
        assert!(schema.elements["cover"].children.is_empty());
    }

    #[test]
    fn test_attribute_declarations() {
        let schema = DtdParser::new().unwrap().parse(SUBSET);
        let book = &schema.attributes["book"];

        assert_eq!(book["id"].attr_type, "ID");
        assert_eq!(book["id"].default_type, "REQUIRED");

        assert_eq!(book["format"].attr_type, "ENUMERATION");
        assert_eq!(book["format"].allowed_values, vec!["hardcover", "paperback"]);
        assert_eq!(book["format"].default_type, "DEFAULT");
        assert_eq!(book["format"].default_value.as_deref(), Some("paperback"));

        assert_eq!(book["lang"].default_type, "IMPLIED");
        assert_eq!(book["version"].default_type, "FIXED");
        assert_eq!(book["version"].default_value.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_general_entities_only() {
        let schema = DtdParser::new().unwrap().parse(SUBSET);
        assert_eq!(schema.entities.len(), 1);
        assert_eq!(schema.entities["publisher"], "Acme Books");
    }

    #[test]
    fn test_internal_subset_bounds() {
        assert_eq!(internal_subset("catalog [ <!ELEMENT a EMPTY> ]"), Some(" <!ELEMENT a EMPTY> "));
        assert_eq!(internal_subset("html PUBLIC \"-//W3C//DTD\""), None);
    }
}
