//! Streaming XML parser.
//!
//! Parsing runs in separate forward-only passes over the file:
//!
//! 1. size check against the configured ceiling
//! 2. inline DTD extraction (non-fatal)
//! 3. companion XSD extraction when a path is supplied (non-fatal)
//! 4. record boundary detection over the first elements
//! 5. field extraction, holding only the open element chain of the
//!    current record
//!
//! The schema side-channel from passes 2 and 3 is merged onto the finished
//! fields afterwards by [`enhance::enhance_fields`].

mod dtd;
mod enhance;
mod reader;
mod structure;
mod xsd;

use super::builder::FieldMap;
use super::deadline::Deadline;
use crate::config::{ParserConfig, XmlConfig};
use crate::models::{
    ContainerMetadata, FieldType, ParseResult, SourceFormat, XmlFieldMetadata, XmlSchemaInfo,
};
use crate::{Result, SurveyError};
use quick_xml::events::{BytesStart, Event};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use structure::RecordStructure;

/// Streaming parser for XML documents with optional DTD/XSD metadata.
#[derive(Debug, Clone)]
pub struct XmlParser {
    parser: ParserConfig,
    xml: XmlConfig,
}

impl XmlParser {
    pub fn new(parser: ParserConfig, xml: XmlConfig) -> Self {
        Self { parser, xml }
    }

    /// Parses an XML file, optionally describing it with a companion XSD.
    pub fn parse_file(&self, path: &Path, xsd_path: Option<&Path>) -> Result<ParseResult> {
        let start_time = std::time::Instant::now();

        let size = std::fs::metadata(path)
            .map_err(|e| SurveyError::io(format!("Failed to stat {}", path.display()), e))?
            .len();
        if size > self.xml.max_file_size_bytes {
            return Err(SurveyError::FileTooLarge {
                size,
                limit: self.xml.max_file_size_bytes,
            });
        }

        let dtd = match dtd::DtdParser::new()?.extract(path, self.xml.dtd_timeout()) {
            Ok(dtd) => dtd,
            Err(e) => {
                tracing::warn!("DTD extraction failed for {}: {}", path.display(), e);
                None
            }
        };
        let xsd = xsd_path.map(|p| xsd::parse_xsd(p, self.xml.dtd_timeout()));

        let structure = structure::detect_structure(
            path,
            self.xml.structure_sample_elements,
            self.xml.strip_namespaces,
            self.xml.structure_timeout(),
        )?;

        let entities = dtd::entity_map(dtd.as_ref());
        let mut extractor = Extractor::new(&self.parser, &self.xml);
        let records = extractor.run(path, structure.as_ref(), &entities)?;

        let (total_records, is_array_root) = match &structure {
            Some(_) => (records, true),
            None => (1, false),
        };
        let field_count = extractor.fields.len();
        let mut fields = extractor.fields.finish();
        if dtd.is_some() || xsd.is_some() {
            enhance::enhance_fields(
                &mut fields,
                &self.xml.attribute_prefix,
                dtd.as_ref(),
                xsd.as_ref(),
            );
        }

        tracing::info!(
            "Parsed XML in {:.2}s - {} records, {} fields",
            start_time.elapsed().as_secs_f64(),
            total_records,
            field_count
        );

        Ok(ParseResult {
            format: SourceFormat::Xml,
            total_records,
            is_array_root,
            fields,
            container: ContainerMetadata {
                xml: Some(XmlSchemaInfo {
                    record_element: structure.map(|s| s.record),
                    dtd,
                    xsd,
                }),
                ..ContainerMetadata::default()
            },
        })
    }
}


/// Repeated child bookkeeping for one open element.
#[derive(Debug, Default)]
struct ChildSeen {
    count: usize,
    tags: BTreeSet<FieldType>,
}

/// Open element inside a record.
#[derive(Debug)]
struct Frame {
    name: String,
    path: String,
    parent_path: String,
    depth: usize,
    tracked: bool,
    text: String,
    children: HashMap<String, ChildSeen>,
}

/// Position of the reader in the document.
#[derive(Debug, Default)]
struct Walk {
    /// Elements enclosing the records, outermost first
    outer: Vec<String>,
    /// Open elements of the current record, record element first
    open: Vec<Frame>,
    records: u64,
    root_seen: bool,
}

/// Event-driven field extractor for one document.
struct Extractor<'a> {
    fields: FieldMap,
    config: &'a XmlConfig,
    max_depth: usize,
    max_samples: usize,
}

impl<'a> Extractor<'a> {
    fn new(parser: &ParserConfig, config: &'a XmlConfig) -> Self {
        Self {
            fields: FieldMap::new(parser.max_sample_values),
            config,
            max_depth: parser.max_depth,
            max_samples: parser.max_samples,
        }
    }

    /// Reads the whole document and returns the number of records seen.
    ///
    /// Records past the sample cap are read and checked for well-formedness
    /// but not extracted.
    fn run(
        &mut self,
        path: &Path,
        structure: Option<&RecordStructure>,
        entities: &BTreeMap<String, String>,
    ) -> Result<u64> {
        let deadline = Deadline::start("XML parsing", self.config.parse_timeout());
        let mut reader = reader::open(path)?;
        let mut buf = Vec::new();
        let mut walk = Walk::default();

        loop {
            deadline.check()?;
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| reader::syntax_error(&reader, e))?;

            match event {
                Event::Start(start) => self.start_element(&start, false, structure, &mut walk)?,
                Event::Empty(start) => self.start_element(&start, true, structure, &mut walk)?,
                Event::End(_) => {
                    if walk.open.is_empty() {
                        walk.outer.pop();
                    } else {
                        self.close_element(&mut walk.open);
                    }
                }
                Event::Text(text) => {
                    let content = reader::text(&text, entities)?;
                    if let Some(frame) = walk.open.last_mut()
                        && frame.tracked
                    {
                        frame.text.push_str(&content);
                    }
                }
                Event::CData(data) => {
                    if let Some(frame) = walk.open.last_mut()
                        && frame.tracked
                    {
                        frame.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !walk.open.is_empty() || !walk.outer.is_empty() {
            return Err(SurveyError::malformed(
                "Malformed XML",
                "unexpected end of document inside an open element",
            ));
        }
        if !walk.root_seen {
            return Err(SurveyError::malformed(
                "Malformed XML",
                "document has no root element",
            ));
        }
        Ok(walk.records)
    }

    fn start_element(
        &mut self,
        start: &BytesStart<'_>,
        self_closing: bool,
        structure: Option<&RecordStructure>,
        walk: &mut Walk,
    ) -> Result<()> {
        let name = reader::element_name(start, self.config.strip_namespaces);

        let frame = match walk.open.last_mut() {
            Some(parent) => {
                let seen = parent.children.entry(name.clone()).or_default();
                seen.count = seen.count.saturating_add(1);
                let depth = parent.depth.saturating_add(1);
                let tracked = parent.tracked && depth <= self.max_depth;
                let parent_path = parent.path.clone();
                self.open_element(start, name, &parent_path, depth, tracked)?
            }
            None => {
                if walk.outer.is_empty() {
                    if walk.root_seen {
                        return Err(SurveyError::malformed(
                            "Malformed XML",
                            "document has more than one root element",
                        ));
                    }
                    walk.root_seen = true;
                }

                let starts_record = match structure {
                    Some(s) => name == s.record && walk.outer.last() == Some(&s.parent),
                    None => walk.outer.is_empty(),
                };
                if !starts_record {
                    if !self_closing {
                        walk.outer.push(name);
                    }
                    return Ok(());
                }

                walk.records = walk.records.saturating_add(1);
                let tracked = usize::try_from(walk.records).is_ok_and(|r| r <= self.max_samples);
                self.open_element(start, name, "", 0, tracked)?
            }
        };

        walk.open.push(frame);
        if self_closing {
            self.close_element(&mut walk.open);
        }
        Ok(())
    }

    /// Registers an element and its attributes, returning its frame.
    fn open_element(
        &mut self,
        start: &BytesStart<'_>,
        name: String,
        parent_path: &str,
        depth: usize,
        tracked: bool,
    ) -> Result<Frame> {
        let path = if parent_path.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", parent_path, name)
        };

        let attributes = reader::attributes(start, self.config.strip_namespaces)?;
        if tracked {
            for (attr, value) in attributes {
                let attr_name = format!("{}{}", self.config.attribute_prefix, attr);
                let attr_path = format!("{}.{}", path, attr_name);
                let builder = self.fields.entry(&attr_path, &attr_name, &path, depth);
                builder.metadata.xml.get_or_insert_with(|| XmlFieldMetadata {
                    is_attribute: true,
                    ..XmlFieldMetadata::default()
                });
                builder.observe(FieldType::String, Some(Value::String(value)));
            }
            self.fields
                .entry(&path, &name, parent_path, depth)
                .metadata
                .xml
                .get_or_insert_with(XmlFieldMetadata::default);
        }

        Ok(Frame {
            name,
            path,
            parent_path: parent_path.to_string(),
            depth,
            tracked,
            text: String::new(),
            children: HashMap::new(),
        })
    }

    /// Observes the innermost open element and pops it.
    ///
    /// Elements with children are observed as objects, leaves as their
    /// trimmed text, and empty leaves as null. Children that occurred more
    /// than once under this element are flagged as arrays.
    fn close_element(&mut self, open: &mut Vec<Frame>) {
        let Some(frame) = open.pop() else {
            return;
        };
        if !frame.tracked {
            return;
        }

        let tag = if !frame.children.is_empty() {
            FieldType::Object
        } else if frame.text.is_empty() {
            FieldType::Null
        } else {
            FieldType::String
        };
        let sample = (tag == FieldType::String).then(|| Value::String(frame.text));
        self.fields
            .entry(&frame.path, &frame.name, &frame.parent_path, frame.depth)
            .observe(tag, sample);

        if let Some(parent) = open.last_mut()
            && let Some(seen) = parent.children.get_mut(&frame.name)
        {
            seen.tags.insert(tag);
        }

        for (child, seen) in frame.children {
            if seen.count < 2 {
                continue;
            }
            let child_path = format!("{}.{}", frame.path, child);
            if let Some(builder) = self.fields.get_mut(&child_path) {
                builder.mark_array(None);
                for item in seen.tags {
                    builder.mark_array(Some(item));
                }
            }
        }
    }
}
