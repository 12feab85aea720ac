//! Streaming JSON parser.
//!
//! Array-root documents are decoded one element at a time through a custom
//! [`Visitor`], so only the record currently being walked is held in memory.
//! Records beyond the sample cap are still consumed (as [`IgnoredAny`]) so that
//! syntax errors anywhere in the file abort the parse and every record is
//! counted.

use super::builder::FieldMap;
use super::deadline::Deadline;
use super::mongodb::ExtendedJsonTypes;
use crate::config::ParserConfig;
use crate::models::{ContainerMetadata, ParseResult, SourceFormat};
use crate::{Result, SurveyError};
use serde::Deserializer as _;
use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Recursion limit enforced by `serde_json` while decoding.
const DECODER_DEPTH_LIMIT: usize = 128;

/// Recursive field extractor shared by plain and MongoDB-flavored JSON.
#[derive(Debug)]
pub(crate) struct JsonWalker {
    fields: FieldMap,
    max_depth: usize,
    array_sample_items: usize,
    extended_types: Option<ExtendedJsonTypes>,
}

impl JsonWalker {
    pub(crate) fn new(config: &ParserConfig, extended_types: Option<ExtendedJsonTypes>) -> Self {
        Self {
            fields: FieldMap::new(config.max_sample_values),
            max_depth: config.max_depth,
            array_sample_items: config.array_sample_items,
            extended_types,
        }
    }

    /// Walks one decoded value. Structure deeper than `max_depth` is ignored.
    pub(crate) fn extract(&mut self, value: &Value, parent_path: &str, depth: usize) {
        if depth > self.max_depth {
            return;
        }

        match value {
            Value::Object(map) => {
                if self.is_type_wrapper(value) {
                    return;
                }
                for (key, child) in map {
                    let field_path = if parent_path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", parent_path, key)
                    };
                    self.observe(&field_path, key, parent_path, depth, child);

                    if (child.is_object() || child.is_array()) && !self.is_type_wrapper(child) {
                        self.extract(child, &field_path, depth.saturating_add(1));
                    }
                }
            }
            Value::Array(items) => {
                for item in items.iter().take(self.array_sample_items) {
                    self.extract(item, parent_path, depth);
                }
            }
            _ => {}
        }
    }

    fn observe(
        &mut self,
        field_path: &str,
        field_name: &str,
        parent_path: &str,
        depth: usize,
        value: &Value,
    ) {
        let typed = self
            .extended_types
            .as_ref()
            .and_then(|types| types.unwrap(value));
        let builder = self.fields.entry(field_path, field_name, parent_path, depth);
        match typed {
            Some((tag, sample)) => builder.observe(tag, Some(sample)),
            None => builder.observe_value(value, self.array_sample_items),
        }
    }

    fn is_type_wrapper(&self, value: &Value) -> bool {
        self.extended_types
            .as_ref()
            .is_some_and(|types| types.is_wrapper(value))
    }

    pub(crate) fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn finish(self, format: SourceFormat, total_records: u64, is_array_root: bool) -> ParseResult {
        ParseResult {
            format,
            total_records,
            is_array_root,
            fields: self.fields.finish(),
            container: ContainerMetadata::default(),
        }
    }
}

/// Visits the elements of an array-root document one at a time.
struct RecordVisitor<'a> {
    walker: &'a mut JsonWalker,
    deadline: &'a Deadline,
    max_samples: usize,
    timed_out: &'a mut bool,
}

impl<'de> Visitor<'de> for RecordVisitor<'_> {
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an array of records")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<u64, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut records: u64 = 0;
        loop {
            if self.deadline.is_expired() {
                *self.timed_out = true;
                return Err(de::Error::custom("parse budget exceeded"));
            }

            let sampling = usize::try_from(records).is_ok_and(|r| r < self.max_samples);
            if sampling {
                match seq.next_element::<Value>()? {
                    Some(record) => self.walker.extract(&record, "", 0),
                    None => break,
                }
            } else if seq.next_element::<IgnoredAny>()?.is_none() {
                break;
            }
            records = records.saturating_add(1);
        }
        Ok(records)
    }
}

/// Root shape of a JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Array,
    Object,
}

/// Streaming parser for plain or MongoDB extended JSON.
#[derive(Debug, Clone)]
pub struct JsonParser {
    config: ParserConfig,
    format: SourceFormat,
}

impl JsonParser {
    /// Creates a plain JSON parser.
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            format: SourceFormat::Json,
        }
    }

    /// Creates a parser that understands MongoDB type wrappers.
    pub fn mongodb(config: ParserConfig) -> Self {
        Self {
            config,
            format: SourceFormat::Mongodb,
        }
    }

    /// Parses a JSON file and extracts field observations.
    pub fn parse_file(&self, path: &Path) -> Result<ParseResult> {
        let file = File::open(path).map_err(|e| {
            SurveyError::io(format!("Failed to open {}", path.display()), e)
        })?;
        self.parse_reader(BufReader::new(file))
    }

    /// Parses JSON from any buffered reader.
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> Result<ParseResult> {
        let start_time = std::time::Instant::now();
        let deadline = Deadline::start("JSON parsing", self.config.parse_timeout());

        let extended_types = match self.format {
            SourceFormat::Mongodb => Some(ExtendedJsonTypes::new()?),
            _ => None,
        };
        let mut walker = JsonWalker::new(&self.config, extended_types);

        let root = detect_root(&mut reader)?;
        let mut deserializer = serde_json::Deserializer::from_reader(reader);

        let (total_records, is_array_root) = match root {
            RootKind::Array => {
                let mut timed_out = false;
                let visitor = RecordVisitor {
                    walker: &mut walker,
                    deadline: &deadline,
                    max_samples: self.config.max_samples,
                    timed_out: &mut timed_out,
                };
                let outcome = deserializer.deserialize_seq(visitor);
                if timed_out {
                    return Err(deadline.error());
                }
                (outcome.map_err(decode_error)?, true)
            }
            RootKind::Object => {
                let document: Value =
                    serde::Deserialize::deserialize(&mut deserializer).map_err(decode_error)?;
                deadline.check()?;
                walker.extract(&document, "", 0);
                (1, false)
            }
        };
        deserializer.end().map_err(decode_error)?;

        tracing::info!(
            "Parsed {} in {:.2}s - {} records, {} fields",
            self.format,
            start_time.elapsed().as_secs_f64(),
            total_records,
            walker.field_count()
        );
        Ok(walker.finish(self.format, total_records, is_array_root))
    }
}

/// Skips leading whitespace and reports the root shape without consuming it.
fn detect_root<R: BufRead>(reader: &mut R) -> Result<RootKind> {
    loop {
        let buffer = reader
            .fill_buf()
            .map_err(|e| SurveyError::io("Failed to read JSON input", e))?;
        if buffer.is_empty() {
            return Err(SurveyError::malformed("Invalid JSON", "document is empty"));
        }

        let skip = buffer
            .iter()
            .position(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'));
        match skip {
            Some(offset) => {
                let first = buffer[offset];
                reader.consume(offset);
                return match first {
                    b'[' => Ok(RootKind::Array),
                    b'{' => Ok(RootKind::Object),
                    other => Err(SurveyError::malformed(
                        "Invalid JSON",
                        format!(
                            "root must be an object or array, found '{}'",
                            char::from(other)
                        ),
                    )),
                };
            }
            None => {
                let len = buffer.len();
                reader.consume(len);
            }
        }
    }
}

fn decode_error(error: serde_json::Error) -> SurveyError {
    if error.to_string().starts_with("recursion limit exceeded") {
        return SurveyError::DepthLimitExceeded {
            limit: DECODER_DEPTH_LIMIT,
        };
    }
    if error.is_io() {
        return SurveyError::processing("Failed to read JSON input", error);
    }
    SurveyError::processing("Invalid JSON", error)
}
