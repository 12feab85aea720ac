//! Shared `quick-xml` plumbing for the XML passes.

use crate::{Result, SurveyError};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Opens `path` for forward-only event reading with whitespace trimmed.
pub(crate) fn open(path: &Path) -> Result<Reader<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| SurveyError::io(format!("Failed to open {}", path.display()), e))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);
    Ok(reader)
}

/// Converts a reader failure into a processing error carrying the byte offset.
pub(crate) fn syntax_error<R>(reader: &Reader<R>, error: quick_xml::Error) -> SurveyError {
    SurveyError::processing(
        format!("Malformed XML at byte {}", reader.error_position()),
        error,
    )
}

/// Element name, namespace prefix removed when `strip_namespaces` is set.
pub(crate) fn element_name(start: &BytesStart<'_>, strip_namespaces: bool) -> String {
    if strip_namespaces {
        String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
    } else {
        String::from_utf8_lossy(start.name().as_ref()).into_owned()
    }
}

/// Decoded attributes of an element. Namespace declarations are skipped.
pub(crate) fn attributes(
    start: &BytesStart<'_>,
    strip_namespaces: bool,
) -> Result<Vec<(String, String)>> {
    let mut result = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| SurveyError::processing("Malformed XML attribute", e))?;
        let qualified = attr.key.as_ref();
        if qualified == b"xmlns" || qualified.starts_with(b"xmlns:") {
            continue;
        }
        let name = if strip_namespaces {
            String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned()
        } else {
            String::from_utf8_lossy(qualified).into_owned()
        };
        let value = attr
            .unescape_value()
            .map_err(|e| SurveyError::processing(format!("Malformed value for attribute {}", name), e))?;
        result.push((name, value.into_owned()));
    }
    Ok(result)
}

/// Unescapes character data, resolving entities declared in the inline DTD.
pub(crate) fn text(event: &BytesText<'_>, entities: &BTreeMap<String, String>) -> Result<String> {
    event
        .unescape_with(|name| entities.get(name).map(String::as_str))
        .map(|text| text.into_owned())
        .map_err(|e| SurveyError::processing("Malformed XML text", e))
}
