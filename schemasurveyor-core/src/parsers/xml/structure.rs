//! Record boundary detection.
//!
//! Samples the first closed elements of a document and looks for a child
//! element that repeats under the same parent near the top of the tree.

use super::reader;
use crate::Result;
use crate::parsers::deadline::Deadline;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Deepest level at which a repeating element is accepted as the record.
const MAX_RECORD_DEPTH: usize = 2;

/// Repeating element that delimits records, and the element holding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordStructure {
    pub parent: String,
    pub record: String,
}

#[derive(Debug, Default)]
struct PairStats {
    count: usize,
    depth: usize,
    first_seen: usize,
}

/// Inspects up to `sample_elements` closed elements of `path`.
///
/// Returns `None` when the document is a single record. Syntax errors in
/// the sampled prefix abort detection.
pub(crate) fn detect_structure(
    path: &Path,
    sample_elements: usize,
    strip_namespaces: bool,
    budget: Duration,
) -> Result<Option<RecordStructure>> {
    let deadline = Deadline::start("XML structure detection", budget);
    let mut reader = reader::open(path)?;
    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut pairs: HashMap<(String, String), PairStats> = HashMap::new();
    let mut checked = 0usize;

    while checked < sample_elements {
        deadline.check()?;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| reader::syntax_error(&reader, e))?;
        let closed = match event {
            Event::Start(start) => {
                stack.push(reader::element_name(&start, strip_namespaces));
                None
            }
            Event::Empty(start) => Some(reader::element_name(&start, strip_namespaces)),
            Event::End(_) => stack.pop(),
            Event::Eof => break,
            _ => None,
        };

        if let Some(tag) = closed {
            if let Some(parent) = stack.last() {
                let next_ordinal = pairs.len();
                let stats = pairs
                    .entry((parent.clone(), tag))
                    .or_insert_with(|| PairStats {
                        first_seen: next_ordinal,
                        ..PairStats::default()
                    });
                stats.count = stats.count.saturating_add(1);
                stats.depth = stack.len();
            }
            checked = checked.saturating_add(1);
        }
        buf.clear();
    }

    let record = pairs
        .into_iter()
        .filter(|(_, stats)| stats.count > 1 && stats.depth <= MAX_RECORD_DEPTH)
        .min_by_key(|(_, stats)| (stats.depth, stats.first_seen))
        .map(|((parent, record), _)| RecordStructure { parent, record });

    match &record {
        Some(structure) => tracing::debug!(
            "Detected repeating <{}> records under <{}>",
            structure.record,
            structure.parent
        ),
        None => tracing::debug!("No repeating element found; treating document as one record"),
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_xml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn detect(content: &str) -> Option<RecordStructure> {
        let file = write_xml(content);
        detect_structure(file.path(), 100, true, Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn test_collection_prefers_shallowest_repeat() {
        let found = detect(
            "<library><book><title>A</title></book><book><title>B</title></book></library>",
        );
        assert_eq!(
            found,
            Some(RecordStructure {
                parent: "library".to_string(),
                record: "book".to_string(),
            })
        );
    }

    #[test]
    fn test_single_record() {
        assert_eq!(detect("<config><name>x</name><port>80</port></config>"), None);
    }

    #[test]
    fn test_empty_elements_count_as_records() {
        let found = detect(r#"<points><pt x="1"/><pt x="2"/></points>"#);
        assert_eq!(found.map(|s| s.record), Some("pt".to_string()));
    }

    #[test]
    fn test_namespace_prefix_is_stripped() {
        let found = detect(
            r#"<ns:feed xmlns:ns="urn:x"><ns:entry>a</ns:entry><ns:entry>b</ns:entry></ns:feed>"#,
        );
        assert_eq!(found.map(|s| s.record), Some("entry".to_string()));
    }

    #[test]
    fn test_syntax_error_in_prefix_fails() {
        let file = write_xml("<a><b></c></a>");
        assert!(detect_structure(file.path(), 100, true, Duration::from_secs(30)).is_err());
    }
}
