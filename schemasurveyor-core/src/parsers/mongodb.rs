//! MongoDB extended JSON type wrappers.
//!
//! Exports from `mongoexport` encode BSON types as single-key objects such as
//! `{"$oid": "..."}`. These are recognized before generic object handling
//! and recorded as typed leaves; no field paths are ever created beneath an
//! object carrying one of the marker keys.

use crate::models::FieldType;
use regex::Regex;
use serde_json::Value;

/// Keys that mark an object as a type wrapper.
const TYPE_MARKERS: [&str; 5] = ["$oid", "$date", "$numberLong", "$numberDecimal", "$binary"];

/// Sample recorded for binary payloads.
const BINARY_SAMPLE: &str = "<binary>";

/// Recognizer for extended JSON type wrappers.
#[derive(Debug, Clone)]
pub struct ExtendedJsonTypes {
    object_id: Regex,
    iso_date: Regex,
}

impl ExtendedJsonTypes {
    /// Compiles the wrapper value patterns.
    pub fn new() -> crate::Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                crate::SurveyError::configuration(format!("Invalid wrapper pattern: {}", e))
            })
        };
        Ok(Self {
            object_id: compile(r"(?i)^[a-f0-9]{24}$")?,
            iso_date: compile(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{3})?Z?$")?,
        })
    }

    /// True if `value` is an object holding any marker key.
    pub fn is_wrapper(&self, value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|map| TYPE_MARKERS.iter().any(|marker| map.contains_key(*marker)))
    }

    /// Decodes a well-formed wrapper into its type tag and bare sample.
    ///
    /// Malformed wrappers (for example an `$oid` that is not 24 hex digits)
    /// return `None` and are observed as plain objects.
    pub fn unwrap(&self, value: &Value) -> Option<(FieldType, Value)> {
        let map = value.as_object()?;

        if let Some(Value::String(oid)) = map.get("$oid")
            && self.object_id.is_match(oid)
        {
            return Some((FieldType::MongodbObjectid, Value::String(oid.clone())));
        }

        match map.get("$date") {
            Some(Value::String(date)) if self.iso_date.is_match(date) => {
                return Some((FieldType::MongodbDate, Value::String(date.clone())));
            }
            Some(Value::Object(inner)) => {
                if let Some(millis) = inner.get("$numberLong") {
                    return Some((FieldType::MongodbDate, millis.clone()));
                }
            }
            _ => {}
        }

        if let Some(Value::String(long)) = map.get("$numberLong") {
            return Some((FieldType::MongodbLong, Value::String(long.clone())));
        }

        if let Some(Value::String(decimal)) = map.get("$numberDecimal") {
            return Some((FieldType::MongodbDecimal, Value::String(decimal.clone())));
        }

        if let Some(Value::Object(_)) = map.get("$binary") {
            return Some((
                FieldType::MongodbBinary,
                Value::String(BINARY_SAMPLE.to_string()),
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserConfig;
    use crate::parsers::json::JsonParser;
    use serde_json::json;
    use std::io::Cursor;

    fn types() -> ExtendedJsonTypes {
        ExtendedJsonTypes::new().unwrap()
    }

    #[test]
    fn test_object_id() {
        let (tag, sample) = types()
            .unwrap(&json!({"$oid": "507f1f77bcf86cd799439011"}))
            .unwrap();
        assert_eq!(tag, FieldType::MongodbObjectid);
        assert_eq!(sample, json!("507f1f77bcf86cd799439011"));
    }

    #[test]
    fn test_invalid_object_id_is_not_unwrapped() {
        let t = types();
        let value = json!({"$oid": "not-an-id"});
        assert!(t.unwrap(&value).is_none());
        assert!(t.is_wrapper(&value));
    }

    #[test]
    fn test_dates() {
        let t = types();
        let (tag, sample) = t.unwrap(&json!({"$date": "2024-03-01T12:00:00.000Z"})).unwrap();
        assert_eq!(tag, FieldType::MongodbDate);
        assert_eq!(sample, json!("2024-03-01T12:00:00.000Z"));

        let (tag, sample) = t
            .unwrap(&json!({"$date": {"$numberLong": "1709294400000"}}))
            .unwrap();
        assert_eq!(tag, FieldType::MongodbDate);
        assert_eq!(sample, json!("1709294400000"));

        assert!(t.unwrap(&json!({"$date": "March 1st"})).is_none());
    }

    #[test]
    fn test_numeric_and_binary_wrappers() {
        let t = types();
        assert_eq!(
            t.unwrap(&json!({"$numberLong": "9007199254740993"})),
            Some((FieldType::MongodbLong, json!("9007199254740993")))
        );
        assert_eq!(
            t.unwrap(&json!({"$numberDecimal": "19.99"})),
            Some((FieldType::MongodbDecimal, json!("19.99")))
        );
        assert_eq!(
            t.unwrap(&json!({"$binary": {"base64": "AAEC", "subType": "00"}})),
            Some((FieldType::MongodbBinary, json!("<binary>")))
        );
        assert!(t.unwrap(&json!({"plain": 1})).is_none());
    }

    #[test]
    fn test_wrappers_create_no_nested_paths() {
        let input = r#"[
            {"_id": {"$oid": "507f1f77bcf86cd799439011"}, "profile": {"joined": {"$date": "2024-01-01T00:00:00Z"}}},
            {"_id": {"$oid": "507f1f77bcf86cd799439012"}, "profile": {"joined": {"$date": {"$numberLong": "1"}}}}
        ]"#;
        let result = JsonParser::mongodb(ParserConfig::default())
            .parse_reader(Cursor::new(input.as_bytes().to_vec()))
            .unwrap();

        let paths: Vec<&str> = result.fields.iter().map(|f| f.field_path.as_str()).collect();
        assert_eq!(paths, vec!["_id", "profile", "profile.joined"]);

        let id = &result.fields[0];
        assert_eq!(id.type_counts.get(&FieldType::MongodbObjectid), Some(&2));
        assert_eq!(id.sample_values[0], json!("507f1f77bcf86cd799439011"));

        let joined = &result.fields[2];
        assert_eq!(joined.type_counts.get(&FieldType::MongodbDate), Some(&2));
    }

    #[test]
    fn test_plain_parser_ignores_wrappers() {
        let input = r#"[{"_id": {"$oid": "507f1f77bcf86cd799439011"}}]"#;
        let result = JsonParser::new(ParserConfig::default())
            .parse_reader(Cursor::new(input.as_bytes().to_vec()))
            .unwrap();
        let paths: Vec<&str> = result.fields.iter().map(|f| f.field_path.as_str()).collect();
        assert_eq!(paths, vec!["_id", "_id.$oid"]);
    }
}
