//! Format parsers.
//!
//! Every parser turns one file into a [`ParseResult`]: finalized field
//! observations plus a record count. Parsers never modify their input and
//! never return a partial result for a malformed document.
//!
//! # Supported Formats
//! - JSON and MongoDB extended JSON (streamed record by record)
//! - XML with optional inline DTD and companion XSD
//! - SQLite and GeoPackage (feature `sqlite`)
//! - Protobuf descriptor sets and `.proto` sources (feature `protobuf`)

pub(crate) mod builder;
pub mod deadline;
#[cfg(feature = "sqlite")]
pub mod geopackage;
pub mod json;
pub mod mongodb;
#[cfg(feature = "protobuf")]
pub mod protobuf;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod xml;

pub use deadline::Deadline;
#[cfg(feature = "sqlite")]
pub use geopackage::GeoPackageParser;
pub use json::JsonParser;
#[cfg(feature = "protobuf")]
pub use protobuf::ProtobufParser;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteParser;
pub use xml::XmlParser;

use crate::config::SurveyConfig;
use crate::models::{ParseResult, SourceFormat};
use crate::{Result, SurveyError};
use std::path::Path;

/// Parses `path` with the parser selected by `format`.
///
/// `xsd_path` is only consulted for XML.
///
/// # Errors
///
/// Returns a validation error for a missing file or an extension that does
/// not belong to `format`, and [`SurveyError::UnsupportedFormat`] when the
/// parser for `format` was compiled out.
pub async fn parse(
    path: &Path,
    format: SourceFormat,
    config: &SurveyConfig,
    xsd_path: Option<&Path>,
) -> Result<ParseResult> {
    validate_input(path, format)?;
    tracing::info!("Parsing {} as {}", path.display(), format);

    match format {
        SourceFormat::Json | SourceFormat::Mongodb => {
            let parser = if format == SourceFormat::Mongodb {
                JsonParser::mongodb(config.parser.clone())
            } else {
                JsonParser::new(config.parser.clone())
            };
            let path = path.to_path_buf();
            run_blocking(move || parser.parse_file(&path)).await
        }
        SourceFormat::Xml => {
            let parser = XmlParser::new(config.parser.clone(), config.xml.clone());
            let path = path.to_path_buf();
            let xsd_path = xsd_path.map(Path::to_path_buf);
            run_blocking(move || parser.parse_file(&path, xsd_path.as_deref())).await
        }
        #[cfg(feature = "sqlite")]
        SourceFormat::Sqlite => SqliteParser::new(config.parser.clone()).parse_file(path).await,
        #[cfg(feature = "sqlite")]
        SourceFormat::Geopackage => {
            GeoPackageParser::new(config.parser.clone())
                .parse_file(path)
                .await
        }
        #[cfg(feature = "protobuf")]
        SourceFormat::Protobuf => {
            ProtobufParser::new(config.parser.clone())
                .parse_file(path)
                .await
        }
        #[allow(unreachable_patterns)]
        other => Err(SurveyError::UnsupportedFormat {
            format: other.to_string(),
        }),
    }
}

/// Parses `path`, deriving the format from its extension.
pub async fn parse_path(path: &Path, config: &SurveyConfig) -> Result<ParseResult> {
    let format = SourceFormat::from_path(path).ok_or_else(|| {
        SurveyError::validation(format!(
            "Cannot determine format of {} from its extension",
            path.display()
        ))
    })?;
    parse(path, format, config, None).await
}

/// Checks that `path` is an existing file with an extension of `format`.
pub fn validate_input(path: &Path, format: SourceFormat) -> Result<()> {
    if !path.is_file() {
        return Err(SurveyError::validation(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !format.extensions().contains(&extension.as_str()) {
        return Err(SurveyError::validation(format!(
            "Extension '.{}' is not valid for {} (expected one of: {})",
            extension,
            format,
            format.extensions().join(", ")
        )));
    }
    Ok(())
}

async fn run_blocking<F>(task: F) -> Result<ParseResult>
where
    F: FnOnce() -> Result<ParseResult> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| SurveyError::processing("Parser task failed", e))?
}
