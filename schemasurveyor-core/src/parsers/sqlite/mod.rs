//! SQLite database parser.
//!
//! # Module Structure
//! - `connection`: read-only single-connection pool
//! - `introspection`: catalog queries and per-column sampling
//! - `type_mapping`: declared type to field type conversion
//!
//! Every table becomes a parent path and every column a field
//! `table.column` at nesting level 1. All statements are SELECT or PRAGMA.

mod connection;
mod introspection;
mod type_mapping;

pub(crate) use connection::open_read_only;
pub(crate) use introspection::{TableInfo, describe_table, list_tables};
pub use type_mapping::map_sqlite_type;

use super::builder::FieldMap;
use super::deadline::Deadline;
use crate::Result;
use crate::config::ParserConfig;
use crate::models::{
    ContainerMetadata, FieldType, ParseResult, SourceFormat, SqliteColumnMetadata,
};
use sqlx::SqlitePool;
use std::path::Path;

/// Parser for SQLite database files.
#[derive(Debug, Clone)]
pub struct SqliteParser {
    config: ParserConfig,
}

impl SqliteParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Introspects every user table of the database at `path`.
    pub async fn parse_file(&self, path: &Path) -> Result<ParseResult> {
        let start_time = std::time::Instant::now();
        let deadline = Deadline::start("SQLite parsing", self.config.parse_timeout());
        let pool = open_read_only(path).await?;

        let outcome = async {
            let tables = list_tables(&pool, &[]).await?;
            tracing::info!("Surveying {} tables in {}", tables.len(), path.display());
            let mut fields = FieldMap::new(self.config.max_sample_values);
            let described =
                survey_tables(&pool, &tables, &self.config, &deadline, &mut fields).await?;
            Ok::<_, crate::SurveyError>((described, fields))
        }
        .await;
        pool.close().await;
        let (described, fields) = outcome?;

        let total_records = described
            .iter()
            .fold(0u64, |sum, table| sum.saturating_add(table.row_count));
        tracing::info!(
            "Parsed SQLite database in {:.2}s - {} tables, {} rows, {} fields",
            start_time.elapsed().as_secs_f64(),
            described.len(),
            total_records,
            fields.len()
        );

        Ok(ParseResult {
            format: SourceFormat::Sqlite,
            total_records,
            is_array_root: true,
            fields: fields.finish(),
            container: ContainerMetadata::default(),
        })
    }
}

/// Describes and samples each table into `fields`.
///
/// Sampling failures on a single column are logged and leave that column
/// with catalog information and counts only.
pub(crate) async fn survey_tables(
    pool: &SqlitePool,
    tables: &[String],
    config: &ParserConfig,
    deadline: &Deadline,
    fields: &mut FieldMap,
) -> Result<Vec<TableInfo>> {
    let sample_limit = u64::try_from(config.max_samples).unwrap_or(u64::MAX);
    let mut described = Vec::with_capacity(tables.len());

    for table_name in tables {
        deadline.check()?;
        let table = describe_table(pool, table_name).await?;

        for column in &table.columns {
            deadline.check()?;
            let field_path = format!("{}.{}", table.name, column.name);
            let builder = fields.entry(&field_path, &column.name, &table.name, 1);
            builder.metadata.sqlite = Some(SqliteColumnMetadata {
                table_name: table.name.clone(),
                column_type: column.declared_type.clone(),
                is_primary_key: column.is_primary_key,
                is_foreign_key: table.foreign_keys.contains_key(&column.name),
                foreign_key_ref: table.foreign_keys.get(&column.name).cloned(),
                is_unique: table.unique.contains(&column.name),
                is_indexed: table.indexed.contains(&column.name),
                is_not_null: column.not_null,
                default_value: column.default_value.clone(),
            });

            let declared = map_sqlite_type(&column.declared_type);
            if table.row_count == 0 {
                builder.declare_type(declared.unwrap_or(FieldType::String));
                continue;
            }

            let limit = sample_limit.min(table.row_count);
            let sample = match introspection::sample_column(pool, &table.name, &column.name, limit)
                .await
            {
                Ok(sample) => sample,
                Err(e) => {
                    tracing::warn!("{}", e);
                    introspection::ColumnSample::default()
                }
            };

            let observed: Vec<FieldType> = sample.observed.iter().copied().collect();
            let primary =
                declared.unwrap_or_else(|| type_mapping::infer_untyped(&observed));
            let null_count = sample.null_count.min(table.row_count);
            builder.observe_many(primary, table.row_count.saturating_sub(null_count));
            builder.observe_many(FieldType::Null, null_count);
            for value in sample.values {
                builder.add_sample(value);
            }
        }

        described.push(table);
    }
    Ok(described)
}
