//! Catalog queries and per-column sampling.
//!
//! # SQLite System Tables
//! - `sqlite_master`: table enumeration
//! - `PRAGMA table_info()`: column names, declared types, defaults, keys
//! - `PRAGMA foreign_key_list()`: referenced `table(column)` pairs
//! - `PRAGMA index_list()` / `PRAGMA index_info()`: indexed and unique columns

use super::connection::{quote_identifier, quote_literal};
use crate::models::FieldType;
use crate::{Result, SurveyError};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone)]
pub(crate) struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

/// Catalog description of one table.
#[derive(Debug, Clone)]
pub(crate) struct TableInfo {
    pub name: String,
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
    /// Column name to `table(column)`
    pub foreign_keys: HashMap<String, String>,
    pub indexed: HashSet<String>,
    pub unique: HashSet<String>,
}

/// Null count and distinct non-null samples of one column.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnSample {
    pub null_count: u64,
    pub values: Vec<Value>,
    pub observed: BTreeSet<FieldType>,
}

/// Lists user tables, skipping SQLite internals and any `excluded_prefixes`.
pub(crate) async fn list_tables(
    pool: &SqlitePool,
    excluded_prefixes: &[&str],
) -> Result<Vec<String>> {
    let tables_query = r#"
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#;

    let rows = sqlx::query(tables_query)
        .fetch_all(pool)
        .await
        .map_err(|e| SurveyError::processing("Failed to enumerate tables", e))?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get("name")
            .map_err(|e| SurveyError::processing("Failed to parse table name", e))?;
        if excluded_prefixes.iter().any(|prefix| name.starts_with(prefix)) {
            continue;
        }
        tables.push(name);
    }
    Ok(tables)
}

/// Collects columns, keys and indexes of `table_name`.
pub(crate) async fn describe_table(pool: &SqlitePool, table_name: &str) -> Result<TableInfo> {
    let columns = collect_columns(pool, table_name).await?;
    let foreign_keys = collect_foreign_keys(pool, table_name).await?;
    let (indexed, unique) = collect_indexed_columns(pool, table_name).await?;

    let row_count = match count_rows(pool, table_name).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("Failed to count rows of '{}': {}", table_name, e);
            0
        }
    };

    tracing::debug!(
        "Described table '{}': {} columns, {} rows, {} foreign keys, {} indexed columns",
        table_name,
        columns.len(),
        row_count,
        foreign_keys.len(),
        indexed.len()
    );

    Ok(TableInfo {
        name: table_name.to_string(),
        row_count,
        columns,
        foreign_keys,
        indexed,
        unique,
    })
}

async fn collect_columns(pool: &SqlitePool, table_name: &str) -> Result<Vec<ColumnInfo>> {
    let query = format!("PRAGMA table_info({})", quote_literal(table_name));
    let rows = sqlx::query(&query).fetch_all(pool).await.map_err(|e| {
        SurveyError::processing(
            format!("Failed to collect columns for table '{}'", table_name),
            e,
        )
    })?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let notnull: i64 = row.try_get("notnull").unwrap_or(0);
        let pk: i64 = row.try_get("pk").unwrap_or(0);
        columns.push(ColumnInfo {
            name: row.try_get("name").unwrap_or_default(),
            declared_type: row
                .try_get::<Option<String>, _>("type")
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_uppercase(),
            not_null: notnull != 0,
            default_value: row.try_get::<Option<String>, _>("dflt_value").ok().flatten(),
            is_primary_key: pk > 0,
        });
    }
    Ok(columns)
}

async fn collect_foreign_keys(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<HashMap<String, String>> {
    let query = format!("PRAGMA foreign_key_list({})", quote_literal(table_name));
    let rows = sqlx::query(&query).fetch_all(pool).await.map_err(|e| {
        SurveyError::processing(
            format!("Failed to collect foreign keys for table '{}'", table_name),
            e,
        )
    })?;

    let mut foreign_keys = HashMap::new();
    for row in &rows {
        let from_col: String = row.try_get("from").unwrap_or_default();
        let ref_table: String = row.try_get("table").unwrap_or_default();
        let ref_col: Option<String> = row.try_get("to").ok().flatten();
        foreign_keys.insert(
            from_col,
            format!("{}({})", ref_table, ref_col.unwrap_or_default()),
        );
    }
    Ok(foreign_keys)
}

async fn collect_indexed_columns(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<(HashSet<String>, HashSet<String>)> {
    let query = format!("PRAGMA index_list({})", quote_literal(table_name));
    let index_rows = sqlx::query(&query).fetch_all(pool).await.map_err(|e| {
        SurveyError::processing(
            format!("Failed to collect indexes for table '{}'", table_name),
            e,
        )
    })?;

    let mut indexed = HashSet::new();
    let mut unique = HashSet::new();
    for index in &index_rows {
        let index_name: String = index.try_get("name").unwrap_or_default();
        let is_unique: i64 = index.try_get("unique").unwrap_or(0);

        let info_query = format!("PRAGMA index_info({})", quote_literal(&index_name));
        let column_rows = sqlx::query(&info_query).fetch_all(pool).await.map_err(|e| {
            SurveyError::processing(
                format!("Failed to collect index columns for '{}'", index_name),
                e,
            )
        })?;

        for column in &column_rows {
            let Ok(Some(name)) = column.try_get::<Option<String>, _>("name") else {
                continue;
            };
            if is_unique != 0 {
                unique.insert(name.clone());
            }
            indexed.insert(name);
        }
    }
    Ok((indexed, unique))
}

async fn count_rows(pool: &SqlitePool, table_name: &str) -> Result<u64> {
    let query = format!("SELECT COUNT(*) FROM {}", quote_identifier(table_name));
    let count: i64 = sqlx::query_scalar(&query).fetch_one(pool).await.map_err(|e| {
        SurveyError::processing(
            format!("Failed to get row count for table '{}'", table_name),
            e,
        )
    })?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Counts nulls and fetches up to `limit` distinct non-null values.
pub(crate) async fn sample_column(
    pool: &SqlitePool,
    table_name: &str,
    column_name: &str,
    limit: u64,
) -> Result<ColumnSample> {
    let table = quote_identifier(table_name);
    let column = quote_identifier(column_name);
    let context = || format!("Failed to sample column '{}.{}'", table_name, column_name);

    let null_query = format!("SELECT COUNT(*) FROM {} WHERE {} IS NULL", table, column);
    let null_count: i64 = sqlx::query_scalar(&null_query)
        .fetch_one(pool)
        .await
        .map_err(|e| SurveyError::processing(context(), e))?;

    let sample_query = format!(
        "SELECT DISTINCT {column} FROM {table} WHERE {column} IS NOT NULL LIMIT {limit}"
    );
    let rows = sqlx::query(&sample_query)
        .fetch_all(pool)
        .await
        .map_err(|e| SurveyError::processing(context(), e))?;

    let mut sample = ColumnSample {
        null_count: u64::try_from(null_count).unwrap_or(0),
        ..ColumnSample::default()
    };
    for row in &rows {
        if let Some((tag, value)) = decode_value(row) {
            sample.observed.insert(tag);
            sample.values.extend(value);
        }
    }
    Ok(sample)
}

/// Decodes the first column of `row` by its storage class.
///
/// BLOB values report their type but are never sampled.
fn decode_value(row: &SqliteRow) -> Option<(FieldType, Option<Value>)> {
    let raw = row.try_get_raw(0).ok()?;
    if raw.is_null() {
        return None;
    }
    let storage_class = raw.type_info().name().to_string();

    match storage_class.as_str() {
        "INTEGER" => row
            .try_get::<i64, _>(0)
            .ok()
            .map(|n| (FieldType::Integer, Some(Value::from(n)))),
        "REAL" => row
            .try_get::<f64, _>(0)
            .ok()
            .map(|f| (FieldType::Float, serde_json::Number::from_f64(f).map(Value::Number))),
        "BLOB" => Some((FieldType::Binary, None)),
        _ => row
            .try_get::<String, _>(0)
            .ok()
            .map(|s| (FieldType::String, Some(Value::String(s)))),
    }
}
