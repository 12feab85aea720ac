//! Read-only SQLite connections.

use crate::{Result, SurveyError};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Time allowed to acquire the single connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens `path` read-only on a single-connection pool.
///
/// The file is never created or modified. A file that is not a SQLite
/// database opens lazily and fails on the first query.
pub(crate) async fn open_read_only(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(|e| {
            SurveyError::processing(
                format!("Cannot open SQLite database {}", path.display()),
                e,
            )
        })
}

/// Quotes an identifier for interpolation into SQL.
pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quotes a string literal for PRAGMA arguments.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
