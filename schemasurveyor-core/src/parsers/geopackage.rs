//! GeoPackage parser.
//!
//! A GeoPackage is a SQLite database with three mandatory catalog tables.
//! Columns are surveyed exactly like plain SQLite; geometry columns and
//! columns of registered layers are then enriched from the catalog.

use super::builder::FieldMap;
use super::deadline::Deadline;
use super::sqlite::{TableInfo, list_tables, open_read_only, survey_tables};
use crate::config::ParserConfig;
use crate::models::{
    BoundingBox, ContainerMetadata, GeoFieldMetadata, GeoPackageMetadata, GeometryColumn,
    LayerInfo, ParseResult, SourceFormat, SpatialRefSys,
};
use crate::{Result, SurveyError};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

const REQUIRED_TABLES: [&str; 3] = [
    "gpkg_contents",
    "gpkg_geometry_columns",
    "gpkg_spatial_ref_sys",
];

const EXCLUDED_PREFIXES: [&str; 2] = ["gpkg_", "rtree_"];

/// Parser for GeoPackage containers.
#[derive(Debug, Clone)]
pub struct GeoPackageParser {
    config: ParserConfig,
}

impl GeoPackageParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Surveys the user tables of the GeoPackage at `path`.
    ///
    /// A database missing any of the catalog tables is surveyed as plain
    /// SQLite and carries no spatial metadata.
    pub async fn parse_file(&self, path: &Path) -> Result<ParseResult> {
        let start_time = std::time::Instant::now();
        let deadline = Deadline::start("GeoPackage parsing", self.config.parse_timeout());
        let pool = open_read_only(path).await?;

        let outcome = self.survey(&pool, &deadline).await;
        pool.close().await;
        let (described, fields, catalog) = outcome?;

        let total_records = described
            .iter()
            .fold(0u64, |sum, table| sum.saturating_add(table.row_count));
        tracing::info!(
            "Parsed GeoPackage in {:.2}s - {} tables, {} rows, {} geometry columns",
            start_time.elapsed().as_secs_f64(),
            described.len(),
            total_records,
            catalog.as_ref().map_or(0, |c| c.geometry_columns.len())
        );

        Ok(ParseResult {
            format: SourceFormat::Geopackage,
            total_records,
            is_array_root: true,
            fields: fields.finish(),
            container: ContainerMetadata {
                geopackage: catalog,
                ..ContainerMetadata::default()
            },
        })
    }

    async fn survey(
        &self,
        pool: &SqlitePool,
        deadline: &Deadline,
    ) -> Result<(Vec<TableInfo>, FieldMap, Option<GeoPackageMetadata>)> {
        let catalog = if is_geopackage(pool).await? {
            Some(read_catalog(pool).await)
        } else {
            tracing::warn!("Missing GeoPackage catalog tables, surveying as plain SQLite");
            None
        };

        let tables = list_tables(pool, &EXCLUDED_PREFIXES).await?;
        let mut fields = FieldMap::new(self.config.max_sample_values);
        let described = survey_tables(pool, &tables, &self.config, deadline, &mut fields).await?;

        if let Some(catalog) = &catalog {
            enrich_fields(&mut fields, &described, catalog);
        }
        Ok((described, fields, catalog))
    }
}

async fn is_geopackage(pool: &SqlitePool) -> Result<bool> {
    for table in REQUIRED_TABLES {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await
        .map_err(|e| SurveyError::processing("Failed to inspect GeoPackage catalog", e))?;
        if count == 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Reads layers, spatial reference systems and geometry columns.
///
/// An unreadable catalog table leaves its section empty.
async fn read_catalog(pool: &SqlitePool) -> GeoPackageMetadata {
    let spatial_ref_systems = read_spatial_ref_systems(pool).await.unwrap_or_else(|e| {
        tracing::warn!("{}", e);
        Vec::new()
    });
    let layers = read_layers(pool).await.unwrap_or_else(|e| {
        tracing::warn!("{}", e);
        Vec::new()
    });
    let srs_names: HashMap<i64, &str> = spatial_ref_systems
        .iter()
        .map(|srs| (srs.srs_id, srs.srs_name.as_str()))
        .collect();
    let geometry_columns = read_geometry_columns(pool, &srs_names)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Vec::new()
        });

    tracing::debug!(
        "GeoPackage catalog: {} layers, {} spatial reference systems, {} geometry columns",
        layers.len(),
        spatial_ref_systems.len(),
        geometry_columns.len()
    );

    GeoPackageMetadata {
        geometry_columns,
        spatial_ref_systems,
        layers,
    }
}

async fn read_spatial_ref_systems(pool: &SqlitePool) -> Result<Vec<SpatialRefSys>> {
    let rows = sqlx::query(
        "SELECT srs_name, srs_id, organization, organization_coordsys_id, definition, description \
         FROM gpkg_spatial_ref_sys ORDER BY srs_id",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| SurveyError::processing("Failed to read gpkg_spatial_ref_sys", e))?;

    Ok(rows
        .iter()
        .map(|row| SpatialRefSys {
            srs_id: row.try_get("srs_id").unwrap_or_default(),
            srs_name: row.try_get("srs_name").unwrap_or_default(),
            organization: row.try_get("organization").unwrap_or_default(),
            epsg_code: row.try_get("organization_coordsys_id").unwrap_or_default(),
            definition: row.try_get("definition").unwrap_or_default(),
            description: row.try_get("description").ok().flatten(),
        })
        .collect())
}

async fn read_layers(pool: &SqlitePool) -> Result<Vec<LayerInfo>> {
    let rows = sqlx::query(
        "SELECT table_name, data_type, identifier, description, last_change, \
         min_x, min_y, max_x, max_y, srs_id \
         FROM gpkg_contents ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| SurveyError::processing("Failed to read gpkg_contents", e))?;

    Ok(rows
        .iter()
        .map(|row| {
            let coordinate = |column: &str| row.try_get::<Option<f64>, _>(column).ok().flatten();
            let bbox = coordinate("min_x").map(|min_x| BoundingBox {
                min_x,
                min_y: coordinate("min_y").unwrap_or_default(),
                max_x: coordinate("max_x").unwrap_or_default(),
                max_y: coordinate("max_y").unwrap_or_default(),
            });
            LayerInfo {
                table_name: row.try_get("table_name").unwrap_or_default(),
                data_type: row.try_get("data_type").unwrap_or_default(),
                identifier: row.try_get("identifier").ok().flatten(),
                description: row.try_get("description").ok().flatten(),
                last_change: row.try_get("last_change").ok().flatten(),
                bbox,
                srs_id: row.try_get("srs_id").ok().flatten(),
            }
        })
        .collect())
}

async fn read_geometry_columns(
    pool: &SqlitePool,
    srs_names: &HashMap<i64, &str>,
) -> Result<Vec<GeometryColumn>> {
    let rows = sqlx::query(
        "SELECT table_name, column_name, geometry_type_name, srs_id, z, m \
         FROM gpkg_geometry_columns ORDER BY table_name, column_name",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| SurveyError::processing("Failed to read gpkg_geometry_columns", e))?;

    Ok(rows
        .iter()
        .map(|row| {
            let table: String = row.try_get("table_name").unwrap_or_default();
            let column: String = row.try_get("column_name").unwrap_or_default();
            let z: i64 = row.try_get("z").unwrap_or_default();
            let m: i64 = row.try_get("m").unwrap_or_default();
            let srs_id: i64 = row.try_get("srs_id").unwrap_or_default();
            GeometryColumn {
                field_path: format!("{}.{}", table, column),
                geometry_type: row.try_get("geometry_type_name").unwrap_or_default(),
                dimensions: dimensions(z, m),
                has_z: matches!(z, 1 | 2),
                has_m: matches!(m, 1 | 2),
                srs_id,
                coordinate_system: srs_names.get(&srs_id).map(|name| name.to_string()),
            }
        })
        .collect())
}

/// Dimension string for the `z`/`m` flags (0 prohibited, 1 mandatory, 2 optional).
fn dimensions(z: i64, m: i64) -> String {
    let mut dims = String::from("XY");
    if matches!(z, 1 | 2) {
        dims.push('Z');
    }
    if matches!(m, 1 | 2) {
        dims.push('M');
    }
    dims
}

fn enrich_fields(fields: &mut FieldMap, tables: &[TableInfo], catalog: &GeoPackageMetadata) {
    let geometry: HashMap<&str, &GeometryColumn> = catalog
        .geometry_columns
        .iter()
        .map(|column| (column.field_path.as_str(), column))
        .collect();
    let layers: HashMap<&str, &LayerInfo> = catalog
        .layers
        .iter()
        .map(|layer| (layer.table_name.as_str(), layer))
        .collect();
    let epsg_codes: HashMap<i64, i64> = catalog
        .spatial_ref_systems
        .iter()
        .map(|srs| (srs.srs_id, srs.epsg_code))
        .collect();

    for table in tables {
        let layer = layers.get(table.name.as_str()).copied();
        for column in &table.columns {
            let field_path = format!("{}.{}", table.name, column.name);
            let geometry_column = geometry.get(field_path.as_str()).copied();
            if layer.is_none() && geometry_column.is_none() {
                continue;
            }
            let Some(builder) = fields.get_mut(&field_path) else {
                continue;
            };

            let mut metadata = GeoFieldMetadata {
                layer_info: layer.cloned(),
                ..GeoFieldMetadata::default()
            };
            if let Some(geometry_column) = geometry_column {
                metadata.is_geometry = true;
                metadata.geometry_type = Some(geometry_column.geometry_type.clone());
                metadata.dimensions = Some(geometry_column.dimensions.clone());
                metadata.has_z = geometry_column.has_z;
                metadata.has_m = geometry_column.has_m;
                metadata.srs_id = Some(geometry_column.srs_id);
                metadata.coordinate_system = geometry_column.coordinate_system.clone();
                metadata.epsg_code = epsg_codes.get(&geometry_column.srs_id).copied();
            }
            builder.metadata.geopackage = Some(metadata);
        }
    }
}
