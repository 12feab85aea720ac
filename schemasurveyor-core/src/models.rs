//! Data models shared by parsers, classifiers and the versioning engine.
//!
//! A parse produces a [`ParseResult`] whose [`ParsedField`]s are the
//! finalized field observations. The classification pipeline turns each of
//! them into a [`ClassifiedField`], and the full set becomes a
//! [`SchemaSnapshot`] that can be fingerprinted and diffed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Snapshot format version written by this crate.
pub const SNAPSHOT_FORMAT_VERSION: &str = "1.0";

/// Primitive type tag observed for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Array,
    Object,
    Binary,
    MongodbObjectid,
    MongodbDate,
    MongodbLong,
    MongodbDecimal,
    MongodbBinary,
    Unknown,
    Mixed,
}

impl FieldType {
    /// Returns the wire name of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Null => "null",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Binary => "binary",
            FieldType::MongodbObjectid => "mongodb_objectid",
            FieldType::MongodbDate => "mongodb_date",
            FieldType::MongodbLong => "mongodb_long",
            FieldType::MongodbDecimal => "mongodb_decimal",
            FieldType::MongodbBinary => "mongodb_binary",
            FieldType::Unknown => "unknown",
            FieldType::Mixed => "mixed",
        }
    }

    /// True for the tags that receive numeric distribution statistics.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }

    /// Classifies a decoded JSON value.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => FieldType::Null,
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(n) if n.is_f64() => FieldType::Float,
            Value::Number(_) => FieldType::Integer,
            Value::String(_) => FieldType::String,
            Value::Array(_) => FieldType::Array,
            Value::Object(_) => FieldType::Object,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input formats understood by the parser layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Json,
    Mongodb,
    Xml,
    Sqlite,
    Geopackage,
    Protobuf,
}

impl SourceFormat {
    /// All formats, in display order.
    pub const ALL: [SourceFormat; 6] = [
        SourceFormat::Json,
        SourceFormat::Mongodb,
        SourceFormat::Xml,
        SourceFormat::Sqlite,
        SourceFormat::Geopackage,
        SourceFormat::Protobuf,
    ];

    /// Infers the format from a file extension.
    ///
    /// MongoDB extended JSON shares the `.json` extension and must be
    /// requested explicitly.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(SourceFormat::Json),
            "xml" => Some(SourceFormat::Xml),
            "db" | "sqlite" | "sqlite3" => Some(SourceFormat::Sqlite),
            "gpkg" => Some(SourceFormat::Geopackage),
            "desc" | "pb" | "proto" => Some(SourceFormat::Protobuf),
            _ => None,
        }
    }

    /// Short lowercase name used on the command line and in snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Json => "json",
            SourceFormat::Mongodb => "mongodb",
            SourceFormat::Xml => "xml",
            SourceFormat::Sqlite => "sqlite",
            SourceFormat::Geopackage => "geopackage",
            SourceFormat::Protobuf => "protobuf",
        }
    }

    /// File extensions associated with the format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SourceFormat::Json | SourceFormat::Mongodb => &["json"],
            SourceFormat::Xml => &["xml"],
            SourceFormat::Sqlite => &["db", "sqlite", "sqlite3"],
            SourceFormat::Geopackage => &["gpkg"],
            SourceFormat::Protobuf => &["desc", "pb", "proto"],
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = crate::SurveyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::SurveyError::UnsupportedFormat {
                format: s.to_string(),
            })
    }
}

/// Semantic meaning detected for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Url,
    Uuid,
    Date,
    ZipCode,
    Currency,
    Identifier,
    Name,
    Category,
    Count,
    Address,
    Country,
    State,
    City,
}

impl SemanticType {
    /// Returns the wire name of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Email => "email",
            SemanticType::Phone => "phone",
            SemanticType::Ssn => "ssn",
            SemanticType::CreditCard => "credit_card",
            SemanticType::Url => "url",
            SemanticType::Uuid => "uuid",
            SemanticType::Date => "date",
            SemanticType::ZipCode => "zip_code",
            SemanticType::Currency => "currency",
            SemanticType::Identifier => "identifier",
            SemanticType::Name => "name",
            SemanticType::Category => "category",
            SemanticType::Count => "count",
            SemanticType::Address => "address",
            SemanticType::Country => "country",
            SemanticType::State => "state",
            SemanticType::City => "city",
        }
    }

    /// Parses a free-form label, collapsing known synonyms.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        let semantic = match normalized.as_str() {
            "email" => SemanticType::Email,
            "phone" => SemanticType::Phone,
            "ssn" => SemanticType::Ssn,
            "credit_card" => SemanticType::CreditCard,
            "url" => SemanticType::Url,
            "uuid" => SemanticType::Uuid,
            "date" | "datetime" | "timestamp" => SemanticType::Date,
            "zip_code" | "postal_code" => SemanticType::ZipCode,
            "currency" => SemanticType::Currency,
            "identifier" => SemanticType::Identifier,
            "name" => SemanticType::Name,
            "category" => SemanticType::Category,
            "count" => SemanticType::Count,
            "address" => SemanticType::Address,
            "country" => SemanticType::Country,
            "state" => SemanticType::State,
            "city" => SemanticType::City,
            _ => return None,
        };
        Some(semantic)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of personally identifiable information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Passport,
    DriversLicense,
    Address,
    IpAddress,
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PiiType::Email => "email",
            PiiType::Phone => "phone",
            PiiType::Ssn => "ssn",
            PiiType::CreditCard => "credit_card",
            PiiType::Passport => "passport",
            PiiType::DriversLicense => "drivers_license",
            PiiType::Address => "address",
            PiiType::IpAddress => "ip_address",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Format-specific metadata
// ============================================================================

/// Catalog information for a relational column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteColumnMetadata {
    pub table_name: String,
    pub column_type: String,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    /// Referenced column as `table(column)`
    pub foreign_key_ref: Option<String>,
    pub is_unique: bool,
    pub is_indexed: bool,
    pub is_not_null: bool,
    pub default_value: Option<String>,
}

/// Spatial extent of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Layer entry from `gpkg_contents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub table_name: String,
    pub data_type: String,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub last_change: Option<String>,
    pub bbox: Option<BoundingBox>,
    pub srs_id: Option<i64>,
}

/// Spatial reference system entry from `gpkg_spatial_ref_sys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialRefSys {
    pub srs_id: i64,
    pub srs_name: String,
    pub organization: String,
    /// Organization code, the EPSG code for `organization = "EPSG"`
    pub epsg_code: i64,
    pub definition: String,
    pub description: Option<String>,
}

/// Geometry column entry from `gpkg_geometry_columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryColumn {
    /// `table.column`
    pub field_path: String,
    pub geometry_type: String,
    pub dimensions: String,
    pub has_z: bool,
    pub has_m: bool,
    pub srs_id: i64,
    pub coordinate_system: Option<String>,
}

/// Spatial enrichment attached to a GeoPackage column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoFieldMetadata {
    pub is_geometry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    pub has_z: bool,
    pub has_m: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srs_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate_system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsg_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_info: Option<LayerInfo>,
}

/// Container-level GeoPackage inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPackageMetadata {
    pub geometry_columns: Vec<GeometryColumn>,
    pub spatial_ref_systems: Vec<SpatialRefSys>,
    pub layers: Vec<LayerInfo>,
}

/// Descriptor information attached to a protobuf pseudo-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtobufFieldMetadata {
    /// Field of a message
    Field {
        message_type: String,
        field_number: i32,
        field_type: String,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// Value of an enum
    EnumValue { enum_type: String, number: i32 },
    /// RPC method of a service
    Method {
        service: String,
        input_type: String,
        output_type: String,
        streaming: String,
    },
}

/// Flattened view of a protobuf message, enum or service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtobufTable {
    pub name: String,
    /// `message`, `enum` or `service`
    pub kind: String,
    pub columns: Vec<String>,
}

/// File-level protobuf inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtobufMetadata {
    pub files: Vec<String>,
    pub packages: Vec<String>,
    pub syntax: Option<String>,
    pub message_count: usize,
    pub enum_count: usize,
    pub service_count: usize,
    pub tables: Vec<ProtobufTable>,
}

/// Child reference inside a DTD element declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtdChild {
    pub name: String,
    /// `REQUIRED`, `OPTIONAL`, `ZERO_OR_MORE` or `ONE_OR_MORE`
    pub cardinality: String,
}

/// `<!ELEMENT>` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtdElement {
    /// `PCDATA`, `MIXED`, `EMPTY`, `ANY` or `ELEMENT`
    pub content_type: String,
    pub content_model: String,
    pub children: Vec<DtdChild>,
}

/// Attribute inside an `<!ATTLIST>` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtdAttribute {
    pub attr_type: String,
    /// `REQUIRED`, `IMPLIED`, `FIXED` or `DEFAULT`
    pub default_type: String,
    pub default_value: Option<String>,
    pub allowed_values: Vec<String>,
}

/// Declarations extracted from an inline DTD.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtdSchema {
    pub elements: BTreeMap<String, DtdElement>,
    /// Element name to attribute name to declaration
    pub attributes: BTreeMap<String, BTreeMap<String, DtdAttribute>>,
    pub entities: BTreeMap<String, String>,
}

/// `<xs:element>` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XsdElement {
    pub type_name: Option<String>,
    pub min_occurs: String,
    pub max_occurs: String,
    pub nillable: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

/// `<xs:attribute>` inside a complex type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XsdAttribute {
    pub name: String,
    pub type_name: Option<String>,
    /// `optional`, `required` or `prohibited`
    pub usage: String,
    pub default: Option<String>,
}

/// Named `<xs:complexType>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XsdComplexType {
    /// `sequence`, `choice` or `all`
    pub compositor: Option<String>,
    pub elements: Vec<String>,
    pub attributes: Vec<XsdAttribute>,
}

/// Named `<xs:simpleType>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XsdSimpleType {
    pub base_type: Option<String>,
    /// Facet name to value, excluding enumerations
    pub restrictions: BTreeMap<String, String>,
    pub enumeration: Vec<String>,
}

/// Declarations extracted from a companion XSD file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XsdSchema {
    pub target_namespace: Option<String>,
    pub elements: BTreeMap<String, XsdElement>,
    pub complex_types: BTreeMap<String, XsdComplexType>,
    pub simple_types: BTreeMap<String, XsdSimpleType>,
    /// Set when the XSD could not be parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Document-level XML schema side-channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlSchemaInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_element: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtd: Option<DtdSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsd: Option<XsdSchema>,
}

/// Schema side-channel information merged onto an XML field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlFieldMetadata {
    pub is_attribute: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtd_element: Option<DtdElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtd_attribute: Option<DtdAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsd_element: Option<XsdElement>,
    /// Declared mandatory by the DTD or XSD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Declared repeating by the XSD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeating: Option<bool>,
}

/// Optional per-field metadata blocks, at most one populated per format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteColumnMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geopackage: Option<GeoFieldMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protobuf: Option<ProtobufFieldMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml: Option<XmlFieldMetadata>,
}

impl FieldMetadata {
    /// True when no block is populated.
    pub fn is_empty(&self) -> bool {
        self.sqlite.is_none()
            && self.geopackage.is_none()
            && self.protobuf.is_none()
            && self.xml.is_none()
    }
}

/// Container-level metadata produced by some formats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geopackage: Option<GeoPackageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protobuf: Option<ProtobufMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml: Option<XmlSchemaInfo>,
}

// ============================================================================
// Parse output
// ============================================================================

/// Finalized observation of a single field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedField {
    pub field_path: String,
    pub field_name: String,
    pub parent_path: String,
    pub nesting_level: usize,
    /// Count of observations per type tag
    pub type_counts: BTreeMap<FieldType, u64>,
    pub is_array: bool,
    pub array_item_types: Vec<FieldType>,
    pub sample_values: Vec<Value>,
    pub null_count: u64,
    pub total_count: u64,
    pub null_percentage: f64,
    /// Declared nullable by the source schema, or nulls were observed
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "FieldMetadata::is_empty")]
    pub metadata: FieldMetadata,
}

/// Output of one parser invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub format: SourceFormat,
    pub total_records: u64,
    pub is_array_root: bool,
    pub fields: Vec<ParsedField>,
    #[serde(default)]
    pub container: ContainerMetadata,
}

// ============================================================================
// Classified output
// ============================================================================

/// Distribution statistics for numeric fields, computed over samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min_value: f64,
    pub max_value: f64,
    pub mean_value: f64,
    pub median_value: f64,
    pub std_dev: f64,
    pub percentile_25: f64,
    pub percentile_50: f64,
    pub percentile_75: f64,
}

/// Field after type, semantic, PII and quality classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedField {
    pub field_path: String,
    pub field_name: String,
    pub parent_path: String,
    pub nesting_level: usize,
    pub data_type: FieldType,
    pub confidence_score: f64,
    pub semantic_type: Option<SemanticType>,
    pub is_pii: bool,
    pub pii_type: Option<PiiType>,
    pub pii_confidence: f64,
    pub is_array: bool,
    pub array_item_type: Option<FieldType>,
    pub is_nullable: bool,
    pub sample_values: Vec<Value>,
    pub null_count: u64,
    pub total_count: u64,
    pub null_percentage: f64,
    pub distinct_count: u64,
    pub cardinality_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_stats: Option<NumericStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(default, skip_serializing_if = "FieldMetadata::is_empty")]
    pub metadata: FieldMetadata,
}

/// Aggregate statistics over a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub total_fields: usize,
    pub max_nesting_level: usize,
    pub type_distribution: BTreeMap<String, usize>,
    pub semantic_type_distribution: BTreeMap<String, usize>,
    pub pii_fields: usize,
    pub pii_percentage: f64,
    pub fields_with_nulls: usize,
    pub average_null_percentage: f64,
}

impl SchemaSummary {
    /// Computes the summary for a set of classified fields.
    pub fn from_fields(fields: &[ClassifiedField]) -> Self {
        let mut summary = SchemaSummary {
            total_fields: fields.len(),
            ..Default::default()
        };
        let mut null_total = 0.0;

        for field in fields {
            summary.max_nesting_level = summary.max_nesting_level.max(field.nesting_level);
            *summary
                .type_distribution
                .entry(field.data_type.to_string())
                .or_insert(0) += 1;
            if let Some(semantic) = field.semantic_type {
                *summary
                    .semantic_type_distribution
                    .entry(semantic.to_string())
                    .or_insert(0) += 1;
            }
            if field.is_pii {
                summary.pii_fields += 1;
            }
            if field.null_percentage > 0.0 {
                summary.fields_with_nulls += 1;
            }
            null_total += field.null_percentage;
        }

        if !fields.is_empty() {
            let count = fields.len() as f64;
            summary.pii_percentage = round2(summary.pii_fields as f64 / count * 100.0);
            summary.average_null_percentage = round2(null_total / count);
        }
        summary
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Complete, fingerprinted description of one data source at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub format_version: String,
    pub snapshot_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub source_name: String,
    pub source_format: SourceFormat,
    pub total_records: u64,
    pub is_array_root: bool,
    pub schema_hash: String,
    pub summary: SchemaSummary,
    pub fields: Vec<ClassifiedField>,
    #[serde(default)]
    pub container: ContainerMetadata,
}

impl SchemaSnapshot {
    /// Builds a snapshot and computes its fingerprint.
    pub fn new(
        source_name: impl Into<String>,
        source_format: SourceFormat,
        total_records: u64,
        is_array_root: bool,
        fields: Vec<ClassifiedField>,
        container: ContainerMetadata,
    ) -> Self {
        let schema_hash = crate::versioning::schema_hash(&fields);
        let summary = SchemaSummary::from_fields(&fields);
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION.to_string(),
            snapshot_id: Uuid::new_v4(),
            created_at: Utc::now(),
            source_name: source_name.into(),
            source_format,
            total_records,
            is_array_root,
            schema_hash,
            summary,
            fields,
            container,
        }
    }

    /// True when both snapshots share the same structural fingerprint.
    pub fn has_same_schema(&self, other: &SchemaSnapshot) -> bool {
        self.schema_hash == other.schema_hash
    }

    /// Looks up a field by its path.
    pub fn field(&self, path: &str) -> Option<&ClassifiedField> {
        self.fields.iter().find(|f| f.field_path == path)
    }
}
