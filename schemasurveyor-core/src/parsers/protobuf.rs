//! Protocol buffer schema parser.
//!
//! Compiled descriptor sets (`.desc`, `.pb`) are decoded directly; `.proto`
//! sources are compiled first with the external `protoc` compiler. Message
//! fields, enum values and service methods are flattened into pseudo-fields
//! under their fully-qualified type name:
//!
//! - `pkg.User.email` for a message field
//! - `pkg.Status.ACTIVE` for an enum value
//! - `pkg.UserService.GetUser` for an RPC method

use super::builder::FieldMap;
use crate::config::ParserConfig;
use crate::models::{
    ContainerMetadata, FieldType, ParseResult, ProtobufFieldMetadata, ProtobufMetadata,
    ProtobufTable, SourceFormat,
};
use crate::{Result, SurveyError};
use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorSet,
    ServiceDescriptorProto,
};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Parser for protobuf descriptor sets and `.proto` sources.
#[derive(Debug, Clone)]
pub struct ProtobufParser {
    config: ParserConfig,
}

impl ProtobufParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parses the schema file at `path`.
    pub async fn parse_file(&self, path: &Path) -> Result<ParseResult> {
        let start_time = std::time::Instant::now();
        let is_source = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("proto"));

        let bytes = if is_source {
            self.compile(path).await?
        } else {
            tokio::fs::read(path).await.map_err(|e| {
                SurveyError::io(format!("Failed to read {}", path.display()), e)
            })?
        };
        let descriptor_set = FileDescriptorSet::decode(bytes.as_slice())
            .map_err(|e| SurveyError::processing("Invalid protobuf descriptor set", e))?;

        let result = self.flatten(&descriptor_set);
        tracing::info!(
            "Parsed protobuf schema in {:.2}s - {} files, {} fields",
            start_time.elapsed().as_secs_f64(),
            descriptor_set.file.len(),
            result.fields.len()
        );
        Ok(result)
    }

    /// Parses an already decoded descriptor set.
    pub fn parse_descriptor_set(&self, descriptor_set: &FileDescriptorSet) -> ParseResult {
        self.flatten(descriptor_set)
    }

    /// Runs `protoc` on `path` and returns the encoded descriptor set.
    async fn compile(&self, path: &Path) -> Result<Vec<u8>> {
        let proto_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let proto_name = path
            .file_name()
            .ok_or_else(|| SurveyError::validation(format!("Invalid proto path {}", path.display())))?;
        let output = tempfile::Builder::new()
            .suffix(".desc")
            .tempfile()
            .map_err(|e| SurveyError::io("Failed to create descriptor output file", e))?;

        tracing::debug!("Compiling {} with protoc", path.display());
        let mut command = Command::new("protoc");
        command
            .arg(format!("--proto_path={}", proto_dir.display()))
            .arg(format!("--descriptor_set_out={}", output.path().display()))
            .arg("--include_imports")
            .arg(proto_name)
            .current_dir(proto_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let budget = self.config.parse_timeout();
        let outcome = tokio::time::timeout(budget, command.output())
            .await
            .map_err(|_| SurveyError::timeout("protoc compilation", budget))?;
        let result = match outcome {
            Ok(result) => result,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SurveyError::malformed(
                    "Failed to compile .proto file",
                    "protoc compiler not found on PATH",
                ));
            }
            Err(e) => return Err(SurveyError::io("Failed to run protoc", e)),
        };
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SurveyError::malformed(
                "Failed to compile .proto file",
                stderr.trim().to_string(),
            ));
        }

        tokio::fs::read(output.path())
            .await
            .map_err(|e| SurveyError::io("Failed to read compiled descriptor set", e))
    }

    fn flatten(&self, descriptor_set: &FileDescriptorSet) -> ParseResult {
        let mut fields = FieldMap::new(self.config.max_sample_values);
        let mut metadata = ProtobufMetadata::default();
        let mut top_level_messages = 0u64;

        for file in &descriptor_set.file {
            metadata.files.push(file.name().to_string());
            if !file.package().is_empty() && !metadata.packages.iter().any(|p| p == file.package()) {
                metadata.packages.push(file.package().to_string());
            }
            if metadata.syntax.is_none() {
                let syntax = if file.syntax().is_empty() { "proto2" } else { file.syntax() };
                metadata.syntax = Some(syntax.to_string());
            }

            for message in &file.message_type {
                top_level_messages = top_level_messages.saturating_add(1);
                flatten_message(message, file.package(), 1, &mut fields, &mut metadata);
            }
            for enumeration in &file.enum_type {
                flatten_enum(enumeration, file.package(), &mut fields, &mut metadata);
            }
            for service in &file.service {
                flatten_service(service, file.package(), &mut fields, &mut metadata);
            }
        }

        ParseResult {
            format: SourceFormat::Protobuf,
            total_records: top_level_messages,
            is_array_root: true,
            fields: fields.finish(),
            container: ContainerMetadata {
                protobuf: Some(metadata),
                ..ContainerMetadata::default()
            },
        }
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

fn flatten_message(
    message: &DescriptorProto,
    scope: &str,
    nesting_level: usize,
    fields: &mut FieldMap,
    metadata: &mut ProtobufMetadata,
) {
    let full_name = qualify(scope, message.name());
    metadata.message_count = metadata.message_count.saturating_add(1);

    let mut columns = Vec::with_capacity(message.field.len());
    for field in &message.field {
        let field_path = qualify(&full_name, field.name());
        let proto_type = render_type(field);
        let tag = standard_type(field);

        let builder = fields.entry(&field_path, field.name(), &full_name, nesting_level);
        builder.declare_type(tag);
        match field.label() {
            Label::Repeated => builder.mark_array(Some(tag)),
            Label::Optional => builder.mark_nullable(),
            Label::Required => {}
        }
        builder.metadata.protobuf = Some(ProtobufFieldMetadata::Field {
            message_type: full_name.clone(),
            field_number: field.number(),
            field_type: proto_type,
            label: label_name(field.label()).to_string(),
            default: field.default_value.clone(),
        });
        columns.push(field.name().to_string());
    }
    metadata.tables.push(ProtobufTable {
        name: full_name.clone(),
        kind: "message".to_string(),
        columns,
    });

    for nested in &message.nested_type {
        if nested.options.as_ref().is_some_and(|o| o.map_entry()) {
            continue;
        }
        flatten_message(
            nested,
            &full_name,
            nesting_level.saturating_add(1),
            fields,
            metadata,
        );
    }
    for enumeration in &message.enum_type {
        flatten_enum(enumeration, &full_name, fields, metadata);
    }
}

fn flatten_enum(
    enumeration: &EnumDescriptorProto,
    scope: &str,
    fields: &mut FieldMap,
    metadata: &mut ProtobufMetadata,
) {
    let full_name = qualify(scope, enumeration.name());
    metadata.enum_count = metadata.enum_count.saturating_add(1);

    let mut columns = Vec::with_capacity(enumeration.value.len());
    for value in &enumeration.value {
        let field_path = qualify(&full_name, value.name());
        let builder = fields.entry(&field_path, value.name(), &full_name, 1);
        builder.observe(FieldType::Integer, Some(Value::from(value.number())));
        builder.metadata.protobuf = Some(ProtobufFieldMetadata::EnumValue {
            enum_type: full_name.clone(),
            number: value.number(),
        });
        columns.push(value.name().to_string());
    }
    metadata.tables.push(ProtobufTable {
        name: full_name,
        kind: "enum".to_string(),
        columns,
    });
}

fn flatten_service(
    service: &ServiceDescriptorProto,
    scope: &str,
    fields: &mut FieldMap,
    metadata: &mut ProtobufMetadata,
) {
    let full_name = qualify(scope, service.name());
    metadata.service_count = metadata.service_count.saturating_add(1);

    let mut columns = Vec::with_capacity(service.method.len());
    for method in &service.method {
        let field_path = qualify(&full_name, method.name());
        let streaming = match (method.client_streaming(), method.server_streaming()) {
            (false, false) => "unary",
            (true, false) => "client_streaming",
            (false, true) => "server_streaming",
            (true, true) => "client_streaming, server_streaming",
        };
        let builder = fields.entry(&field_path, method.name(), &full_name, 1);
        builder.declare_type(FieldType::String);
        builder.metadata.protobuf = Some(ProtobufFieldMetadata::Method {
            service: full_name.clone(),
            input_type: method.input_type().trim_start_matches('.').to_string(),
            output_type: method.output_type().trim_start_matches('.').to_string(),
            streaming: streaming.to_string(),
        });
        columns.push(method.name().to_string());
    }
    metadata.tables.push(ProtobufTable {
        name: full_name,
        kind: "service".to_string(),
        columns,
    });
}

/// Schema-native type name, `message<pkg.Type>` and `enum<pkg.Type>` for references.
fn render_type(field: &FieldDescriptorProto) -> String {
    let referenced = field.type_name().trim_start_matches('.');
    match field.r#type() {
        Type::Message => format!("message<{}>", referenced),
        Type::Enum => format!("enum<{}>", referenced),
        other => scalar_name(other).to_string(),
    }
}

fn scalar_name(proto_type: Type) -> &'static str {
    match proto_type {
        Type::Double => "double",
        Type::Float => "float",
        Type::Int64 => "int64",
        Type::Uint64 => "uint64",
        Type::Int32 => "int32",
        Type::Fixed64 => "fixed64",
        Type::Fixed32 => "fixed32",
        Type::Bool => "bool",
        Type::String => "string",
        Type::Group => "group",
        Type::Message => "message",
        Type::Bytes => "bytes",
        Type::Uint32 => "uint32",
        Type::Enum => "enum",
        Type::Sfixed32 => "sfixed32",
        Type::Sfixed64 => "sfixed64",
        Type::Sint32 => "sint32",
        Type::Sint64 => "sint64",
    }
}

fn standard_type(field: &FieldDescriptorProto) -> FieldType {
    match field.r#type() {
        Type::Double | Type::Float => FieldType::Float,
        Type::Int64
        | Type::Uint64
        | Type::Int32
        | Type::Fixed64
        | Type::Fixed32
        | Type::Uint32
        | Type::Sfixed32
        | Type::Sfixed64
        | Type::Sint32
        | Type::Sint64
        | Type::Enum => FieldType::Integer,
        Type::Bool => FieldType::Boolean,
        Type::Bytes => FieldType::Binary,
        Type::Message | Type::Group => FieldType::Object,
        Type::String => FieldType::String,
    }
}

fn label_name(label: Label) -> &'static str {
    match label {
        Label::Optional => "optional",
        Label::Required => "required",
        Label::Repeated => "repeated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{
        EnumValueDescriptorProto, FileDescriptorProto, MessageOptions, MethodDescriptorProto,
    };

    fn field(name: &str, number: i32, proto_type: Type, label: Label) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            r#type: Some(proto_type as i32),
            label: Some(label as i32),
            ..FieldDescriptorProto::default()
        }
    }

    fn descriptor_set() -> FileDescriptorSet {
        let mut address = field("address", 4, Type::Message, Label::Optional);
        address.type_name = Some(".shop.User.Address".to_string());
        let mut status = field("status", 5, Type::Enum, Label::Optional);
        status.type_name = Some(".shop.Status".to_string());

        let user = DescriptorProto {
            name: Some("User".to_string()),
            field: vec![
                field("id", 1, Type::Int64, Label::Required),
                field("email", 2, Type::String, Label::Optional),
                field("tags", 3, Type::String, Label::Repeated),
                address,
                status,
            ],
            nested_type: vec![
                DescriptorProto {
                    name: Some("Address".to_string()),
                    field: vec![field("street", 1, Type::String, Label::Optional)],
                    ..DescriptorProto::default()
                },
                DescriptorProto {
                    name: Some("LabelsEntry".to_string()),
                    options: Some(MessageOptions {
                        map_entry: Some(true),
                        ..MessageOptions::default()
                    }),
                    ..DescriptorProto::default()
                },
            ],
            ..DescriptorProto::default()
        };

        let status_enum = EnumDescriptorProto {
            name: Some("Status".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("ACTIVE".to_string()),
                    number: Some(0),
                    ..EnumValueDescriptorProto::default()
                },
                EnumValueDescriptorProto {
                    name: Some("BANNED".to_string()),
                    number: Some(2),
                    ..EnumValueDescriptorProto::default()
                },
            ],
            ..EnumDescriptorProto::default()
        };

        let service = ServiceDescriptorProto {
            name: Some("UserService".to_string()),
            method: vec![
                MethodDescriptorProto {
                    name: Some("GetUser".to_string()),
                    input_type: Some(".shop.User".to_string()),
                    output_type: Some(".shop.User".to_string()),
                    ..MethodDescriptorProto::default()
                },
                MethodDescriptorProto {
                    name: Some("WatchUsers".to_string()),
                    input_type: Some(".shop.User".to_string()),
                    output_type: Some(".shop.User".to_string()),
                    server_streaming: Some(true),
                    ..MethodDescriptorProto::default()
                },
            ],
            ..ServiceDescriptorProto::default()
        };

        FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("shop.proto".to_string()),
                package: Some("shop".to_string()),
                syntax: Some("proto3".to_string()),
                message_type: vec![user],
                enum_type: vec![status_enum],
                service: vec![service],
                ..FileDescriptorProto::default()
            }],
        }
    }

    #[test]
    fn test_flatten_messages() {
        let result = ProtobufParser::new(ParserConfig::default()).parse_descriptor_set(&descriptor_set());
        assert_eq!(result.total_records, 1);

        let find = |path: &str| result.fields.iter().find(|f| f.field_path == path).unwrap();

        let id = find("shop.User.id");
        assert_eq!(id.type_counts.get(&FieldType::Integer), Some(&1));
        assert!(!id.is_nullable);
        assert_eq!(id.total_count, 0);

        let tags = find("shop.User.tags");
        assert!(tags.is_array);
        assert_eq!(tags.array_item_types, vec![FieldType::String]);

        let email = find("shop.User.email");
        assert!(email.is_nullable);

        let address = find("shop.User.address");
        assert_eq!(address.type_counts.get(&FieldType::Object), Some(&1));
        match address.metadata.protobuf.as_ref().unwrap() {
            ProtobufFieldMetadata::Field { field_type, field_number, .. } => {
                assert_eq!(field_type, "message<shop.User.Address>");
                assert_eq!(*field_number, 4);
            }
            other => panic!("unexpected metadata {:?}", other),
        }

        let street = find("shop.User.Address.street");
        assert_eq!(street.parent_path, "shop.User.Address");
        assert_eq!(street.nesting_level, 2);
        assert!(result.fields.iter().all(|f| !f.field_path.contains("LabelsEntry")));
    }

    #[test]
    fn test_flatten_enums_and_services() {
        let result = ProtobufParser::new(ParserConfig::default()).parse_descriptor_set(&descriptor_set());

        let banned = result.fields.iter().find(|f| f.field_path == "shop.Status.BANNED").unwrap();
        assert_eq!(banned.sample_values, vec![serde_json::json!(2)]);
        assert_eq!(banned.total_count, 1);

        let watch = result
            .fields
            .iter()
            .find(|f| f.field_path == "shop.UserService.WatchUsers")
            .unwrap();
        match watch.metadata.protobuf.as_ref().unwrap() {
            ProtobufFieldMetadata::Method { streaming, input_type, .. } => {
                assert_eq!(streaming, "server_streaming");
                assert_eq!(input_type, "shop.User");
            }
            other => panic!("unexpected metadata {:?}", other),
        }

        let inventory = result.container.protobuf.unwrap();
        assert_eq!(inventory.files, vec!["shop.proto"]);
        assert_eq!(inventory.syntax.as_deref(), Some("proto3"));
        assert_eq!(inventory.message_count, 2);
        assert_eq!(inventory.enum_count, 1);
        assert_eq!(inventory.service_count, 1);
        let kinds: Vec<&str> = inventory.tables.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, vec!["message", "message", "enum", "service"]);
    }

    #[tokio::test]
    async fn test_descriptor_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.desc");
        std::fs::write(&path, descriptor_set().encode_to_vec()).unwrap();

        let result = ProtobufParser::new(ParserConfig::default())
            .parse_file(&path)
            .await
            .unwrap();
        assert_eq!(result.format, SourceFormat::Protobuf);
        assert!(result.fields.iter().any(|f| f.field_path == "shop.User.email"));
    }

    #[tokio::test]
    async fn test_invalid_descriptor_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.desc");
        std::fs::write(&path, [0xFF, 0xFF, 0xFF]).unwrap();

        let err = ProtobufParser::new(ParserConfig::default())
            .parse_file(&path)
            .await
            .unwrap_err();
        assert!(matches!(err, SurveyError::Processing { .. }));
    }
}
