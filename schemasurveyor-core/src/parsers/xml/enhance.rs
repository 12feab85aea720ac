//! Merges DTD and XSD declarations onto finalized XML fields.

use crate::models::{DtdSchema, ParsedField, XmlFieldMetadata, XsdSchema};

/// Attaches declarations to matching fields by element or attribute name.
///
/// Attribute fields match `<!ATTLIST>` entries of their parent element.
/// Element fields match DTD elements and XSD element declarations.
pub(crate) fn enhance_fields(
    fields: &mut [ParsedField],
    attribute_prefix: &str,
    dtd: Option<&DtdSchema>,
    xsd: Option<&XsdSchema>,
) {
    for field in fields.iter_mut() {
        let xml = field
            .metadata
            .xml
            .get_or_insert_with(XmlFieldMetadata::default);

        if xml.is_attribute {
            let Some(dtd) = dtd else { continue };
            let attr_name = field
                .field_name
                .strip_prefix(attribute_prefix)
                .unwrap_or(&field.field_name);
            let parent_element = field.parent_path.rsplit('.').next().unwrap_or_default();
            if let Some(declared) = dtd
                .attributes
                .get(parent_element)
                .and_then(|attrs| attrs.get(attr_name))
            {
                xml.required = Some(declared.default_type == "REQUIRED");
                xml.dtd_attribute = Some(declared.clone());
            }
            continue;
        }

        if let Some(element) = dtd.and_then(|d| d.elements.get(&field.field_name)) {
            xml.dtd_element = Some(element.clone());
        }

        if let Some(element) = xsd.and_then(|x| x.elements.get(&field.field_name)) {
            xml.required = Some(element.min_occurs != "0");
            xml.repeating = Some(!matches!(element.max_occurs.as_str(), "0" | "1"));
            xml.xsd_element = Some(element.clone());
        }
    }
}
