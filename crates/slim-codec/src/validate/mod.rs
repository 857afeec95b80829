//! Structural validation of row schemas.
//!
//! Runs once when a schema is first built. A schema that fails here is never
//! cached, so every codec call on that type reports the same error.

use rustc_hash::FxHashSet;

use crate::error::SchemaError;
use crate::limits::MAX_TAG_LEN;
use crate::model::FieldKind;

/// What validation needs to know about one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSummary {
    pub name: &'static str,
    pub tag: &'static str,
    pub kind: FieldKind,
}

/// Validates a schema's fields.
///
/// Checks:
/// - Every backend tag is non-empty and at most 255 bytes
/// - Backend tags are unique within the schema (base fields included)
/// - Scalar, nullable, array and list kinds carry a scalar element type
pub fn validate_schema(
    type_name: &'static str,
    fields: impl IntoIterator<Item = FieldSummary>,
) -> Result<(), SchemaError> {
    let mut seen = FxHashSet::default();
    for field in fields {
        if field.tag.is_empty() {
            return Err(SchemaError::EmptyTag {
                type_name,
                field: field.name,
            });
        }
        if field.tag.len() > MAX_TAG_LEN {
            return Err(SchemaError::TagTooLong {
                type_name,
                tag: field.tag.to_string(),
                max: MAX_TAG_LEN,
            });
        }
        if !seen.insert(field.tag) {
            return Err(SchemaError::DuplicateTag {
                type_name,
                tag: field.tag.to_string(),
            });
        }
        if let Some(element) = field.kind.element_wire() {
            if !element.is_scalar() {
                return Err(SchemaError::InvalidFieldKind {
                    type_name,
                    kind: field.kind.label(),
                });
            }
        }
    }
    Ok(())
}
