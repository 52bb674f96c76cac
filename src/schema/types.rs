use super::hooks::ModelOptions;
use crate::constants::{CREATED_AT, ID_FIELD, UPDATED_AT};
use crate::path::{FieldPath, PathResult, Segment};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropType {
    Id,
    String,
    LongStr,
    Number,
    Decimal,
    DateTime,
    Boolean,
    Array,
    Object,
    Any,
}

impl PropType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropType::Id => "Id",
            PropType::String => "String",
            PropType::LongStr => "LongStr",
            PropType::Number => "Number",
            PropType::Decimal => "Decimal",
            PropType::DateTime => "DateTime",
            PropType::Boolean => "Boolean",
            PropType::Array => "Array",
            PropType::Object => "Object",
            PropType::Any => "Any",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, PropType::String | PropType::LongStr)
    }

    /// Containers whose inner structure is not declared
    pub fn is_opaque(&self) -> bool {
        matches!(self, PropType::Object | PropType::Any)
    }
}

impl fmt::Display for PropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(PropType::Id),
            "string" => Ok(PropType::String),
            "longstr" => Ok(PropType::LongStr),
            "number" => Ok(PropType::Number),
            "decimal" => Ok(PropType::Decimal),
            "datetime" | "date" => Ok(PropType::DateTime),
            "boolean" => Ok(PropType::Boolean),
            "array" => Ok(PropType::Array),
            "object" | "map" => Ok(PropType::Object),
            "any" => Ok(PropType::Any),
            _ => Err(format!("Unknown type tag: {}", s)),
        }
    }
}

/// Operations a field can be excluded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Create,
    Update,
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "select" => Ok(Operation::Select),
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            _ => Err(format!("Unknown operation: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(PropType),
    Nested(RecordSchema),
}

/// Everything declared about one field of a model.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    /// Name of the model this field points at
    pub ref_to: Option<String>,
    /// The field holds a list of `kind`
    pub array_of: bool,
    /// `Some(false)` marks the referenced side of a relation
    pub belong: Option<bool>,
    pub excludes: HashSet<Operation>,
    pub default: Option<Value>,
    pub index: bool,
}

impl FieldDescriptor {
    pub fn scalar(prop_type: PropType) -> Self {
        Self {
            kind: FieldKind::Scalar(prop_type),
            ref_to: None,
            array_of: false,
            belong: None,
            excludes: HashSet::new(),
            default: None,
            index: false,
        }
    }

    pub fn nested(schema: RecordSchema) -> Self {
        Self {
            kind: FieldKind::Nested(schema),
            ..Self::scalar(PropType::Object)
        }
    }

    /// Type of the field, or of its elements when `array_of` is set.
    /// Nested schemas report `Object`.
    pub fn prop_type(&self) -> PropType {
        match &self.kind {
            FieldKind::Scalar(prop_type) => *prop_type,
            FieldKind::Nested(_) => PropType::Object,
        }
    }

    pub fn nested_schema(&self) -> Option<&RecordSchema> {
        match &self.kind {
            FieldKind::Nested(schema) => Some(schema),
            FieldKind::Scalar(_) => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.ref_to.is_some()
    }

    /// Owning side: the related keys are stored in this record
    pub fn is_owning(&self) -> bool {
        self.belong != Some(false)
    }

    /// Referenced-side relation fields are never stored
    pub fn is_virtual(&self) -> bool {
        self.is_relation() && !self.is_owning()
    }

    pub fn excluded_from(&self, operation: Operation) -> bool {
        self.excludes.contains(&operation)
    }

    fn is_bare_array(&self) -> bool {
        !self.array_of && matches!(self.kind, FieldKind::Scalar(PropType::Array))
    }
}

/// Result of resolving a path against a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedType {
    pub prop_type: PropType,
    /// The path addresses a whole `arrayOf` list
    pub array_of: bool,
}

impl ResolvedType {
    pub fn new(prop_type: PropType, array_of: bool) -> Self {
        Self {
            prop_type,
            array_of,
        }
    }

    /// Values at this location behave as arrays
    pub fn is_array_like(&self) -> bool {
        self.array_of || self.prop_type == PropType::Array
    }
}

/// A registered model: an ordered list of field descriptors.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    name: String,
    fields: Vec<(String, FieldDescriptor)>,
    options: ModelOptions,
}

enum TypeCursor<'a> {
    Field(&'a FieldDescriptor),
    Element(&'a FieldDescriptor),
    Opaque(PropType),
}

impl RecordSchema {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<(String, FieldDescriptor)>,
        options: ModelOptions,
    ) -> Self {
        Self {
            name: name.into(),
            fields,
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| field)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some() || self.implicit_type(name).is_some()
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn timestamps(&self) -> bool {
        self.options.timestamps
    }

    /// Bookkeeping fields every record carries without declaring them.
    pub fn implicit_type(&self, name: &str) -> Option<PropType> {
        if name == ID_FIELD {
            Some(PropType::Id)
        } else if self.timestamps() && (name == CREATED_AT || name == UPDATED_AT) {
            Some(PropType::DateTime)
        } else {
            None
        }
    }

    /// Fields that are physically stored (relation fields on the referenced
    /// side are resolved on read instead).
    pub fn stored_fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields().filter(|(_, field)| !field.is_virtual())
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields().filter(|(_, field)| field.is_relation())
    }

    /// Parses `raw` against this schema: an existing top-level field name is
    /// taken literally, anything else goes through the path grammar.
    pub fn path(&self, raw: &str) -> PathResult<FieldPath> {
        FieldPath::parse_with(raw, |name| self.has_field(name))
    }

    /// Columns returned or written for `operation`: `id`, every declared field
    /// not excluded from it, then the timestamps.
    pub fn columns_for(&self, operation: Operation) -> Vec<String> {
        let mut columns = vec![ID_FIELD.to_string()];
        columns.extend(
            self.fields()
                .filter(|(_, field)| !field.excluded_from(operation))
                .map(|(name, _)| name.to_string()),
        );
        if self.timestamps() {
            columns.push(CREATED_AT.to_string());
            columns.push(UPDATED_AT.to_string());
        }
        columns
    }

    /// Type addressed by `path`, or `None` when the schema does not describe
    /// that location.
    pub fn resolve(&self, path: &FieldPath) -> Option<ResolvedType> {
        let mut segments = path.segments().iter();
        let first = segments.next()?.as_name()?;
        let mut cursor = match self.field(first) {
            Some(field) => TypeCursor::Field(field),
            None => TypeCursor::Opaque(self.implicit_type(first)?),
        };

        for segment in segments {
            cursor = match (cursor, segment) {
                (TypeCursor::Field(field), Segment::Name(name)) => {
                    if field.array_of {
                        return None;
                    }
                    member(field, name)?
                }
                (TypeCursor::Field(field), _) => {
                    if field.array_of {
                        TypeCursor::Element(field)
                    } else if field.is_bare_array() {
                        TypeCursor::Opaque(PropType::Any)
                    } else {
                        return None;
                    }
                }
                (TypeCursor::Element(field), Segment::Name(name)) => member(field, name)?,
                (TypeCursor::Element(field), _) => {
                    if field.prop_type() == PropType::Array {
                        TypeCursor::Opaque(PropType::Any)
                    } else {
                        return None;
                    }
                }
                (TypeCursor::Opaque(prop_type), Segment::Name(_)) => {
                    if !prop_type.is_opaque() {
                        return None;
                    }
                    TypeCursor::Opaque(prop_type)
                }
                (TypeCursor::Opaque(prop_type), _) => {
                    if !prop_type.is_opaque() && prop_type != PropType::Array {
                        return None;
                    }
                    TypeCursor::Opaque(PropType::Any)
                }
            };
        }

        Some(match cursor {
            TypeCursor::Field(field) if field.array_of => {
                ResolvedType::new(field.prop_type(), !path.descend())
            }
            TypeCursor::Field(field) | TypeCursor::Element(field) => {
                ResolvedType::new(field.prop_type(), false)
            }
            TypeCursor::Opaque(prop_type) => ResolvedType::new(prop_type, false),
        })
    }
}

/// Steps from a single (non-list) value of `field` into its member `name`.
fn member<'a>(field: &'a FieldDescriptor, name: &str) -> Option<TypeCursor<'a>> {
    match &field.kind {
        FieldKind::Nested(schema) => schema.field(name).map(TypeCursor::Field),
        FieldKind::Scalar(prop_type) if prop_type.is_opaque() => Some(TypeCursor::Opaque(*prop_type)),
        FieldKind::Scalar(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> RecordSchema {
        let address = RecordSchema::new(
            "user.address",
            vec![
                ("city".to_string(), FieldDescriptor::scalar(PropType::String)),
                ("zip".to_string(), FieldDescriptor::scalar(PropType::Number)),
            ],
            ModelOptions::default(),
        );
        let mut tags = FieldDescriptor::scalar(PropType::String);
        tags.array_of = true;
        let mut pets = FieldDescriptor::nested(RecordSchema::new(
            "user.pets",
            vec![("name".to_string(), FieldDescriptor::scalar(PropType::String))],
            ModelOptions::default(),
        ));
        pets.array_of = true;

        RecordSchema::new(
            "user",
            vec![
                ("name".to_string(), FieldDescriptor::scalar(PropType::String)),
                ("age".to_string(), FieldDescriptor::scalar(PropType::Number)),
                ("meta".to_string(), FieldDescriptor::scalar(PropType::Object)),
                ("raw".to_string(), FieldDescriptor::scalar(PropType::Array)),
                ("address".to_string(), FieldDescriptor::nested(address)),
                ("tags".to_string(), tags),
                ("pets".to_string(), pets),
            ],
            ModelOptions {
                timestamps: true,
                ..ModelOptions::default()
            },
        )
    }

    fn resolve(raw: &str) -> Option<ResolvedType> {
        let schema = schema();
        let path = schema.path(raw).unwrap();
        schema.resolve(&path)
    }

    #[test]
    fn test_prop_type_tags() {
        assert_eq!("longstr".parse::<PropType>(), Ok(PropType::LongStr));
        assert_eq!("Map".parse::<PropType>(), Ok(PropType::Object));
        assert_eq!("DATE".parse::<PropType>(), Ok(PropType::DateTime));
        assert!("Blob".parse::<PropType>().is_err());
    }

    #[test]
    fn test_resolve_top_level_and_nested() {
        assert_eq!(resolve("name"), Some(ResolvedType::new(PropType::String, false)));
        assert_eq!(resolve("address.zip"), Some(ResolvedType::new(PropType::Number, false)));
        assert_eq!(resolve("address"), Some(ResolvedType::new(PropType::Object, false)));
        assert_eq!(resolve("address.country"), None);
        assert_eq!(resolve("nope"), None);
        assert_eq!(resolve("name.first"), None);
    }

    #[test]
    fn test_resolve_implicit_fields() {
        assert_eq!(resolve("id"), Some(ResolvedType::new(PropType::Id, false)));
        assert_eq!(
            resolve("createdAt"),
            Some(ResolvedType::new(PropType::DateTime, false))
        );
    }

    #[test]
    fn test_resolve_opaque_containers() {
        assert_eq!(resolve("meta.a.b"), Some(ResolvedType::new(PropType::Object, false)));
        assert_eq!(resolve("raw[3]"), Some(ResolvedType::new(PropType::Any, false)));
    }

    #[test]
    fn test_resolve_array_of_fields() {
        assert_eq!(resolve("tags"), Some(ResolvedType::new(PropType::String, true)));
        assert_eq!(resolve("tags."), Some(ResolvedType::new(PropType::String, false)));
        assert_eq!(resolve("tags[0]"), Some(ResolvedType::new(PropType::String, false)));
        assert_eq!(resolve("pets[{name:rex}]"), Some(ResolvedType::new(PropType::Object, false)));
        assert_eq!(resolve("pets[1].name"), Some(ResolvedType::new(PropType::String, false)));
        assert_eq!(resolve("pets.name"), None);
        assert_eq!(resolve("age[0]"), None);
    }

    #[test]
    fn test_columns_for_respects_excludes() {
        let mut secret = FieldDescriptor::scalar(PropType::String);
        secret.excludes.insert(Operation::Select);
        let schema = RecordSchema::new(
            "account",
            vec![
                ("login".to_string(), FieldDescriptor::scalar(PropType::String)),
                ("password".to_string(), secret),
            ],
            ModelOptions::default(),
        );
        assert_eq!(schema.columns_for(Operation::Select), vec!["id", "login"]);
        assert_eq!(
            schema.columns_for(Operation::Create),
            vec!["id", "login", "password"]
        );
    }
}
