//! Model definitions: field descriptors, type resolution of paths, and the
//! registry adapters are built on.

pub mod error;
pub mod hooks;
pub mod parsing;
pub mod registry;
pub mod types;

pub use error::{SchemaError, SchemaResult};
pub use hooks::{AfterHook, BeforeHook, HookEvent, ModelHooks, ModelOptions};
pub use parsing::{parse_descriptor, parse_fields, ModelDefinition, ModelFile};
pub use registry::{Relation, RelationSide, SchemaRegistry, SchemaRegistryBuilder};
pub use types::{FieldDescriptor, FieldKind, Operation, PropType, RecordSchema, ResolvedType};
