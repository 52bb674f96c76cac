/// Common constants shared by the schema, mutation and adapter layers.
///
/// Field names used for bookkeeping on every stored record.
pub const ID_FIELD: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Marker key a model definition may carry; stripped before registration.
pub const MODEL_NAME_MARKER: &str = "__modelName";

/// Condition keys that configure a query rather than filter it.
pub const INDEX_KEY: &str = "_index";
pub const ORDER_BY_KEY: &str = "order_by";
pub const OFFSET_KEY: &str = "offset";
pub const LIMIT_KEY: &str = "limit";
pub const SCOPE_KEY: &str = "scope";

/// Default written to `DateTime` fields that have no declared default.
pub const EPOCH_RFC3339: &str = "1970-01-01T00:00:00Z";

/// Top-level key of a fixture file.
pub const FIXTURE_DATA_KEY: &str = "data";
