//! Startup preparation: drop and recreate the configured schemas, then load
//! their init fixtures.

use crate::adapter::Adapter;
use crate::config::{BootstrapConfig, SyncPolicy};
use crate::error::{PathStoreError, PathStoreResult};
use log::info;

/// What [`prepare`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Schemas dropped and recreated, in order
    pub synced: Vec<String>,
    /// Records inserted per imported fixture
    pub imported: Vec<(String, u64)>,
}

impl BootstrapReport {
    pub fn total_imported(&self) -> u64 {
        self.imported.iter().map(|(_, inserted)| inserted).sum()
    }
}

/// Syncs the schemas named by `config.sync`, then imports every init fixture.
pub async fn prepare(adapter: &dyn Adapter, config: &BootstrapConfig) -> PathStoreResult<BootstrapReport> {
    adapter.connect().await?;
    let registry = adapter.registry();

    let targets: Vec<String> = match &config.sync {
        SyncPolicy::Off => Vec::new(),
        SyncPolicy::All => registry.names().map(str::to_string).collect(),
        SyncPolicy::Named(names) => {
            if let Some(unknown) = names.iter().find(|name| !registry.contains(name)) {
                return Err(PathStoreError::invalid_input(format!(
                    "cannot sync unknown schema '{}'",
                    unknown
                )));
            }
            names.clone()
        }
    };

    let mut report = BootstrapReport::default();
    for schema in targets {
        adapter.sync(&schema).await?;
        report.synced.push(schema);
    }

    for (schema, fixture) in &config.inits {
        let inserted = adapter.dump(schema, fixture).await?;
        report.imported.push((schema.clone(), inserted));
    }

    info!(
        "Bootstrap on {} backend: synced {} schemas, imported {} records",
        adapter.backend_name(),
        report.synced.len(),
        report.total_imported()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DocumentStore;
    use crate::query::SelectOptions;
    use crate::schema::{ModelOptions, SchemaRegistry};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(
            SchemaRegistry::builder()
                .define("user", json!({ "name": "String", "age": "Number" }), ModelOptions::default())
                .define("organ", json!({ "name": "String" }), ModelOptions::default())
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_prepare_syncs_and_imports() {
        let dir = tempdir().unwrap();
        let fixture = dir.path().join("users.json");
        std::fs::write(
            &fixture,
            json!({ "data": [{ "name": "a", "age": 1 }, { "name": "b", "age": 2 }] }).to_string(),
        )
        .unwrap();

        let store = DocumentStore::temporary(registry());
        let mut inits = BTreeMap::new();
        inits.insert("user".to_string(), fixture);
        let config = BootstrapConfig {
            sync: SyncPolicy::All,
            inits,
        };

        let report = prepare(&store, &config).await.unwrap();
        assert_eq!(report.synced, vec!["user".to_string(), "organ".to_string()]);
        assert_eq!(report.imported, vec![("user".to_string(), 2)]);

        // a second run starts from empty tables again
        prepare(&store, &config).await.unwrap();
        let users = store
            .select("user", None, &SelectOptions::default())
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn test_prepare_rejects_unknown_sync_target() {
        let store = DocumentStore::temporary(registry());
        let config = BootstrapConfig {
            sync: SyncPolicy::Named(vec!["ghost".to_string()]),
            inits: BTreeMap::new(),
        };
        let error = prepare(&store, &config).await.unwrap_err();
        assert!(matches!(error, PathStoreError::InvalidInput(_)));
    }
}
