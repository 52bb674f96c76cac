//! Fixture files: `{ "data": [ <record>, ... ] }`.

use super::error::{AdapterError, AdapterResult};
use crate::constants::FIXTURE_DATA_KEY;
use crate::Record;
use serde_json::Value;
use std::path::Path;

pub async fn read_fixture(path: &Path) -> AdapterResult<Vec<Record>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_fixture(&text).map_err(|reason| AdapterError::fixture(path.display().to_string(), reason))
}

pub fn parse_fixture(text: &str) -> Result<Vec<Record>, String> {
    let document: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let data = document
        .get(FIXTURE_DATA_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing \"{}\" array", FIXTURE_DATA_KEY))?;

    data.iter()
        .enumerate()
        .map(|(position, entry)| {
            entry
                .as_object()
                .cloned()
                .ok_or_else(|| format!("entry {} is not an object", position))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixture() {
        let records = parse_fixture(r#"{ "data": [ { "name": "a" }, { "name": "b" } ] }"#).unwrap();
        assert_eq!(records.len(), 2);

        assert!(parse_fixture(r#"{ "rows": [] }"#).is_err());
        assert!(parse_fixture(r#"{ "data": [1] }"#).is_err());
        assert!(parse_fixture("not json").is_err());
    }
}
