use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use sqlogs_result::{Error, Result};

use crate::provider::Provider;
use crate::table::MemoryTableStore;
use crate::view::MemoryViewStore;

/// TOML-backed store configuration.
///
/// ```toml
/// [tables]
/// logs = "*"
/// nginx = "app:nginx"
/// slow = "app:api | filter duration:>1000"
///
/// [views]
/// recent_errors = "_time:1h | filter level:error"
/// ```
///
/// Table values are LogsQL source expressions: a filter, or a full pipeline
/// when the text contains `|`. View values are complete LogsQL pipelines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
    #[serde(default)]
    pub views: BTreeMap<String, String>,
}

impl StoreConfig {
    /// Load a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&text)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        tracing::debug!(
            tables = config.tables.len(),
            views = config.views.len(),
            path = %path.display(),
            "loaded store configuration"
        );
        Ok(config)
    }

    /// Build a [`Provider`] over in-memory stores seeded from this config.
    pub fn into_provider(self) -> Provider {
        let mut tables = MemoryTableStore::new();
        for (name, expr) in &self.tables {
            tables.insert(name, expr);
        }
        let mut views = MemoryViewStore::new();
        for (name, query) in &self.views {
            views.insert(name, query);
        }
        let provider = Provider::new(tables);
        if views.is_empty() {
            provider
        } else {
            provider.with_views(views)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_tables_and_views() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[tables]\nlogs = \"*\"\nnginx = \"app:nginx\"\n\n[views]\nerrs = \"* | filter level:error\"\n"
        )
        .expect("write config");

        let config = StoreConfig::load(file.path()).expect("load config");
        assert_eq!(config.tables.get("logs").map(String::as_str), Some("*"));

        let provider = config.into_provider();
        assert_eq!(
            provider.table_store().get("nginx").as_deref(),
            Some("app:nginx")
        );
        let view = provider
            .view_store()
            .expect("view store present")
            .load(&["errs".to_string()])
            .expect("load view")
            .expect("view found");
        assert_eq!(view.query, "* | filter level:error");
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[tables\nbroken").expect("write config");

        let err = StoreConfig::load(file.path()).expect_err("malformed config");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn empty_config_has_no_view_store() {
        let config = StoreConfig::default();
        let provider = config.into_provider();
        assert!(provider.view_store().is_none());
        assert!(provider.table_store().list().is_empty());
    }
}
