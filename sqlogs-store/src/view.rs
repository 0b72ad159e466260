use std::collections::BTreeMap;

use sqlogs_result::Result;

/// A stored view: an already-translated LogsQL pipeline plus the display
/// name used in diagnostics.
#[derive(Debug, Clone)]
pub struct ViewQuery {
    pub query: String,
    pub display_name: String,
}

/// Source of view definitions.
///
/// Views are addressed by the identifier parts of the referenced name
/// (`["metrics"]`, `["prod", "errors"]`). A store may resolve qualified and
/// unqualified spellings however it likes; `load` returns `Ok(None)` when
/// the name is simply not a view, and an error only for store failures.
pub trait ViewStore: Send + Sync {
    fn load(&self, parts: &[String]) -> Result<Option<ViewQuery>>;
}

/// In-memory [`ViewStore`] backed by an ordered map.
///
/// Resolution tries the full dotted name first, then the bare last part, so
/// both `SELECT * FROM errors` and `SELECT * FROM prod.errors` find a view
/// registered as `prod.errors`.
#[derive(Debug, Default, Clone)]
pub struct MemoryViewStore {
    views: BTreeMap<String, ViewQuery>,
}

impl MemoryViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view under `name` (case-insensitive, may be dotted).
    pub fn insert(&mut self, name: &str, query: &str) {
        self.views.insert(
            name.to_lowercase(),
            ViewQuery {
                query: query.to_string(),
                display_name: name.to_string(),
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl ViewStore for MemoryViewStore {
    fn load(&self, parts: &[String]) -> Result<Option<ViewQuery>> {
        if parts.is_empty() {
            return Ok(None);
        }
        let full = parts.join(".").to_lowercase();
        if let Some(view) = self.views.get(&full) {
            return Ok(Some(view.clone()));
        }
        let last = parts[parts.len() - 1].to_lowercase();
        if last != full {
            if let Some(view) = self.views.get(&last) {
                return Ok(Some(view.clone()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_qualified_and_bare_names() {
        let mut store = MemoryViewStore::new();
        store.insert("prod.errors", "_time:1h | filter level:error");

        let parts = vec!["prod".to_string(), "errors".to_string()];
        let view = store.load(&parts).expect("load").expect("found");
        assert_eq!(view.query, "_time:1h | filter level:error");
        assert_eq!(view.display_name, "prod.errors");

        let missing = store.load(&["errors".to_string()]).expect("load");
        assert!(missing.is_none());
    }

    #[test]
    fn bare_registration_matches_qualified_reference() {
        let mut store = MemoryViewStore::new();
        store.insert("errors", "* | filter level:error");

        let parts = vec!["prod".to_string(), "errors".to_string()];
        let view = store.load(&parts).expect("load").expect("found");
        assert_eq!(view.display_name, "errors");
    }
}
