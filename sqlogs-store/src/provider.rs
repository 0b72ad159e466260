use std::sync::Arc;

use crate::table::TableStore;
use crate::view::ViewStore;

/// The translator's single handle onto table and view resolution.
///
/// The view store is optional: a provider without one resolves tables and
/// CTEs only, which is the common embedded setup.
#[derive(Clone)]
pub struct Provider {
    tables: Arc<dyn TableStore>,
    views: Option<Arc<dyn ViewStore>>,
}

impl Provider {
    pub fn new(tables: impl TableStore + 'static) -> Self {
        Self {
            tables: Arc::new(tables),
            views: None,
        }
    }

    pub fn with_views(mut self, views: impl ViewStore + 'static) -> Self {
        self.views = Some(Arc::new(views));
        self
    }

    pub fn table_store(&self) -> &dyn TableStore {
        self.tables.as_ref()
    }

    pub fn view_store(&self) -> Option<&dyn ViewStore> {
        self.views.as_deref()
    }
}
