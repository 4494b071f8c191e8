use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use vc_core::StoreSnapshot;

use crate::schema::SchemaRegistry;
use crate::store::VariableStore;

/// Read-only path lookup by scope, for collaborators that do not go through
/// macro expansion. Absent values come back as JSON null.
pub trait ScopeQueryService {
    fn query(&mut self, scope_id: &str, path: &str) -> Value;
}

/// All stores of one engine, created lazily per scope id. Stores never share
/// entries; cross-scope reads go through the scope id explicitly.
#[derive(Debug, Clone)]
pub struct ScopeRegistry {
    schemas: Arc<SchemaRegistry>,
    scopes: BTreeMap<String, VariableStore>,
}

impl ScopeRegistry {
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            schemas,
            scopes: BTreeMap::new(),
        }
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn store(&self, scope_id: &str) -> Option<&VariableStore> {
        self.scopes.get(scope_id)
    }

    pub fn store_mut(&mut self, scope_id: &str) -> &mut VariableStore {
        let schemas = &self.schemas;
        self.scopes
            .entry(scope_id.to_string())
            .or_insert_with(|| {
                debug!(scope = %scope_id, "creating variable store");
                VariableStore::new(scope_id, schemas.clone())
            })
    }

    pub fn hydrate_scope(&mut self, scope_id: &str, snapshot: StoreSnapshot) {
        let store = VariableStore::hydrate(scope_id, snapshot, self.schemas.clone());
        self.scopes.insert(scope_id.to_string(), store);
    }

    pub fn snapshot_scope(&self, scope_id: &str) -> StoreSnapshot {
        self.scopes
            .get(scope_id)
            .map(VariableStore::serialize)
            .unwrap_or_default()
    }

    pub fn drop_scope(&mut self, scope_id: &str) -> Option<VariableStore> {
        self.scopes.remove(scope_id)
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}

impl ScopeQueryService for ScopeRegistry {
    fn query(&mut self, scope_id: &str, path: &str) -> Value {
        self.store_mut(scope_id)
            .get_value(path)
            .unwrap_or(Value::Null)
    }
}
