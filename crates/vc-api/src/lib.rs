use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use vc_core::{ParseOutcome, SetReport, StoreSnapshot, VarCommandError, VarType, VariableEntry};
use vc_runtime::{
    CommandParser, DynamicMacro, DynamicMacroRegistry, MacroContext, MacroResolver,
    SchemaRegistry, ScopeQueryService, ScopeRegistry, VariableStore, DEFAULT_MAX_MACRO_DEPTH,
};

#[derive(Clone, Default)]
pub struct VarEngineOptions {
    pub schemas: Option<SchemaRegistry>,
    pub dynamic_macros: Option<DynamicMacroRegistry>,
    pub max_macro_depth: Option<usize>,
    pub scopes: BTreeMap<String, StoreSnapshot>,
}

/// Host-facing engine: one store per scope, one macro resolver, one command
/// parser. Calls that mutate a scope must be serialized by the host.
pub struct VarEngine {
    scopes: ScopeRegistry,
    macros: MacroResolver,
    parser: CommandParser,
}

impl VarEngine {
    pub fn new(options: VarEngineOptions) -> Result<Self, VarCommandError> {
        let max_depth = options.max_macro_depth.unwrap_or(DEFAULT_MAX_MACRO_DEPTH);
        if max_depth == 0 {
            return Err(VarCommandError::new(
                "API_MACRO_DEPTH_INVALID",
                "max_macro_depth must be at least 1.",
            ));
        }

        let schemas = Arc::new(options.schemas.unwrap_or_else(SchemaRegistry::builtin));
        let mut scopes = ScopeRegistry::new(schemas);
        for (scope_id, snapshot) in options.scopes {
            scopes.hydrate_scope(&scope_id, snapshot);
        }

        Ok(Self {
            scopes,
            macros: MacroResolver::new(options.dynamic_macros.unwrap_or_default(), max_depth),
            parser: CommandParser::new(),
        })
    }

    pub fn register_dynamic_macro<F, Fut>(&mut self, name: &str, resolve: F)
    where
        F: Fn(Vec<String>, MacroContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, VarCommandError>> + Send + 'static,
    {
        info!(macro_name = %name, "registered dynamic macro");
        self.macros.registry_mut().register_fn(name, resolve);
    }

    pub fn register_dynamic_macro_resolver(&mut self, name: &str, resolver: Arc<dyn DynamicMacro>) {
        info!(macro_name = %name, "registered dynamic macro");
        self.macros.registry_mut().register(name, resolver);
    }

    pub fn register_variable(
        &mut self,
        scope_id: &str,
        root_name: &str,
        var_type: VarType,
        initial_value: Value,
        hidden: bool,
    ) -> Result<VariableEntry, VarCommandError> {
        if root_name.trim().is_empty() || root_name.contains('.') {
            return Err(VarCommandError::new(
                "API_ROOT_NAME_INVALID",
                format!("Root variable name \"{}\" must be non-empty and undotted.", root_name),
            ));
        }
        Ok(self
            .scopes
            .store_mut(scope_id)
            .register(root_name.trim(), var_type, initial_value, hidden)
            .clone())
    }

    pub fn set_variable(
        &mut self,
        scope_id: &str,
        path: &str,
        value: Value,
    ) -> Result<SetReport, VarCommandError> {
        self.scopes.store_mut(scope_id).set_value(path, value)
    }

    /// Applies every `<setVar>` tag in completed model output to the scope
    /// and returns the cleaned text. Never hand this a partially streamed
    /// response.
    pub fn apply_text(&mut self, scope_id: &str, text: &str) -> ParseOutcome {
        let outcome = self.parser.parse(text, self.scopes.store_mut(scope_id));
        info!(
            scope = %scope_id,
            commands = outcome.logs.len(),
            changed = outcome.changed,
            "applied model output"
        );
        outcome
    }

    /// Expands `${...}` references in a template against one scope.
    pub async fn resolve_macros(
        &self,
        scope_id: &str,
        text: &str,
        context: &MacroContext,
    ) -> String {
        match self.scopes.store(scope_id) {
            Some(store) => self.macros.resolve(text, store, context).await,
            None => {
                let empty = VariableStore::new(scope_id, self.scopes.schemas().clone());
                self.macros.resolve(text, &empty, context).await
            }
        }
    }

    pub fn get_value(&self, scope_id: &str, path: &str) -> Option<Value> {
        self.scopes
            .store(scope_id)
            .and_then(|store| store.get_value(path))
    }

    pub fn store(&self, scope_id: &str) -> Option<&VariableStore> {
        self.scopes.store(scope_id)
    }

    pub fn snapshot_scope(&self, scope_id: &str) -> StoreSnapshot {
        self.scopes.snapshot_scope(scope_id)
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, StoreSnapshot> {
        self.scopes
            .scope_ids()
            .map(|scope_id| (scope_id.to_string(), self.scopes.snapshot_scope(scope_id)))
            .collect()
    }

    pub fn hydrate_scope(&mut self, scope_id: &str, snapshot: StoreSnapshot) {
        self.scopes.hydrate_scope(scope_id, snapshot);
    }

    pub fn drop_scope(&mut self, scope_id: &str) -> bool {
        self.scopes.drop_scope(scope_id).is_some()
    }
}

impl ScopeQueryService for VarEngine {
    fn query(&mut self, scope_id: &str, path: &str) -> Value {
        self.scopes.query(scope_id, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vc_core::{character_scope, CommandOutcome, GLOBAL_SCOPE};

    fn engine() -> VarEngine {
        VarEngine::new(VarEngineOptions::default()).expect("engine should build")
    }

    #[test]
    fn new_rejects_zero_macro_depth() {
        let error = VarEngine::new(VarEngineOptions {
            max_macro_depth: Some(0),
            ..VarEngineOptions::default()
        })
        .err()
        .expect("zero depth should fail");
        assert_eq!(error.code, "API_MACRO_DEPTH_INVALID");
    }

    #[test]
    fn apply_text_mutates_only_the_target_scope() {
        let mut engine = engine();
        let scope = character_scope("3");
        let outcome = engine.apply_text(
            &scope,
            r#"She smiles.<setVar name="affection" value="5">liked the gift</setVar>"#,
        );
        assert_eq!(outcome.clean_text, "She smiles.");
        assert_eq!(outcome.logs[0].outcome, CommandOutcome::Registered);
        assert_eq!(engine.get_value(&scope, "affection"), Some(json!("5")));
        assert_eq!(engine.get_value(GLOBAL_SCOPE, "affection"), None);
    }

    #[tokio::test]
    async fn resolve_macros_uses_dynamic_and_store_values() {
        let mut engine = engine();
        engine.register_dynamic_macro("recentChat", |params, context| async move {
            Ok::<_, VarCommandError>(format!(
                "[{} last {}]",
                context.scope_id,
                params.first().cloned().unwrap_or_else(|| "10".to_string())
            ))
        });
        engine.apply_text(
            GLOBAL_SCOPE,
            r#"<setVar name="ToDoList.chapterList.0" value="第一章"/>"#,
        );

        let context = MacroContext::for_scope(GLOBAL_SCOPE);
        let text = engine
            .resolve_macros(
                GLOBAL_SCOPE,
                "Chapter: ${ToDoList.chapterList.0}\n${recentChat:4}",
                &context,
            )
            .await;
        assert_eq!(text, "Chapter: 第一章\n[global last 4]");
    }

    #[tokio::test]
    async fn resolve_macros_on_untouched_scope_is_empty_and_side_effect_free() {
        let engine = engine();
        let text = engine
            .resolve_macros("character:x", "a${b}c", &MacroContext::default())
            .await;
        assert_eq!(text, "ac");
        assert!(engine.store("character:x").is_none());
    }

    #[test]
    fn register_variable_validates_root_name() {
        let mut engine = engine();
        let entry = engine
            .register_variable(GLOBAL_SCOPE, "secret", VarType::String, json!("x"), true)
            .expect("register");
        assert!(entry.hidden);

        let error = engine
            .register_variable(GLOBAL_SCOPE, "a.b", VarType::String, json!("x"), false)
            .expect_err("dotted root");
        assert_eq!(error.code, "API_ROOT_NAME_INVALID");
    }

    #[test]
    fn query_returns_null_for_missing_values() {
        let mut engine = engine();
        engine
            .set_variable(GLOBAL_SCOPE, "world.day", json!(3))
            .expect("set");
        assert_eq!(engine.query(GLOBAL_SCOPE, "world.day"), json!(3));
        assert_eq!(engine.query(GLOBAL_SCOPE, "world.night"), Value::Null);
        assert_eq!(engine.query("character:new", "anything"), Value::Null);
    }

    #[test]
    fn snapshots_seed_a_new_engine() {
        let mut engine = engine();
        engine.apply_text(GLOBAL_SCOPE, r#"<setVar name="HP" value="42"/>"#);
        engine.apply_text("character:1", r#"<setVar name="bag.0" value="rope"/>"#);
        let scopes = engine.snapshot_all();
        assert_eq!(scopes.len(), 2);

        let mut restored = VarEngine::new(VarEngineOptions {
            scopes,
            ..VarEngineOptions::default()
        })
        .expect("engine should build");
        assert_eq!(restored.query(GLOBAL_SCOPE, "HP"), json!("42"));
        assert_eq!(restored.query("character:1", "bag.0"), json!("rope"));

        assert!(restored.drop_scope("character:1"));
        assert!(restored.snapshot_scope("character:1").is_empty());
    }

    #[test]
    fn custom_schema_registry_is_used_for_new_roots() {
        let mut schemas = SchemaRegistry::empty();
        schemas.define("Party", json!({"members": []}));
        let mut engine = VarEngine::new(VarEngineOptions {
            schemas: Some(schemas),
            ..VarEngineOptions::default()
        })
        .expect("engine should build");

        engine.apply_text(GLOBAL_SCOPE, r#"<setVar name="Party.leader" value="Ada"/>"#);
        engine.apply_text(GLOBAL_SCOPE, r#"<setVar name="ToDoList.currentChapter" value="1"/>"#);
        assert_eq!(engine.query(GLOBAL_SCOPE, "Party.members"), json!([]));
        assert_eq!(engine.query(GLOBAL_SCOPE, "ToDoList.pendingList"), Value::Null);
    }
}
