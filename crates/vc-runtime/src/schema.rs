use std::collections::BTreeMap;

use serde_json::{json, Value};
use vc_core::VarType;

pub const TODO_LIST_ROOT: &str = "ToDoList";

/// Fields of the task-tracking root, in declaration order: the chapter list,
/// the current chapter marker, then the current/completed/in-progress/pending
/// buckets.
pub const TODO_LIST_FIELDS: [&str; 6] = [
    "chapterList",
    "currentChapter",
    "currentList",
    "completedList",
    "inProgressList",
    "pendingList",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDefault {
    pub var_type: VarType,
    pub value: Value,
}

/// Default shapes for well-known root names, consulted only when a root is
/// written before anything registered it.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    defaults: BTreeMap<String, Value>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.define(
            TODO_LIST_ROOT,
            json!({
                "chapterList": [],
                "currentChapter": "",
                "currentList": [],
                "completedList": [],
                "inProgressList": [],
                "pendingList": [],
            }),
        );
        registry
    }

    pub fn define(&mut self, root_name: impl Into<String>, value: Value) {
        self.defaults.insert(root_name.into(), value);
    }

    pub fn get_default(&self, root_name: &str) -> Option<SchemaDefault> {
        self.defaults.get(root_name).map(|value| SchemaDefault {
            var_type: VarType::of(value),
            value: value.clone(),
        })
    }

    pub fn contains(&self, root_name: &str) -> bool {
        self.defaults.contains_key(root_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod schema_tests {
    use super::*;

    #[test]
    fn builtin_todo_list_has_exactly_the_documented_fields() {
        let registry = SchemaRegistry::builtin();
        let default = registry
            .get_default(TODO_LIST_ROOT)
            .expect("task-tracking root should be known");
        assert_eq!(default.var_type, VarType::Object);

        let fields = default.value.as_object().expect("object default");
        let mut actual = fields.keys().map(String::as_str).collect::<Vec<_>>();
        let mut expected = TODO_LIST_FIELDS.to_vec();
        actual.sort_unstable();
        expected.sort_unstable();
        assert_eq!(actual, expected);

        for field in TODO_LIST_FIELDS {
            let value = &fields[field];
            if field == "currentChapter" {
                assert_eq!(value, &Value::String(String::new()));
            } else {
                assert_eq!(value, &Value::Array(Vec::new()), "field {}", field);
            }
        }
    }

    #[test]
    fn unknown_root_has_no_default() {
        let registry = SchemaRegistry::builtin();
        assert!(registry.get_default("Inventory").is_none());
        assert!(!registry.contains("Inventory"));
        assert!(SchemaRegistry::empty().get_default(TODO_LIST_ROOT).is_none());
    }

    #[test]
    fn define_adds_host_schema() {
        let mut registry = SchemaRegistry::empty();
        registry.define("Party", json!([]));
        let default = registry.get_default("Party").expect("defined");
        assert_eq!(default.var_type, VarType::Array);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Party"]);
    }
}
