use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TESTCASE_SCHEMA_V1: &str = "vc-tool-case.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Dynamic macros backed by templates. `$1`, `$2`... take the macro
    /// params and `$scope` takes the scope being rendered.
    #[serde(default)]
    pub macros: BTreeMap<String, String>,
    #[serde(default)]
    pub steps: Vec<CaseStep>,
    #[serde(default)]
    pub expected_events: Vec<ExpectedEvent>,
}

fn default_scope() -> String {
    vc_core::GLOBAL_SCOPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepAction {
    Apply {
        text: String,
    },
    Render {
        text: String,
    },
    Query {
        path: String,
    },
    Register {
        name: String,
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default)]
        hidden: bool,
    },
}

impl StepAction {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Apply { .. } => "apply",
            Self::Render { .. } => "render",
            Self::Query { .. } => "query",
            Self::Register { .. } => "register",
        }
    }
}

/// One observation per step, in step order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExpectedEvent {
    Applied {
        #[serde(rename = "cleanText")]
        clean_text: String,
        changed: bool,
        #[serde(default)]
        outcomes: Vec<String>,
    },
    Rendered {
        text: String,
    },
    Value {
        value: Value,
    },
    Registered {
        #[serde(rename = "type")]
        type_name: String,
        value: Value,
    },
}
