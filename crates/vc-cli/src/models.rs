use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vc_core::StoreSnapshot;

pub(crate) const ENGINE_STATE_SCHEMA: &str = "var-engine-state.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EngineStateV1 {
    pub(crate) schema_version: String,
    #[serde(default)]
    pub(crate) scopes: BTreeMap<String, StoreSnapshot>,
}

impl EngineStateV1 {
    pub(crate) fn empty() -> Self {
        Self {
            schema_version: ENGINE_STATE_SCHEMA.to_string(),
            scopes: BTreeMap::new(),
        }
    }
}
