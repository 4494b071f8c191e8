use std::fs;
use std::path::Path;

use vc_core::VarCommandError;

use crate::{
    map_cli_state_encode, map_cli_state_invalid, map_cli_state_read, map_cli_state_write,
    EngineStateV1, ENGINE_STATE_SCHEMA,
};

pub(crate) fn save_engine_state(path: &Path, state: &EngineStateV1) -> Result<(), VarCommandError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(map_cli_state_write)?;

    let payload = serde_json::to_string_pretty(state).map_err(map_cli_state_encode)?;
    fs::write(path, payload).map_err(map_cli_state_write)
}

/// A state file that does not exist yet is an empty engine.
pub(crate) fn load_engine_state(path: &Path) -> Result<EngineStateV1, VarCommandError> {
    if !path.exists() {
        return Ok(EngineStateV1::empty());
    }

    let raw = fs::read_to_string(path).map_err(map_cli_state_read)?;
    let state: EngineStateV1 = serde_json::from_str(&raw).map_err(map_cli_state_invalid)?;

    if state.schema_version != ENGINE_STATE_SCHEMA {
        return Err(VarCommandError::new(
            "CLI_STATE_SCHEMA",
            format!("Unsupported engine state schema: {}", state.schema_version),
        ));
    }

    Ok(state)
}
