use std::fmt::Display;

use vc_core::VarCommandError;

fn map_error(code: &'static str, error: impl Display) -> VarCommandError {
    VarCommandError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: VarCommandError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    1
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

pub(crate) fn map_cli_state_write(error: std::io::Error) -> VarCommandError {
    map_error("CLI_STATE_WRITE", error)
}

pub(crate) fn map_cli_state_read(error: std::io::Error) -> VarCommandError {
    map_error("CLI_STATE_READ", error)
}

pub(crate) fn map_cli_state_invalid(error: serde_json::Error) -> VarCommandError {
    map_error("CLI_STATE_INVALID", error)
}

pub(crate) fn map_cli_state_encode(error: serde_json::Error) -> VarCommandError {
    map_error("CLI_STATE_ENCODE", error)
}

pub(crate) fn map_cli_value_invalid(error: serde_json::Error) -> VarCommandError {
    map_error("CLI_VALUE_INVALID", error)
}

pub(crate) fn map_cli_runtime(error: std::io::Error) -> VarCommandError {
    map_error("CLI_RUNTIME", error)
}

pub(crate) fn map_cli_history_read(error: std::io::Error) -> VarCommandError {
    map_error("CLI_HISTORY_READ", error)
}
