use std::ffi::OsString;

use clap::Parser;
use vc_core::VarCommandError;

mod cli_args;
mod error_map;
mod history;
mod models;
mod ops;
mod state_store;

pub(crate) use cli_args::{ApplyArgs, Cli, Mode, QueryArgs, RegisterArgs, RenderArgs, ScopeArgs};
pub(crate) use error_map::{
    emit_error, json_string, map_cli_history_read, map_cli_runtime, map_cli_state_encode,
    map_cli_state_invalid, map_cli_state_read, map_cli_state_write, map_cli_value_invalid,
};
pub(crate) use models::{EngineStateV1, ENGINE_STATE_SCHEMA};
pub(crate) use state_store::{load_engine_state, save_engine_state};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, VarCommandError> {
    match cli.command {
        Mode::Apply(args) => ops::run_apply(args),
        Mode::Render(args) => ops::run_render(args),
        Mode::Query(args) => ops::run_query(args),
        Mode::Register(args) => ops::run_register(args),
    }
}
