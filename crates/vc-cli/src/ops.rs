use std::path::{Path, PathBuf};

use serde_json::Value;
use vc_api::{VarEngine, VarEngineOptions};
use vc_core::{VarCommandError, VarType};
use vc_runtime::{MacroContext, ScopeQueryService};

use crate::history::register_history_macros;
use crate::{
    json_string, load_engine_state, map_cli_runtime, map_cli_value_invalid, save_engine_state,
    ApplyArgs, EngineStateV1, QueryArgs, RegisterArgs, RenderArgs, ScopeArgs,
    ENGINE_STATE_SCHEMA,
};

fn load_engine(args: &ScopeArgs, max_depth: Option<usize>) -> Result<VarEngine, VarCommandError> {
    let state = load_engine_state(Path::new(&args.state))?;
    VarEngine::new(VarEngineOptions {
        max_macro_depth: max_depth,
        scopes: state.scopes,
        ..VarEngineOptions::default()
    })
}

fn save_engine(args: &ScopeArgs, engine: &VarEngine) -> Result<(), VarCommandError> {
    let state = EngineStateV1 {
        schema_version: ENGINE_STATE_SCHEMA.to_string(),
        scopes: engine.snapshot_all(),
    };
    save_engine_state(Path::new(&args.state), &state)
}

pub(crate) fn run_apply(args: ApplyArgs) -> Result<i32, VarCommandError> {
    let scope_id = args.scope.scope_id();
    let mut engine = load_engine(&args.scope, None)?;
    let outcome = engine.apply_text(&scope_id, &args.text);
    if outcome.changed {
        save_engine(&args.scope, &engine)?;
    }

    println!("RESULT:OK");
    println!("SCOPE:{}", scope_id);
    println!("CHANGED:{}", outcome.changed);
    for entry in &outcome.logs {
        println!(
            "LOG:{}|{}|{}",
            entry.outcome.name(),
            json_string(&entry.path),
            json_string(&entry.detail)
        );
    }
    println!("CLEAN_TEXT_JSON:{}", json_string(&outcome.clean_text));
    println!("STATE_OUT:{}", args.scope.state);
    Ok(0)
}

pub(crate) fn run_render(args: RenderArgs) -> Result<i32, VarCommandError> {
    let scope_id = args.scope.scope_id();
    let mut engine = load_engine(&args.scope, args.max_depth)?;
    if let Some(history) = &args.history {
        register_history_macros(&mut engine, PathBuf::from(history));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(map_cli_runtime)?;
    let context = MacroContext::for_scope(scope_id.clone());
    let text = runtime.block_on(engine.resolve_macros(&scope_id, &args.text, &context));

    println!("RESULT:OK");
    println!("SCOPE:{}", scope_id);
    println!("TEXT_JSON:{}", json_string(&text));
    Ok(0)
}

pub(crate) fn run_query(args: QueryArgs) -> Result<i32, VarCommandError> {
    let scope_id = args.scope.scope_id();
    let mut engine = load_engine(&args.scope, None)?;
    let value = engine.query(&scope_id, &args.path);

    println!("RESULT:OK");
    println!("SCOPE:{}", scope_id);
    println!("VALUE_JSON:{}", value);
    Ok(0)
}

pub(crate) fn run_register(args: RegisterArgs) -> Result<i32, VarCommandError> {
    let scope_id = args.scope.scope_id();
    let var_type = VarType::parse(&args.var_type).ok_or_else(|| {
        VarCommandError::new(
            "CLI_TYPE_INVALID",
            format!("Unknown variable type \"{}\".", args.var_type),
        )
    })?;
    let value = parse_register_value(var_type, args.value.as_deref())?;

    let mut engine = load_engine(&args.scope, None)?;
    let entry = engine.register_variable(&scope_id, &args.name, var_type, value, args.hidden)?;
    save_engine(&args.scope, &engine)?;

    let entry_json = serde_json::to_string(&entry).map_err(map_cli_value_invalid)?;
    println!("RESULT:OK");
    println!("SCOPE:{}", scope_id);
    println!("ENTRY_JSON:{}", entry_json);
    println!("STATE_OUT:{}", args.scope.state);
    Ok(0)
}

/// String variables take the text verbatim; every other type reads the value
/// as JSON. A missing value means the type's empty default.
pub(crate) fn parse_register_value(
    var_type: VarType,
    raw: Option<&str>,
) -> Result<Value, VarCommandError> {
    match (var_type, raw) {
        (_, None) => Ok(var_type.default_value()),
        (VarType::String, Some(raw)) => Ok(Value::String(raw.to_string())),
        (_, Some(raw)) => serde_json::from_str(raw).map_err(map_cli_value_invalid),
    }
}
