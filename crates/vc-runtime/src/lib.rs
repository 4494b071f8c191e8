mod commands;
mod macros;
mod query;
mod schema;
mod store;
mod value_path;

pub use commands::{scan_set_var_commands, CommandParser, SetVarCommand};
pub use macros::{
    find_innermost_macros, DynamicMacro, DynamicMacroRegistry, MacroContext, MacroResolver,
    DEFAULT_MAX_MACRO_DEPTH,
};
pub use query::{ScopeQueryService, ScopeRegistry};
pub use schema::{SchemaDefault, SchemaRegistry, TODO_LIST_FIELDS, TODO_LIST_ROOT};
pub use store::VariableStore;
pub use value_path::{
    coerce_incoming_value, get_path, parse_path, set_path, PathSegment, MAX_ARRAY_INDEX,
};
