use clap::{Args, Parser, Subcommand};
use vc_core::{character_scope, GLOBAL_SCOPE};

#[derive(Debug, Parser)]
#[command(name = "vcmd")]
#[command(about = "Variable command engine CLI")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Apply <setVar> tags in model output and print the cleaned text.
    Apply(ApplyArgs),
    /// Expand ${...} macros in a template.
    Render(RenderArgs),
    /// Read one value by dotted path.
    Query(QueryArgs),
    /// Register a root variable explicitly.
    Register(RegisterArgs),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct ScopeArgs {
    #[arg(long = "state")]
    pub(crate) state: String,
    #[arg(long = "scope", conflicts_with = "character")]
    pub(crate) scope: Option<String>,
    #[arg(long = "character")]
    pub(crate) character: Option<String>,
}

impl ScopeArgs {
    pub(crate) fn scope_id(&self) -> String {
        match (&self.character, &self.scope) {
            (Some(character), _) => character_scope(character),
            (None, Some(scope)) => scope.clone(),
            (None, None) => GLOBAL_SCOPE.to_string(),
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct ApplyArgs {
    #[command(flatten)]
    pub(crate) scope: ScopeArgs,
    #[arg(long = "text")]
    pub(crate) text: String,
}

#[derive(Debug, Args)]
pub(crate) struct RenderArgs {
    #[command(flatten)]
    pub(crate) scope: ScopeArgs,
    #[arg(long = "text")]
    pub(crate) text: String,
    #[arg(long = "history")]
    pub(crate) history: Option<String>,
    #[arg(long = "max-depth")]
    pub(crate) max_depth: Option<usize>,
}

#[derive(Debug, Args)]
pub(crate) struct QueryArgs {
    #[command(flatten)]
    pub(crate) scope: ScopeArgs,
    #[arg(long = "path")]
    pub(crate) path: String,
}

#[derive(Debug, Args)]
pub(crate) struct RegisterArgs {
    #[command(flatten)]
    pub(crate) scope: ScopeArgs,
    #[arg(long = "name")]
    pub(crate) name: String,
    #[arg(long = "type", default_value = "string")]
    pub(crate) var_type: String,
    #[arg(long = "value")]
    pub(crate) value: Option<String>,
    #[arg(long = "hidden")]
    pub(crate) hidden: bool,
}
