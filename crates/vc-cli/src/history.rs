use std::path::PathBuf;

use vc_api::VarEngine;
use vc_core::VarCommandError;

use crate::map_cli_history_read;

pub(crate) const DEFAULT_HISTORY_LINES: usize = 5;
pub(crate) const HISTORY_MACROS: [&str; 2] = ["recentChat", "recentHistory"];

/// Backs the history macros with a transcript file, one message per line.
/// `${recentChat:3}` expands to the last three non-empty lines.
pub(crate) fn register_history_macros(engine: &mut VarEngine, history: PathBuf) {
    for name in HISTORY_MACROS {
        let path = history.clone();
        engine.register_dynamic_macro(name, move |params, _context| {
            let path = path.clone();
            async move {
                let raw = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(map_cli_history_read)?;
                Ok::<_, VarCommandError>(recent_lines(&raw, line_count(&params)))
            }
        });
    }
}

pub(crate) fn line_count(params: &[String]) -> usize {
    params
        .first()
        .and_then(|param| param.parse::<usize>().ok())
        .filter(|count| *count > 0)
        .unwrap_or(DEFAULT_HISTORY_LINES)
}

pub(crate) fn recent_lines(raw: &str, count: usize) -> String {
    let lines = raw
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
