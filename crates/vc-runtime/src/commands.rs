use std::ops::Range;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, info, warn};
use vc_core::{value_preview, CommandLogEntry, CommandOutcome, ParseOutcome, SetReport};

use crate::store::VariableStore;

const OPEN_TAG_PATTERN: &str = r#"(?s)<setVar((?:\s+[A-Za-z_][A-Za-z0-9_:-]*\s*=\s*(?:"(?:[^"\\<]|\\.)*"|'(?:[^'\\<]|\\.)*'))*)\s*(/?)>"#;
const CLOSE_TAG_PATTERN: &str = r"</setVar\s*>";
const ATTRIBUTE_PATTERN: &str = r#"(?s)([A-Za-z_][A-Za-z0-9_:-]*)\s*=\s*(?:"((?:[^"\\<]|\\.)*)"|'((?:[^'\\<]|\\.)*)')"#;
const PREVIEW_CHARS: usize = 80;

fn open_tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(OPEN_TAG_PATTERN).expect("setVar open tag regex must compile"))
}

fn close_tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(CLOSE_TAG_PATTERN).expect("setVar close tag regex must compile"))
}

fn attribute_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(ATTRIBUTE_PATTERN).expect("attribute regex must compile"))
}

/// One well-formed `<setVar>` tag found in model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVarCommand {
    pub span: Range<usize>,
    pub name: String,
    pub value: String,
    pub note: Option<String>,
}

enum Closing {
    Found { body_end: usize, end: usize },
    Nested { end: usize },
    Missing,
}

/// Finds the `</setVar>` matching an opener whose `>` ends at `from`.
/// Openers met on the way are counted, so a tag wrapping another tag is
/// reported as nested as a whole.
fn find_closing_tag(text: &str, from: usize) -> Closing {
    let mut depth = 1usize;
    let mut nested = false;
    let mut cursor = from;
    loop {
        let next_open = open_tag_regex().captures_at(text, cursor).and_then(|opener| {
            let self_closing = is_self_closing(&opener);
            opener.get(0).map(|m| (m.range(), self_closing))
        });
        let next_close = close_tag_regex().find_at(text, cursor);
        match (next_open, next_close) {
            (Some((open, self_closing)), close)
                if close.map_or(true, |close| open.start < close.start()) =>
            {
                nested = true;
                if !self_closing {
                    depth += 1;
                }
                cursor = open.end;
            }
            (_, Some(close)) => {
                depth -= 1;
                if depth == 0 {
                    return if nested {
                        Closing::Nested { end: close.end() }
                    } else {
                        Closing::Found {
                            body_end: close.start(),
                            end: close.end(),
                        }
                    };
                }
                cursor = close.end();
            }
            _ => return Closing::Missing,
        }
    }
}

fn is_self_closing(opener: &Captures<'_>) -> bool {
    opener.get(2).is_some_and(|m| m.as_str() == "/")
}

fn read_attributes(attributes: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut value = None;
    for attribute in attribute_regex().captures_iter(attributes) {
        let key = attribute.get(1).map(|m| m.as_str()).unwrap_or_default();
        let raw = attribute
            .get(2)
            .or_else(|| attribute.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match key {
            "name" if name.is_none() => name = Some(unescape_attribute(raw).trim().to_string()),
            "value" if value.is_none() => value = Some(unescape_attribute(raw)),
            _ => {}
        }
    }
    (name, value)
}

/// Finds every well-formed `<setVar>` tag, left to right. Tags missing
/// `name` or `value`, tags with an empty name, unclosed tags and tags
/// wrapping another `<setVar` are not commands: they stay in the text and
/// scanning resumes right after their opening `<`, so a slip never hides a
/// later command.
pub fn scan_set_var_commands(text: &str) -> Vec<SetVarCommand> {
    let mut commands = Vec::new();
    let mut cursor = 0usize;
    while let Some(opener) = open_tag_regex().captures_at(text, cursor) {
        let Some(full) = opener.get(0) else {
            break;
        };
        let retry_at = full.start() + 1;

        let (span, note) = if is_self_closing(&opener) {
            (full.range(), None)
        } else {
            match find_closing_tag(text, full.end()) {
                Closing::Found { body_end, end } => (
                    full.start()..end,
                    Some(text[full.end()..body_end].to_string()),
                ),
                Closing::Nested { end } => {
                    debug!(offset = full.start(), "skipping nested setVar tag");
                    cursor = end;
                    continue;
                }
                Closing::Missing => {
                    debug!(offset = full.start(), "skipping unclosed setVar tag");
                    cursor = retry_at;
                    continue;
                }
            }
        };

        let attributes = opener.get(1).map(|m| m.as_str()).unwrap_or_default();
        match read_attributes(attributes) {
            (Some(name), Some(value)) if !name.is_empty() => {
                cursor = span.end;
                commands.push(SetVarCommand {
                    span,
                    name,
                    value,
                    note,
                });
            }
            _ => {
                debug!(offset = full.start(), "skipping setVar tag without name or value");
                cursor = retry_at;
            }
        }
    }
    commands
}

fn unescape_attribute(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(next @ ('"' | '\'' | '\\')) => out.push(next),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    decode_entities(&out)
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Applies `<setVar>` tags in model output to a store and strips them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandParser;

impl CommandParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str, store: &mut VariableStore) -> ParseOutcome {
        let commands = scan_set_var_commands(text);
        let mut logs = Vec::with_capacity(commands.len());
        let mut clean_text = String::with_capacity(text.len());
        let mut last_index = 0usize;

        for command in &commands {
            logs.push(apply_command(command, store));
            clean_text.push_str(&text[last_index..command.span.start]);
            last_index = command.span.end;
        }
        clean_text.push_str(&text[last_index..]);

        let changed = logs.iter().any(|entry| entry.outcome.is_success());
        ParseOutcome {
            clean_text,
            logs,
            changed,
        }
    }
}

fn apply_command(command: &SetVarCommand, store: &mut VariableStore) -> CommandLogEntry {
    let scope = store.scope_id().to_string();
    match store.set_value(&command.name, Value::String(command.value.clone())) {
        Ok(report) => {
            let outcome = if report.registered {
                CommandOutcome::Registered
            } else {
                CommandOutcome::Updated
            };
            let detail = describe_success(store, &command.name, &report);
            info!(scope = %scope, path = %command.name, outcome = outcome.name(), "{}", detail);
            CommandLogEntry {
                path: command.name.clone(),
                outcome,
                detail,
            }
        }
        Err(error) => {
            warn!(scope = %scope, path = %command.name, %error, "setVar failed");
            CommandLogEntry {
                path: command.name.clone(),
                outcome: CommandOutcome::Failed,
                detail: error.message,
            }
        }
    }
}

fn describe_success(store: &VariableStore, path: &str, report: &SetReport) -> String {
    let written = store
        .lookup(path)
        .map(|value| value_preview(value, PREVIEW_CHARS))
        .unwrap_or_default();
    let mut detail = if report.registered {
        format!("registered as {}, set to {}", report.var_type, written)
    } else {
        format!("set to {}", written)
    };
    for conversion in &report.conversions {
        detail.push_str("; ");
        detail.push_str(&conversion.to_string());
    }
    detail
}

#[cfg(test)]
mod commands_tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use vc_core::VarType;

    fn store() -> VariableStore {
        VariableStore::new("character:7", Arc::new(SchemaRegistry::builtin()))
    }

    #[test]
    fn end_to_end_bare_variable_is_registered_and_stripped() {
        let mut store = store();
        let outcome = CommandParser::new().parse(
            r#"Before ... <setVar name="HP" value="42">heal</setVar> ... After"#,
            &mut store,
        );
        assert_eq!(outcome.clean_text, "Before ...  ... After");
        assert_eq!(outcome.logs.len(), 1);
        assert_eq!(outcome.logs[0].path, "HP");
        assert_eq!(outcome.logs[0].outcome, CommandOutcome::Registered);
        assert!(outcome.changed);
        assert_eq!(store.get_value("HP"), Some(json!("42")));
        assert_eq!(
            store.get_root_entry("HP").map(|entry| entry.var_type),
            Some(VarType::String)
        );
    }

    #[test]
    fn dotted_unknown_root_registers_object() {
        let mut store = store();
        let outcome = CommandParser::new().parse(
            r#"<setVar name="Inventory.items.0" value="sword">note</setVar>"#,
            &mut store,
        );
        assert_eq!(outcome.clean_text, "");
        assert_eq!(outcome.logs[0].outcome, CommandOutcome::Registered);
        assert_eq!(
            store.get_root_entry("Inventory").map(|entry| entry.var_type),
            Some(VarType::Object)
        );
        assert_eq!(store.get_value("Inventory.items.0"), Some(json!("sword")));
    }

    #[test]
    fn second_write_is_an_update() {
        let mut store = store();
        let parser = CommandParser::new();
        parser.parse(r#"<setVar name="mood" value="calm"/>"#, &mut store);
        let outcome = parser.parse(r#"<setVar name="mood" value="angry"></setVar>"#, &mut store);
        assert_eq!(outcome.logs[0].outcome, CommandOutcome::Updated);
        assert_eq!(outcome.logs[0].detail, "set to \"angry\"");
        assert_eq!(store.get_value("mood"), Some(json!("angry")));
    }

    #[test]
    fn single_quotes_escapes_and_attribute_order_are_accepted() {
        let mut store = store();
        let outcome = CommandParser::new().parse(
            r#"<setVar value='it\'s "fine"' name='line'>x</setVar><setVar value="say \"hi\"" name="quote"/>"#,
            &mut store,
        );
        assert_eq!(outcome.clean_text, "");
        assert_eq!(store.get_value("line"), Some(json!("it's \"fine\"")));
        assert_eq!(store.get_value("quote"), Some(json!("say \"hi\"")));
    }

    #[test]
    fn json_values_are_stored_as_structures() {
        let mut store = store();
        CommandParser::new().parse(
            r#"<setVar name="ToDoList.pendingList" value='["find key", "open door"]'>plan</setVar>"#,
            &mut store,
        );
        assert_eq!(
            store.get_value("ToDoList.pendingList.1"),
            Some(json!("open door"))
        );
        assert_eq!(store.get_value("ToDoList.completedList"), Some(json!([])));
    }

    #[test]
    fn multiline_bodies_and_multiple_tags_apply_in_order() {
        let mut store = store();
        let outcome = CommandParser::new().parse(
            "A<setVar name=\"n\" value=\"1\">first\nline</setVar>B<setVar name=\"n\" value=\"2\">second</setVar>C",
            &mut store,
        );
        assert_eq!(outcome.clean_text, "ABC");
        assert_eq!(outcome.logs.len(), 2);
        assert_eq!(outcome.logs[0].outcome, CommandOutcome::Registered);
        assert_eq!(outcome.logs[1].outcome, CommandOutcome::Updated);
        assert_eq!(store.get_value("n"), Some(json!("2")));
    }

    #[test]
    fn malformed_tags_are_left_untouched() {
        let mut store = store();
        let inputs = [
            r#"<setVar value="1">no name</setVar>"#,
            r#"<setVar name="a">no value</setVar>"#,
            r#"<setVar name="" value="1">empty name</setVar>"#,
            r#"<setVar name="a" value="x<y">lt in value</setVar>"#,
            r#"<setVar name="a" value="1">unclosed"#,
            r#"<setVar name="a" value="1"><setVar name="b" value="2">nested</setVar></setVar>"#,
        ];
        for input in inputs {
            let outcome = CommandParser::new().parse(input, &mut store);
            assert_eq!(outcome.clean_text, input);
            assert!(outcome.logs.is_empty(), "input {}", input);
            assert!(!outcome.changed);
        }
        assert!(store.is_empty());
    }

    #[test]
    fn unclosed_tag_does_not_hide_a_later_command() {
        let mut store = store();
        let outcome = CommandParser::new().parse(
            r#"<setVar name="a" value="1">oops no close. Later <setVar name="HP" value="42">heal</setVar> end"#,
            &mut store,
        );
        assert_eq!(
            outcome.clean_text,
            r#"<setVar name="a" value="1">oops no close. Later  end"#
        );
        assert_eq!(outcome.logs.len(), 1);
        assert_eq!(outcome.logs[0].path, "HP");
        assert_eq!(store.get_value("HP"), Some(json!("42")));
        assert_eq!(store.get_value("a"), None);
    }

    #[test]
    fn tag_missing_value_does_not_hide_a_later_command() {
        let mut store = store();
        let outcome = CommandParser::new().parse(
            r#"<setVar name="a">x <setVar name="HP" value="42">heal</setVar> end"#,
            &mut store,
        );
        assert_eq!(outcome.clean_text, r#"<setVar name="a">x  end"#);
        assert_eq!(outcome.logs.len(), 1);
        assert!(outcome.changed);
        assert_eq!(store.get_value("HP"), Some(json!("42")));

        let outcome = CommandParser::new().parse(
            r#"<setVar name="b">closed</setVar> then <setVar name="HP" value="7"/>"#,
            &mut store,
        );
        assert_eq!(outcome.clean_text, r#"<setVar name="b">closed</setVar> then "#);
        assert_eq!(store.get_value("HP"), Some(json!("7")));
    }

    #[test]
    fn nested_block_is_skipped_but_following_command_applies() {
        let mut store = store();
        let nested = r#"<setVar name="a" value="1"><setVar name="b" value="2">n</setVar></setVar>"#;
        let outcome = CommandParser::new().parse(
            &format!(r#"{}<setVar name="c" value="3"/>"#, nested),
            &mut store,
        );
        assert_eq!(outcome.clean_text, nested);
        assert_eq!(outcome.logs.len(), 1);
        assert_eq!(outcome.logs[0].path, "c");
        assert_eq!(store.get_value("b"), None);
    }

    #[test]
    fn failed_write_is_logged_and_tag_still_removed() {
        let mut store = store();
        let outcome = CommandParser::new().parse(
            r#"<setVar name="HP" value="42"/>ok<setVar name="HP.max" value="99">x</setVar>"#,
            &mut store,
        );
        assert_eq!(outcome.clean_text, "ok");
        assert_eq!(outcome.logs[1].outcome, CommandOutcome::Failed);
        assert!(outcome.logs[1]
            .detail
            .contains("target container is not an object"));
        assert!(outcome.changed);
        assert_eq!(store.get_value("HP"), Some(json!("42")));
    }

    #[test]
    fn only_failures_mean_nothing_changed() {
        let mut store = store();
        store.register("HP", VarType::String, json!("1"), false);
        let outcome = CommandParser::new()
            .parse(r#"<setVar name="HP.0" value="x"/>"#, &mut store);
        assert_eq!(outcome.logs[0].outcome, CommandOutcome::Failed);
        assert!(outcome.logs[0].detail.contains("target container is not an array"));
        assert!(!outcome.changed);
    }

    #[test]
    fn shape_conversion_is_reported_in_detail() {
        let mut store = store();
        store.register("x", VarType::Array, json!(["a"]), false);
        let outcome = CommandParser::new()
            .parse(r#"<setVar name="x.label" value="b"/>"#, &mut store);
        assert_eq!(outcome.logs[0].outcome, CommandOutcome::Updated);
        assert!(outcome.logs[0]
            .detail
            .ends_with("converted x from array to object"));
        assert_eq!(store.get_value("x"), Some(json!({"0": "a", "label": "b"})));
    }

    #[test]
    fn new_index_root_detail_has_no_conversion() {
        let mut store = store();
        let outcome = CommandParser::new()
            .parse(r#"<setVar name="bag.0" value="rope"/>"#, &mut store);
        assert_eq!(outcome.logs[0].detail, "registered as array, set to \"rope\"");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let mut store = store();
        let parser = CommandParser::new();
        let first = parser.parse(
            r#"Hi <setVar name="a" value="1">n</setVar>there <setVar name="b">bad</setVar>"#,
            &mut store,
        );
        let second = parser.parse(&first.clean_text, &mut store);
        assert_eq!(second.clean_text, first.clean_text);
        assert!(second.logs.is_empty());
        assert!(!second.changed);
    }

    #[test]
    fn entities_in_values_are_decoded() {
        let commands =
            scan_set_var_commands(r#"<setVar name="cmp" value="a &lt; b &amp;&amp; c"/>"#);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].value, "a < b && c");
        assert_eq!(commands[0].note, None);
    }

    #[test]
    fn scan_reports_spans_and_notes() {
        let text = r#"xx<setVar name=" spaced.path " value="v">why</setVar>"#;
        let commands = scan_set_var_commands(text);
        assert_eq!(commands[0].span, 2..text.len());
        assert_eq!(commands[0].name, "spaced.path");
        assert_eq!(commands[0].note.as_deref(), Some("why"));
    }
}
