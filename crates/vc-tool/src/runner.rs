use std::path::Path;

use vc_api::{VarEngine, VarEngineOptions};
use vc_core::{VarCommandError, VarType};
use vc_runtime::{MacroContext, ScopeQueryService};

use crate::source::read_test_case;
use crate::{ExpectedEvent, StepAction, TestCase, VcToolError};

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub observed_events: Vec<ExpectedEvent>,
    pub steps: usize,
}

pub fn run_case(case: &TestCase) -> Result<RunReport, VcToolError> {
    let mut engine = VarEngine::new(VarEngineOptions::default())?;
    for (name, template) in &case.macros {
        let template = template.clone();
        engine.register_dynamic_macro(name, move |params, context| {
            let text = fill_template(&template, &params, &context);
            async move { Ok::<_, VarCommandError>(text) }
        });
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(VcToolError::Runtime)?;

    let mut observed_events = Vec::with_capacity(case.steps.len());
    for (step_index, step) in case.steps.iter().enumerate() {
        let scope_id = step.scope.as_deref().unwrap_or(&case.scope);
        let event = match &step.action {
            StepAction::Apply { text } => {
                let outcome = engine.apply_text(scope_id, text);
                ExpectedEvent::Applied {
                    clean_text: outcome.clean_text,
                    changed: outcome.changed,
                    outcomes: outcome
                        .logs
                        .iter()
                        .map(|entry| entry.outcome.name().to_string())
                        .collect(),
                }
            }
            StepAction::Render { text } => {
                let context = MacroContext::for_scope(scope_id);
                let text = runtime.block_on(engine.resolve_macros(scope_id, text, &context));
                ExpectedEvent::Rendered { text }
            }
            StepAction::Query { path } => ExpectedEvent::Value {
                value: engine.query(scope_id, path),
            },
            StepAction::Register {
                name,
                type_name,
                value,
                hidden,
            } => {
                let var_type =
                    VarType::parse(type_name).ok_or_else(|| VcToolError::UnknownType {
                        step_index,
                        type_name: type_name.clone(),
                    })?;
                let initial = value.clone().unwrap_or_else(|| var_type.default_value());
                let entry = engine.register_variable(scope_id, name, var_type, initial, *hidden)?;
                ExpectedEvent::Registered {
                    type_name: entry.var_type.name().to_string(),
                    value: entry.value,
                }
            }
        };
        observed_events.push(event);
    }

    Ok(RunReport {
        steps: observed_events.len(),
        observed_events,
    })
}

fn fill_template(template: &str, params: &[String], context: &MacroContext) -> String {
    let mut text = template.replace("$scope", &context.scope_id);
    // Highest index first so `$1` never eats the prefix of `$10`.
    for (index, param) in params.iter().enumerate().rev() {
        text = text.replace(&format!("${}", index + 1), param);
    }
    text
}

pub fn assert_case(case_path: &Path) -> Result<(), VcToolError> {
    let case = read_test_case(case_path)?;
    let report = run_case(&case)?;

    if report.observed_events.len() != case.expected_events.len() {
        let observed = serde_json::to_string_pretty(&report.observed_events)
            .map_err(VcToolError::EventSerialize)?;
        return Err(VcToolError::EventCountMismatch {
            expected: case.expected_events.len(),
            actual: report.observed_events.len(),
            observed,
        });
    }

    for (index, (expected, actual)) in case
        .expected_events
        .iter()
        .zip(report.observed_events.iter())
        .enumerate()
    {
        if expected != actual {
            let expected = serde_json::to_string(expected).map_err(VcToolError::EventSerialize)?;
            let actual = serde_json::to_string(actual).map_err(VcToolError::EventSerialize)?;
            return Err(VcToolError::EventMismatch {
                index,
                expected,
                actual,
            });
        }
    }

    Ok(())
}
