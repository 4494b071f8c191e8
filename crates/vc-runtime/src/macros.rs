use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use vc_core::{value_to_text, VarCommandError};

use crate::store::VariableStore;

pub const DEFAULT_MAX_MACRO_DEPTH: usize = 5;

/// Side inputs handed to dynamic macros, such as which character the text is
/// being prepared for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroContext {
    pub scope_id: String,
    pub attributes: BTreeMap<String, String>,
}

impl MacroContext {
    pub fn for_scope(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait DynamicMacro: Send + Sync {
    async fn resolve(
        &self,
        params: &[String],
        context: &MacroContext,
    ) -> Result<String, VarCommandError>;
}

struct FnMacro<F>(F);

#[async_trait]
impl<F, Fut> DynamicMacro for FnMacro<F>
where
    F: Fn(Vec<String>, MacroContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, VarCommandError>> + Send + 'static,
{
    async fn resolve(
        &self,
        params: &[String],
        context: &MacroContext,
    ) -> Result<String, VarCommandError> {
        (self.0)(params.to_vec(), context.clone()).await
    }
}

/// Named context-dependent macros. Probed before any store lookup.
#[derive(Clone, Default)]
pub struct DynamicMacroRegistry {
    resolvers: BTreeMap<String, Arc<dyn DynamicMacro>>,
}

impl DynamicMacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, resolver: Arc<dyn DynamicMacro>) {
        self.resolvers.insert(name.into(), resolver);
    }

    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, resolve: F)
    where
        F: Fn(Vec<String>, MacroContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, VarCommandError>> + Send + 'static,
    {
        self.register(name, Arc::new(FnMacro(resolve)));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DynamicMacro>> {
        self.resolvers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resolvers.keys().map(String::as_str)
    }
}

impl fmt::Debug for DynamicMacroRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMacroRegistry")
            .field("names", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MacroCall<'a> {
    name: &'a str,
    path: &'a str,
    params: Vec<String>,
}

fn parse_macro_body(body: &str) -> Option<MacroCall<'_>> {
    let body = body.trim();
    let (head, params) = match body.split_once(':') {
        Some((head, rest)) => (
            head.trim(),
            rest.split(':').map(|param| param.trim().to_string()).collect(),
        ),
        None => (body, Vec::new()),
    };
    let name = head.split('.').next().unwrap_or_default().trim();
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return None;
    }
    Some(MacroCall {
        name,
        path: head,
        params,
    })
}

struct MacroScan {
    innermost: Vec<Range<usize>>,
    unterminated: Vec<usize>,
}

fn scan_macros(text: &str) -> MacroScan {
    struct Open {
        start: usize,
        is_macro: bool,
        holds_macro: bool,
    }

    let bytes = text.as_bytes();
    let mut stack: Vec<Open> = Vec::new();
    let mut innermost = Vec::new();
    let mut index = 0usize;
    while index < bytes.len() {
        match bytes[index] {
            b'$' if bytes.get(index + 1) == Some(&b'{') => {
                stack.push(Open {
                    start: index,
                    is_macro: true,
                    holds_macro: false,
                });
                index += 2;
                continue;
            }
            b'{' => stack.push(Open {
                start: index,
                is_macro: false,
                holds_macro: false,
            }),
            b'}' => {
                if let Some(open) = stack.pop() {
                    if open.is_macro && !open.holds_macro {
                        innermost.push(open.start..index + 1);
                    }
                    if open.is_macro || open.holds_macro {
                        if let Some(parent) = stack.last_mut() {
                            parent.holds_macro = true;
                        }
                    }
                }
            }
            _ => {}
        }
        index += 1;
    }

    MacroScan {
        innermost,
        unterminated: stack
            .into_iter()
            .filter(|open| open.is_macro)
            .map(|open| open.start)
            .collect(),
    }
}

/// Spans of `${...}` occurrences whose body holds no further macro, in text
/// order. Plain braces inside a body are balanced; unterminated openers are
/// left alone.
pub fn find_innermost_macros(text: &str) -> Vec<Range<usize>> {
    scan_macros(text).innermost
}

/// Removes the `${` of openers that never close, keeping the text after them.
fn strip_unterminated_openers(text: String) -> String {
    let unterminated = scan_macros(&text).unterminated;
    if unterminated.is_empty() {
        return text;
    }
    let mut output = String::with_capacity(text.len());
    let mut last_index = 0usize;
    for start in unterminated {
        output.push_str(&text[last_index..start]);
        last_index = start + 2;
    }
    output.push_str(&text[last_index..]);
    output
}

/// Expands `${...}` references against one store plus the dynamic registry.
#[derive(Debug, Clone)]
pub struct MacroResolver {
    registry: DynamicMacroRegistry,
    max_depth: usize,
}

impl Default for MacroResolver {
    fn default() -> Self {
        Self::new(DynamicMacroRegistry::default(), DEFAULT_MAX_MACRO_DEPTH)
    }
}

impl MacroResolver {
    pub fn new(registry: DynamicMacroRegistry, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
        }
    }

    pub fn registry(&self) -> &DynamicMacroRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DynamicMacroRegistry {
        &mut self.registry
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Each pass replaces every innermost macro and rescans the whole result,
    /// so text produced by a substitution is expanded on the next pass. After
    /// `max_depth` passes the text is returned as it stands. A `${` that never
    /// closes is dropped from the result.
    pub async fn resolve(
        &self,
        text: &str,
        store: &VariableStore,
        context: &MacroContext,
    ) -> String {
        let mut current = text.to_string();
        for depth in 0..self.max_depth {
            let spans = find_innermost_macros(&current);
            if spans.is_empty() {
                return strip_unterminated_openers(current);
            }

            let mut output = String::with_capacity(current.len());
            let mut last_index = 0usize;
            for span in spans {
                output.push_str(&current[last_index..span.start]);
                let body = &current[span.start + 2..span.end - 1];
                output.push_str(&self.expand(body, store, context, depth).await);
                last_index = span.end;
            }
            output.push_str(&current[last_index..]);
            current = output;
        }

        if !find_innermost_macros(&current).is_empty() {
            warn!(
                scope = %store.scope_id(),
                max_depth = self.max_depth,
                "macro expansion hit the recursion limit, returning partial text"
            );
        }
        strip_unterminated_openers(current)
    }

    async fn expand(
        &self,
        body: &str,
        store: &VariableStore,
        context: &MacroContext,
        depth: usize,
    ) -> String {
        let Some(call) = parse_macro_body(body) else {
            debug!(scope = %store.scope_id(), body = %body, depth, "malformed macro");
            return String::new();
        };

        if let Some(resolver) = self.registry.get(call.name) {
            return match resolver.resolve(&call.params, context).await {
                Ok(text) => text,
                Err(error) => {
                    warn!(macro_name = %call.name, %error, "dynamic macro failed");
                    String::new()
                }
            };
        }

        if !call.params.is_empty() {
            debug!(macro_name = %call.name, depth, "no dynamic macro registered under this name");
            return String::new();
        }

        match store.lookup(call.path) {
            Some(value) => value_to_text(value),
            None => {
                debug!(scope = %store.scope_id(), path = %call.path, depth, "unresolvable macro");
                String::new()
            }
        }
    }
}
