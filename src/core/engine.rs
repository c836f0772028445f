//! SK-012: Engine: loaded triggers, global variables and event dispatch.
//!
//! A script is loaded all-or-nothing: every trigger in it must build before
//! any is installed. Newly installed triggers then see the `load` event.

use super::executor::{EventContext, Trigger};
use super::loader::{load_trigger_with, Diagnostics, LoadOptions};
use super::parser::read_script;
use super::registry::Registry;
use super::types::{event_key, Diagnostic, ErrorQuality, Value};
use super::variables::Variables;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

pub const LOAD_EVENT: &str = "load";
pub const UNLOAD_EVENT: &str = "unload";

/// Event occurrence built by the host (or the CLI): a name, keyed values
/// and the broadcast messages the walk produced.
#[derive(Debug, Clone, Default)]
pub struct HostEvent {
    name: String,
    values: IndexMap<String, Value>,
    output: Vec<String>,
}

impl HostEvent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.trim().to_lowercase(), value);
        self
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn into_output(self) -> Vec<String> {
        self.output
    }
}

impl EventContext for HostEvent {
    fn event_name(&self) -> &str {
        &self.name
    }

    fn event_value(&self, key: &str) -> Option<Value> {
        self.values.get(&key.trim().to_lowercase()).cloned()
    }

    fn broadcast(&mut self, message: &str) {
        self.output.push(message.to_string());
    }
}

/// Outcome of a successful script load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub triggers: usize,
    /// Kept only when warning reporting is on.
    pub warnings: Vec<Diagnostic>,
    /// Broadcasts of the `load` triggers.
    pub output: Vec<String>,
}

pub struct Engine {
    registry: Arc<Registry>,
    /// Triggers by lowercase event name, in load order.
    triggers: IndexMap<String, Vec<Trigger>>,
    globals: Variables,
    options: LoadOptions,
}

impl Engine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            triggers: IndexMap::new(),
            globals: Variables::default(),
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn globals(&self) -> &Variables {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Variables {
        &mut self.globals
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.values().map(Vec::len).sum()
    }

    pub fn triggers_for(&self, event: &str) -> &[Trigger] {
        self.triggers
            .get(&event_key(event))
            .map_or(&[], Vec::as_slice)
    }

    /// Build every trigger of a script without installing any.
    pub fn compile(&self, source: &str) -> Result<(Vec<Trigger>, Vec<Diagnostic>), Diagnostics> {
        let mut triggers = Vec::new();
        let mut warnings = Vec::new();
        let mut problems = Vec::new();

        let roots = read_script(source).map_err(Diagnostics)?;
        for node in roots {
            if !node.is_section {
                problems.push(
                    Diagnostic::error(
                        ErrorQuality::Semantic,
                        format!(
                            "can't understand this line: '{}' (a trigger starts with 'on <event>:')",
                            node.text
                        ),
                    )
                    .at_line(Some(node.line)),
                );
                continue;
            }
            match load_trigger_with(
                &self.registry,
                &node.text,
                &node.children,
                Some(node.line),
                &self.options,
            ) {
                Ok(loaded) => {
                    warnings.extend(loaded.warnings);
                    triggers.push(loaded.trigger);
                }
                Err(diagnostics) => problems.extend(diagnostics.0),
            }
        }

        if problems.is_empty() {
            Ok((triggers, warnings))
        } else {
            Err(Diagnostics(problems))
        }
    }

    /// Load a script: all triggers or none. Runs the new `load` triggers.
    pub fn load_script(&mut self, source: &str) -> Result<LoadReport, Diagnostics> {
        let (triggers, warnings) = self.compile(source)?;
        for w in &warnings {
            tracing::warn!(line = ?w.line, "{}", w.message);
        }

        let mut ctx = HostEvent::new(LOAD_EVENT);
        for trigger in &triggers {
            if trigger.accepts(&ctx, &self.registry) {
                trigger.execute(&self.registry, &mut self.globals, &mut ctx);
            }
        }

        let count = triggers.len();
        for trigger in triggers {
            self.triggers
                .entry(trigger.event().to_string())
                .or_default()
                .push(trigger);
        }
        tracing::info!(triggers = count, total = self.trigger_count(), "script loaded");
        Ok(LoadReport {
            triggers: count,
            warnings,
            output: ctx.into_output(),
        })
    }

    /// Run every trigger bound to the context's event. Each trigger is
    /// contained on its own; returns how many ran.
    pub fn fire(&mut self, ctx: &mut dyn EventContext) -> usize {
        let Some(triggers) = self.triggers.get(&event_key(ctx.event_name())) else {
            tracing::debug!(event = ctx.event_name(), "no triggers");
            return 0;
        };
        let mut ran = 0;
        for trigger in triggers {
            if trigger.accepts(&*ctx, &self.registry) {
                trigger.execute(&self.registry, &mut self.globals, ctx);
                ran += 1;
            }
        }
        tracing::debug!(event = ctx.event_name(), ran, "event fired");
        ran
    }

    /// Fire `unload` and drop every trigger. Returns the broadcasts.
    pub fn unload_all(&mut self) -> Vec<String> {
        let mut ctx = HostEvent::new(UNLOAD_EVENT);
        self.fire(&mut ctx);
        self.triggers.clear();
        ctx.into_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::{Effect, EventFilter, Frame, RuntimeError};
    use crate::core::registry::{RegistryBuilder, TypeSpec};
    use crate::core::types::Datum;

    struct Say(String);

    impl Effect for Say {
        fn execute(&self, frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
            if self.0 == "crash" {
                return Err(RuntimeError::Host("crashed".into()));
            }
            frame.event_mut().broadcast(&self.0);
            Ok(())
        }
        fn describe(&self, _registry: &Registry) -> String {
            format!("say {}", self.0)
        }
    }

    struct Count;

    impl Effect for Count {
        fn execute(&self, frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
            let ty = frame.registry().object();
            frame
                .variables_mut("count")
                .add("count", &[Value::new(ty, Datum::Int(1))]);
            Ok(())
        }
        fn describe(&self, _registry: &Registry) -> String {
            "count".into()
        }
    }

    struct Only(i64);

    impl EventFilter for Only {
        fn matches(&self, event: &dyn EventContext, _registry: &Registry) -> bool {
            event
                .event_value("n")
                .is_some_and(|v| v.datum() == &Datum::Int(self.0))
        }
    }

    fn engine() -> Engine {
        let mut b = RegistryBuilder::new();
        let number = b
            .register_type(TypeSpec::new("number").parser(|s| s.parse().ok().map(Datum::Int)))
            .unwrap();
        b.register_event(LOAD_EVENT, &["load"], &[], |_, _| Ok(None))
            .unwrap();
        b.register_event(UNLOAD_EVENT, &["unload"], &[], |_, _| Ok(None))
            .unwrap();
        b.register_event("ping", &["ping [<\\d+>]"], &[("n", number)], |op, _| {
            Ok(op.regex(0).and_then(|c| c.text.parse().ok()).map(|n| {
                Box::new(Only(n)) as Box<dyn EventFilter>
            }))
        })
        .unwrap();
        b.register_effect("say", &["say <\\w+>"], |op, _| {
            let word = op.regex(0).map(|c| c.text.clone()).unwrap_or_default();
            Ok(Box::new(Say(word)) as Box<dyn Effect>)
        })
        .unwrap();
        b.register_effect("count", &["count"], |_, _| Ok(Box::new(Count) as Box<dyn Effect>))
            .unwrap();
        Engine::new(Arc::new(b.freeze()))
    }

    #[test]
    fn test_sk012_load_runs_load_triggers() {
        let mut engine = engine();
        let report = engine
            .load_script("on load:\n  say hello\non ping:\n  say pong\n")
            .unwrap();
        assert_eq!(report.triggers, 2);
        assert_eq!(report.output, vec!["hello"]);
        assert_eq!(engine.triggers_for("PING").len(), 1);
    }

    #[test]
    fn test_sk012_all_or_nothing() {
        let mut engine = engine();
        let err = engine
            .load_script("on load:\n  say hi\non ping:\n  dance\n")
            .err()
            .unwrap();
        assert_eq!(err.errors().count(), 1);
        assert_eq!(engine.trigger_count(), 0);

        let err = engine.load_script("say hi\n").err().unwrap();
        assert!(err.to_string().contains("a trigger starts with 'on <event>:'"));

        let err = engine
            .load_script("on ping:\n    say a\n  say b\non load:\n    say c\n")
            .err()
            .unwrap();
        let lines: Vec<Option<usize>> = err.errors().map(|d| d.line).collect();
        assert_eq!(lines, vec![Some(3)]);
        assert_eq!(engine.trigger_count(), 0);
    }

    #[test]
    fn test_sk012_fire_with_filter_and_containment() {
        let mut engine = engine();
        engine
            .load_script("on ping:\n  say crash\non ping:\n  say any\non ping 2:\n  say two\n")
            .unwrap();
        let mut ctx = HostEvent::new("ping").with_value("n", Value::new(engine.registry().object(), Datum::Int(2)));
        assert_eq!(engine.fire(&mut ctx), 3);
        assert_eq!(ctx.output(), &["any".to_string(), "two".to_string()]);

        let mut other = HostEvent::new("ping");
        assert_eq!(engine.fire(&mut other), 2);
        assert_eq!(engine.fire(&mut HostEvent::new("nothing")), 0);
    }

    #[test]
    fn test_sk012_globals_persist_and_unload() {
        let mut engine = engine();
        engine
            .load_script("on ping:\n  count\non unload:\n  say bye\n")
            .unwrap();
        engine.fire(&mut HostEvent::new("ping"));
        engine.fire(&mut HostEvent::new("ping"));
        assert_eq!(engine.globals().get("count").len(), 2);
        assert_eq!(engine.unload_all(), vec!["bye"]);
        assert_eq!(engine.trigger_count(), 0);
    }

    #[test]
    fn test_sk012_warnings_reported_when_enabled() {
        let mut engine = engine().with_options(LoadOptions {
            report_warnings: true,
        });
        let report = engine.load_script("on ping:\n").unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].line, Some(1));
    }
}
