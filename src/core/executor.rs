//! SK-008: Operation tree and interpreter.
//!
//! A trigger is built once at load time and walked once per matching event:
//! root section → statements, conditionals, loops. Stop flags live in the
//! per-walk [`Frame`], indexed by section id, so built trees stay immutable.
//! A section resets its own flag when it starts and checks it after every
//! child; exits only set flags and unwinding happens as each enclosing
//! section observes its flag.

use super::expr::Expr;
use super::registry::Registry;
use super::types::{event_key, Value};
use super::variables::{is_local_name, Variables};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Collaborator seams
// ============================================================================

/// Opaque per-occurrence event data supplied by the host.
pub trait EventContext {
    /// Name of the registered event this occurrence belongs to.
    fn event_name(&self) -> &str;

    /// Event value exposed under `key` (`event-<key>`).
    fn event_value(&self, _key: &str) -> Option<Value> {
        None
    }

    /// Deliver a broadcast message to the host.
    fn broadcast(&mut self, _message: &str) {}
}

/// Context with no values, for walks outside any host event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvent;

impl EventContext for NullEvent {
    fn event_name(&self) -> &str {
        ""
    }
}

/// Narrows which occurrences of an event fire a trigger.
pub trait EventFilter: Send + Sync {
    fn matches(&self, event: &dyn EventContext, registry: &Registry) -> bool;
}

pub trait Effect: Send + Sync {
    fn execute(&self, frame: &mut Frame<'_>) -> Result<(), RuntimeError>;

    fn describe(&self, registry: &Registry) -> String;
}

pub trait Condition: Send + Sync {
    fn check(&self, frame: &Frame<'_>) -> Result<bool, RuntimeError>;

    fn describe(&self, registry: &Registry) -> String;
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("'{expr}' can have more than one value here")]
    MultipleValues { expr: String },

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    Host(String),

    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Attach a source line unless one is already attached.
    pub fn at_line(self, line: Option<usize>) -> Self {
        match (line, self) {
            (_, located @ Self::AtLine { .. }) => located,
            (Some(line), err) => Self::AtLine {
                line,
                source: Box::new(err),
            },
            (None, err) => err,
        }
    }
}

// ============================================================================
// Tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Trigger,
    Conditional,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionId(pub usize);

/// What an exit effect stops, counted outward from the executing statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitScope {
    Trigger,
    Sections(usize),
    Loops(usize),
    Conditionals(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// A statement condition failed; the rest of the trigger is skipped.
    Halt,
}

pub struct Section {
    pub id: SectionId,
    pub kind: SectionKind,
    pub children: Vec<Node>,
}

pub enum Node {
    Effect {
        effect: Box<dyn Effect>,
        line: Option<usize>,
    },
    /// A condition on its own line guards everything after it.
    Condition {
        condition: Box<dyn Condition>,
        line: Option<usize>,
    },
    Conditional(Conditional),
    Loop(Loop),
}

pub struct Conditional {
    pub condition: Box<dyn Condition>,
    pub then: Section,
    pub otherwise: Option<Else>,
    pub line: Option<usize>,
}

pub enum Else {
    Section(Section),
    If(Box<Conditional>),
}

pub struct Loop {
    pub source: Expr,
    pub body: Section,
    pub line: Option<usize>,
}

impl Section {
    pub fn new(id: SectionId, kind: SectionKind) -> Self {
        Self {
            id,
            kind,
            children: Vec::new(),
        }
    }

    /// Run the children in order until one halts or this section is stopped.
    pub fn execute(&self, frame: &mut Frame<'_>) -> Result<Flow, RuntimeError> {
        frame.enter(self.id, self.kind);
        let result = self.run_children(frame);
        frame.leave();
        result
    }

    fn run_children(&self, frame: &mut Frame<'_>) -> Result<Flow, RuntimeError> {
        for child in &self.children {
            if child.execute(frame)? == Flow::Halt {
                return Ok(Flow::Halt);
            }
            if frame.is_stopped(self.id) {
                break;
            }
        }
        Ok(Flow::Continue)
    }
}

impl Node {
    pub fn execute(&self, frame: &mut Frame<'_>) -> Result<Flow, RuntimeError> {
        match self {
            Self::Effect { effect, line } => {
                effect.execute(frame).map_err(|e| e.at_line(*line))?;
                Ok(Flow::Continue)
            }
            Self::Condition { condition, line } => {
                if condition.check(frame).map_err(|e| e.at_line(*line))? {
                    Ok(Flow::Continue)
                } else {
                    Ok(Flow::Halt)
                }
            }
            Self::Conditional(c) => c.execute(frame),
            Self::Loop(l) => l.execute(frame),
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Effect { line, .. } | Self::Condition { line, .. } => *line,
            Self::Conditional(c) => c.line,
            Self::Loop(l) => l.line,
        }
    }
}

impl Conditional {
    /// Evaluate the condition once and run exactly one branch.
    pub fn execute(&self, frame: &mut Frame<'_>) -> Result<Flow, RuntimeError> {
        if self
            .condition
            .check(frame)
            .map_err(|e| e.at_line(self.line))?
        {
            return self.then.execute(frame);
        }
        match &self.otherwise {
            None => Ok(Flow::Continue),
            Some(Else::Section(section)) => section.execute(frame),
            Some(Else::If(next)) => next.execute(frame),
        }
    }

    /// Last conditional of the else-if chain, if it can still take an `else`.
    pub fn open_tail(&mut self) -> Option<&mut Conditional> {
        if self.otherwise.is_none() {
            return Some(self);
        }
        match &mut self.otherwise {
            Some(Else::If(next)) => next.open_tail(),
            _ => None,
        }
    }
}

impl Loop {
    pub fn execute(&self, frame: &mut Frame<'_>) -> Result<Flow, RuntimeError> {
        let values = self
            .source
            .evaluate_all(frame)
            .map_err(|e| e.at_line(self.line))?;
        for value in values {
            frame.loop_values.push(value);
            let flow = self.body.execute(frame);
            frame.loop_values.pop();
            if flow? == Flow::Halt {
                return Ok(Flow::Halt);
            }
            if frame.is_stopped(self.body.id) {
                break;
            }
        }
        Ok(Flow::Continue)
    }
}

/// A root section bound to one event.
pub struct Trigger {
    name: String,
    event: String,
    filter: Option<Box<dyn EventFilter>>,
    root: Section,
    sections: usize,
    line: Option<usize>,
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("event", &self.event)
            .field("filtered", &self.filter.is_some())
            .field("sections", &self.sections)
            .field("line", &self.line)
            .finish()
    }
}

impl Trigger {
    pub fn new(
        name: impl Into<String>,
        event: impl Into<String>,
        filter: Option<Box<dyn EventFilter>>,
        root: Section,
        sections: usize,
        line: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            event: event_key(&event.into()),
            filter,
            root,
            sections,
            line,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn root(&self) -> &Section {
        &self.root
    }

    /// Whether this trigger should run for `ctx`.
    pub fn accepts(&self, ctx: &dyn EventContext, registry: &Registry) -> bool {
        event_key(ctx.event_name()) == self.event
            && self
                .filter
                .as_ref()
                .is_none_or(|f| f.matches(ctx, registry))
    }

    /// Walk the tree once. Runtime failures are logged, never returned;
    /// the result only says whether the walk finished cleanly.
    pub fn execute(
        &self,
        registry: &Registry,
        globals: &mut Variables,
        ctx: &mut dyn EventContext,
    ) -> bool {
        let mut frame = Frame::new(registry, ctx, globals, self.sections);
        match self.root.execute(&mut frame) {
            Ok(flow) => {
                tracing::trace!(trigger = %self.name, ?flow, "trigger finished");
                true
            }
            Err(e) => {
                tracing::error!(
                    trigger = %self.name,
                    event = %self.event,
                    line = ?self.line,
                    "runtime error: {}",
                    e
                );
                false
            }
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// State of one tree walk. Created per event occurrence, discarded after.
pub struct Frame<'a> {
    registry: &'a Registry,
    event: &'a mut dyn EventContext,
    globals: &'a mut Variables,
    locals: Variables,
    loop_values: Vec<Value>,
    active: Vec<(SectionId, SectionKind)>,
    stopped: Vec<bool>,
}

impl<'a> Frame<'a> {
    pub fn new(
        registry: &'a Registry,
        event: &'a mut dyn EventContext,
        globals: &'a mut Variables,
        sections: usize,
    ) -> Self {
        Self {
            registry,
            event,
            globals,
            locals: Variables::default(),
            loop_values: Vec::new(),
            active: Vec::new(),
            stopped: vec![false; sections],
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn event(&self) -> &dyn EventContext {
        &*self.event
    }

    pub fn event_mut(&mut self) -> &mut dyn EventContext {
        &mut *self.event
    }

    /// Store holding `name`: walk-local for `_` names, global otherwise.
    pub fn variables(&self, name: &str) -> &Variables {
        if is_local_name(name) {
            &self.locals
        } else {
            &*self.globals
        }
    }

    pub fn variables_mut(&mut self, name: &str) -> &mut Variables {
        if is_local_name(name) {
            &mut self.locals
        } else {
            &mut *self.globals
        }
    }

    /// Current value of a loop: innermost for `None`, else the n-th loop
    /// counted from the outermost (1-based).
    pub fn loop_value(&self, nth: Option<usize>) -> Option<&Value> {
        match nth {
            None => self.loop_values.last(),
            Some(0) => None,
            Some(n) => self.loop_values.get(n - 1),
        }
    }

    pub fn is_stopped(&self, id: SectionId) -> bool {
        self.stopped.get(id.0).copied().unwrap_or(false)
    }

    pub fn stop(&mut self, id: SectionId) {
        if let Some(flag) = self.stopped.get_mut(id.0) {
            *flag = true;
        }
    }

    /// Stop the sections `scope` names plus every section nested inside them.
    pub fn exit(&mut self, scope: ExitScope) {
        let wanted = |kind: SectionKind| match scope {
            ExitScope::Trigger => true,
            ExitScope::Sections(_) => kind != SectionKind::Trigger,
            ExitScope::Loops(_) => kind == SectionKind::Loop,
            ExitScope::Conditionals(_) => kind == SectionKind::Conditional,
        };
        let count = match scope {
            ExitScope::Trigger => usize::MAX,
            ExitScope::Sections(n) | ExitScope::Loops(n) | ExitScope::Conditionals(n) => n,
        };

        let mut depth = 0;
        let mut seen = 0;
        for (index, (_, kind)) in self.active.iter().rev().enumerate() {
            if seen == count {
                break;
            }
            if wanted(*kind) {
                seen += 1;
                depth = index + 1;
            }
        }
        let ids: Vec<SectionId> = self.active.iter().rev().take(depth).map(|(id, _)| *id).collect();
        for id in ids {
            self.stop(id);
        }
    }

    fn enter(&mut self, id: SectionId, kind: SectionKind) {
        if let Some(flag) = self.stopped.get_mut(id.0) {
            *flag = false;
        }
        self.active.push((id, kind));
    }

    fn leave(&mut self) {
        self.active.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{RegistryBuilder, OBJECT};
    use crate::core::types::Datum;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Record(Log, &'static str);

    impl Effect for Record {
        fn execute(&self, _frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
            self.0.lock().unwrap().push(self.1.to_string());
            Ok(())
        }
        fn describe(&self, _registry: &Registry) -> String {
            format!("record {}", self.1)
        }
    }

    struct Exit(ExitScope);

    impl Effect for Exit {
        fn execute(&self, frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
            frame.exit(self.0);
            Ok(())
        }
        fn describe(&self, _registry: &Registry) -> String {
            "exit".into()
        }
    }

    struct Fail;

    impl Effect for Fail {
        fn execute(&self, _frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
            Err(RuntimeError::Host("boom".into()))
        }
        fn describe(&self, _registry: &Registry) -> String {
            "fail".into()
        }
    }

    struct Const(bool);

    impl Condition for Const {
        fn check(&self, _frame: &Frame<'_>) -> Result<bool, RuntimeError> {
            Ok(self.0)
        }
        fn describe(&self, _registry: &Registry) -> String {
            self.0.to_string()
        }
    }

    fn rec(log: &Log, tag: &'static str) -> Node {
        Node::Effect {
            effect: Box::new(Record(log.clone(), tag)),
            line: None,
        }
    }

    fn exit(scope: ExitScope) -> Node {
        Node::Effect {
            effect: Box::new(Exit(scope)),
            line: None,
        }
    }

    fn numbers(n: i64) -> Expr {
        Expr::Literal {
            ty: OBJECT,
            values: (1..=n).map(|i| Value::new(OBJECT, Datum::Int(i))).collect(),
            conjunctive: true,
            text: String::new(),
        }
    }

    fn section(id: usize, kind: SectionKind, children: Vec<Node>) -> Section {
        Section {
            id: SectionId(id),
            kind,
            children,
        }
    }

    fn run(trigger: &Trigger) -> bool {
        let reg = RegistryBuilder::new().freeze();
        let mut globals = Variables::default();
        let mut event = NullEvent;
        trigger.execute(&reg, &mut globals, &mut event)
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_sk008_exit_two_sections_from_loop_in_conditional() {
        let log: Log = Arc::default();
        let body = section(
            2,
            SectionKind::Loop,
            vec![rec(&log, "body"), exit(ExitScope::Sections(2)), rec(&log, "after-exit")],
        );
        let then = section(
            1,
            SectionKind::Conditional,
            vec![
                Node::Loop(Loop {
                    source: numbers(3),
                    body,
                    line: None,
                }),
                rec(&log, "after-loop"),
            ],
        );
        let root = section(
            0,
            SectionKind::Trigger,
            vec![
                Node::Conditional(Conditional {
                    condition: Box::new(Const(true)),
                    then,
                    otherwise: None,
                    line: None,
                }),
                rec(&log, "sibling"),
            ],
        );
        let trigger = Trigger::new("t", "test", None, root, 3, None);
        assert!(run(&trigger));
        assert_eq!(entries(&log), vec!["body", "sibling"]);
    }

    #[test]
    fn test_sk008_section_resets_stop_flag() {
        let log: Log = Arc::default();
        let reg = RegistryBuilder::new().freeze();
        let mut globals = Variables::default();
        let mut event = NullEvent;
        let mut frame = Frame::new(&reg, &mut event, &mut globals, 1);
        let s = section(0, SectionKind::Trigger, vec![rec(&log, "a"), rec(&log, "b")]);
        frame.stop(SectionId(0));
        assert!(frame.is_stopped(SectionId(0)));
        s.execute(&mut frame).unwrap();
        assert_eq!(entries(&log), vec!["a", "b"]);
        assert!(!frame.is_stopped(SectionId(0)));
    }

    #[test]
    fn test_sk008_exit_loop_stops_nested_conditional() {
        let log: Log = Arc::default();
        let inner = section(2, SectionKind::Conditional, vec![exit(ExitScope::Loops(1)), rec(&log, "x")]);
        let body = section(
            1,
            SectionKind::Loop,
            vec![
                rec(&log, "iter"),
                Node::Conditional(Conditional {
                    condition: Box::new(Const(true)),
                    then: inner,
                    otherwise: None,
                    line: None,
                }),
                rec(&log, "y"),
            ],
        );
        let root = section(
            0,
            SectionKind::Trigger,
            vec![
                Node::Loop(Loop {
                    source: numbers(5),
                    body,
                    line: None,
                }),
                rec(&log, "done"),
            ],
        );
        let trigger = Trigger::new("t", "test", None, root, 3, None);
        assert!(run(&trigger));
        assert_eq!(entries(&log), vec!["iter", "done"]);
    }

    #[test]
    fn test_sk008_exit_trigger() {
        let log: Log = Arc::default();
        let body = section(1, SectionKind::Loop, vec![rec(&log, "i"), exit(ExitScope::Trigger)]);
        let root = section(
            0,
            SectionKind::Trigger,
            vec![
                Node::Loop(Loop {
                    source: numbers(4),
                    body,
                    line: None,
                }),
                rec(&log, "never"),
            ],
        );
        let trigger = Trigger::new("t", "test", None, root, 2, None);
        assert!(run(&trigger));
        assert_eq!(entries(&log), vec!["i"]);
    }

    #[test]
    fn test_sk008_else_if_chain_runs_one_branch() {
        let log: Log = Arc::default();
        let chain = Conditional {
            condition: Box::new(Const(false)),
            then: section(1, SectionKind::Conditional, vec![rec(&log, "if")]),
            otherwise: Some(Else::If(Box::new(Conditional {
                condition: Box::new(Const(true)),
                then: section(2, SectionKind::Conditional, vec![rec(&log, "else-if")]),
                otherwise: Some(Else::Section(section(
                    3,
                    SectionKind::Conditional,
                    vec![rec(&log, "else")],
                ))),
                line: None,
            }))),
            line: None,
        };
        let root = section(0, SectionKind::Trigger, vec![Node::Conditional(chain)]);
        assert!(run(&Trigger::new("t", "test", None, root, 4, None)));
        assert_eq!(entries(&log), vec!["else-if"]);
    }

    #[test]
    fn test_sk008_statement_condition_halts_trigger() {
        let log: Log = Arc::default();
        let then = section(
            1,
            SectionKind::Conditional,
            vec![
                Node::Condition {
                    condition: Box::new(Const(false)),
                    line: Some(3),
                },
                rec(&log, "guarded"),
            ],
        );
        let root = section(
            0,
            SectionKind::Trigger,
            vec![
                Node::Conditional(Conditional {
                    condition: Box::new(Const(true)),
                    then,
                    otherwise: None,
                    line: None,
                }),
                rec(&log, "after"),
            ],
        );
        assert!(run(&Trigger::new("t", "test", None, root, 2, None)));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_sk008_event_names_fold_unicode_case() {
        let reg = RegistryBuilder::new().freeze();
        let trigger = Trigger::new(
            "on Ärger",
            "ÄRGER",
            None,
            section(0, SectionKind::Trigger, vec![]),
            1,
            None,
        );
        assert_eq!(trigger.event(), "ärger");
        let host = crate::core::engine::HostEvent::new("Ärger");
        assert!(trigger.accepts(&host, &reg));
        assert!(!trigger.accepts(&crate::core::engine::HostEvent::new("arger"), &reg));
    }

    #[test]
    fn test_sk008_runtime_error_contained() {
        let log: Log = Arc::default();
        let root = section(
            0,
            SectionKind::Trigger,
            vec![
                rec(&log, "before"),
                Node::Effect {
                    effect: Box::new(Fail),
                    line: Some(7),
                },
                rec(&log, "after"),
            ],
        );
        assert!(!run(&Trigger::new("t", "test", None, root, 1, None)));
        assert_eq!(entries(&log), vec!["before"]);
    }

    #[test]
    fn test_sk008_empty_loop_source() {
        let log: Log = Arc::default();
        let body = section(1, SectionKind::Loop, vec![rec(&log, "never")]);
        let root = section(
            0,
            SectionKind::Trigger,
            vec![Node::Loop(Loop {
                source: numbers(0),
                body,
                line: None,
            })],
        );
        assert!(run(&Trigger::new("t", "test", None, root, 2, None)));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_sk008_error_line_attached_once() {
        let e = RuntimeError::Host("x".into()).at_line(Some(4)).at_line(Some(9));
        assert_eq!(e.to_string(), "line 4: x");
        let plain = RuntimeError::Host("y".into()).at_line(None);
        assert_eq!(plain.to_string(), "y");
    }
}
