//! SK-009: Trigger loading.
//!
//! Turns one trigger header and its section tree into an executable
//! [`Trigger`]. Every line is parsed even after an error so one pass reports
//! all problems. Warnings are held in a parse log and flushed together with
//! the errors; on success they are dropped (or logged, when asked to).

use super::executor::{
    Condition, Conditional, Else, Loop, Node, Section, SectionId, SectionKind, Trigger,
};
use super::matcher::{
    parse_condition, parse_event, parse_expression, parse_statement, BuildContext, ParseScope,
    Parsed, Statement,
};
use super::parser::SectionNode;
use super::pattern::TypeRequest;
use super::registry::Registry;
use super::types::{Diagnostic, ErrorQuality, Severity};
use thiserror::Error;

/// Everything reported while loading one trigger, in source order.
#[derive(Debug, Clone, Default, Error)]
#[error("{}", render(.0))]
pub struct Diagnostics(pub Vec<Diagnostic>);

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl Diagnostics {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Keep warnings of a successful load instead of dropping them.
    pub report_warnings: bool,
}

/// A loaded trigger and the warnings kept for it.
#[derive(Debug)]
pub struct LoadedTrigger {
    pub trigger: Trigger,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Default)]
struct ParseLog {
    entries: Vec<Diagnostic>,
    errors: usize,
}

impl ParseLog {
    fn error(&mut self, diagnostic: Diagnostic, line: usize) {
        self.errors += 1;
        self.entries.push(diagnostic.at_line(Some(line)));
    }

    fn warn(&mut self, message: impl Into<String>, line: usize) {
        self.entries
            .push(Diagnostic::warning(message).at_line(Some(line)));
    }

    fn absorb<T>(&mut self, parsed: Parsed<T>, line: usize) -> T {
        for w in parsed.warnings {
            self.entries.push(w.at_line(Some(line)));
        }
        parsed.value
    }
}

fn semantic(message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(ErrorQuality::Semantic, message)
}

/// Strip a case-insensitive `prefix` followed by the rest of the line.
fn keyword<'t>(text: &'t str, prefix: &str) -> Option<&'t str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| text[prefix.len()..].trim())
}

struct TreeBuilder<'r> {
    registry: &'r Registry,
    scope: ParseScope,
    log: ParseLog,
    next_id: usize,
}

impl TreeBuilder<'_> {
    fn section(&mut self, kind: SectionKind, nodes: &[SectionNode], line: usize) -> Section {
        let id = SectionId(self.next_id);
        self.next_id += 1;
        if nodes.is_empty() {
            self.log.warn("empty section", line);
        }
        self.scope.sections.push(kind);
        let mut children = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.node(node, &mut children);
        }
        self.scope.sections.pop();
        Section { id, kind, children }
    }

    fn node(&mut self, node: &SectionNode, children: &mut Vec<Node>) {
        let text = node.text.as_str();
        if !node.is_section {
            self.statement(node, children);
            return;
        }

        if let Some(rest) = keyword(text, "else if ") {
            let condition = self.condition(rest, node.line);
            let then = self.section(SectionKind::Conditional, &node.children, node.line);
            let Some(tail) = open_conditional(children) else {
                self.log.error(
                    semantic("'else if' has to be placed just after another 'if' or 'else if'"),
                    node.line,
                );
                return;
            };
            if let Some(condition) = condition {
                tail.otherwise = Some(Else::If(Box::new(Conditional {
                    condition,
                    then,
                    otherwise: None,
                    line: Some(node.line),
                })));
            }
        } else if text.eq_ignore_ascii_case("else") {
            let section = self.section(SectionKind::Conditional, &node.children, node.line);
            match open_conditional(children) {
                Some(tail) => tail.otherwise = Some(Else::Section(section)),
                None => self.log.error(
                    semantic("'else' has to be placed just after an 'if' or 'else if'"),
                    node.line,
                ),
            }
        } else if let Some(rest) = keyword(text, "if ") {
            let condition = self.condition(rest, node.line);
            let then = self.section(SectionKind::Conditional, &node.children, node.line);
            if let Some(condition) = condition {
                children.push(Node::Conditional(Conditional {
                    condition,
                    then,
                    otherwise: None,
                    line: Some(node.line),
                }));
            }
        } else if let Some(rest) = keyword(text, "loop ") {
            let object = self.registry.object();
            let ctx = BuildContext::new(self.registry, &self.scope);
            let source = match parse_expression(rest, &TypeRequest::plural(object), &ctx) {
                Ok(parsed) => Some(self.log.absorb(parsed, node.line)),
                Err(e) => {
                    self.log.error(e, node.line);
                    None
                }
            };
            let element = source.as_ref().map_or(object, |s| s.return_type());
            self.scope.loops.push(element);
            let body = self.section(SectionKind::Loop, &node.children, node.line);
            self.scope.loops.pop();
            if let Some(source) = source {
                children.push(Node::Loop(Loop {
                    source,
                    body,
                    line: Some(node.line),
                }));
            }
        } else {
            self.log.error(
                semantic(format!("can't understand this section: '{}'", text)),
                node.line,
            );
        }
    }

    fn condition(&mut self, text: &str, line: usize) -> Option<Box<dyn Condition>> {
        let ctx = BuildContext::new(self.registry, &self.scope);
        match parse_condition(text, &ctx) {
            Ok(parsed) => Some(self.log.absorb(parsed, line)),
            Err(e) => {
                self.log.error(e, line);
                None
            }
        }
    }

    fn statement(&mut self, node: &SectionNode, children: &mut Vec<Node>) {
        let text = node.text.as_str();
        if !node.children.is_empty() {
            self.log.error(
                semantic(format!(
                    "'{}' is followed by indented lines but is not a section (missing ':')",
                    text
                )),
                node.line,
            );
        }
        if text.eq_ignore_ascii_case("else")
            || ["if ", "else if ", "loop "]
                .iter()
                .any(|k| keyword(text, k).is_some())
        {
            self.log.error(
                semantic(format!("'{}' has to end with ':'", text)),
                node.line,
            );
            return;
        }

        let ctx = BuildContext::new(self.registry, &self.scope);
        match parse_statement(text, &ctx) {
            Ok(parsed) => {
                let line = Some(node.line);
                match self.log.absorb(parsed, node.line) {
                    Statement::Effect(effect) => children.push(Node::Effect { effect, line }),
                    Statement::Condition(condition) => {
                        children.push(Node::Condition { condition, line })
                    }
                }
            }
            Err(e) => self.log.error(e, node.line),
        }
    }
}

/// The else-if chain of the last child, if it can still take an `else`.
fn open_conditional(children: &mut [Node]) -> Option<&mut Conditional> {
    match children.last_mut() {
        Some(Node::Conditional(c)) => c.open_tail(),
        _ => None,
    }
}

/// Build a trigger from its header (`on <event>`) and body. Warnings of a
/// successful load are discarded.
pub fn load_trigger(
    registry: &Registry,
    header: &str,
    body: &[SectionNode],
    line: Option<usize>,
) -> Result<Trigger, Diagnostics> {
    load_trigger_with(registry, header, body, line, &LoadOptions::default()).map(|l| l.trigger)
}

pub fn load_trigger_with(
    registry: &Registry,
    header: &str,
    body: &[SectionNode],
    line: Option<usize>,
    options: &LoadOptions,
) -> Result<LoadedTrigger, Diagnostics> {
    let header = header.trim();
    let event_text = keyword(header, "on ").unwrap_or(header);
    let header_line = line.unwrap_or(0);

    let event = match parse_event(event_text, registry) {
        Ok(parsed) => parsed,
        Err(e) => return Err(Diagnostics(vec![e.at_line(line)])),
    };
    let mut log = ParseLog::default();
    let event = log.absorb(event, header_line);

    let mut builder = TreeBuilder {
        registry,
        scope: ParseScope::for_event(&event.event, event.values),
        log,
        next_id: 0,
    };
    let root = builder.section(SectionKind::Trigger, body, header_line);
    let TreeBuilder { log, next_id, .. } = builder;

    if log.errors > 0 {
        tracing::debug!(trigger = header, errors = log.errors, "trigger failed to load");
        return Err(Diagnostics(log.entries));
    }
    tracing::debug!(
        trigger = header,
        event = %event.event,
        sections = next_id,
        "trigger loaded"
    );
    let warnings = if options.report_warnings {
        log.entries
    } else {
        Vec::new()
    };
    Ok(LoadedTrigger {
        trigger: Trigger::new(header, event.event, event.filter, root, next_id, line),
        warnings,
    })
}
