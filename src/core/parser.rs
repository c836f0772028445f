//! SK-010: Script reading and engine configuration.
//!
//! Scripts are indentation-structured: a line ending in `:` opens a section
//! and the more-indented lines below it are its children. `#` starts a
//! comment outside quotes, `##` is a literal `#`. A tab counts as four
//! spaces.
//!
//! The optional skein.yaml configures logging, warning reporting and the
//! host events scripts can bind to. Validation reports:
//! - Event names must be non-empty and unique
//! - Every event needs at least one pattern
//! - Event value types must be registered

use super::registry::TypeTable;
use super::types::{Diagnostic, ErrorQuality};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Script source
// ============================================================================

/// One non-blank script line and the lines nested under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    /// 1-based source line.
    pub line: usize,
    /// Line text without comment, indentation or the section colon.
    pub text: String,
    pub is_section: bool,
    pub children: Vec<SectionNode>,
}

/// Cut a trailing comment; `##` collapses to `#`.
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                out.push(c);
            }
            '#' if !quoted => {
                if chars.peek() == Some(&'#') {
                    chars.next();
                    out.push('#');
                } else {
                    break;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn indentation(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Build the section tree of a script. A line dedented to a level no open
/// section sits at is reported with its line number.
pub fn read_script(source: &str) -> Result<Vec<SectionNode>, Vec<Diagnostic>> {
    let mut roots: Vec<SectionNode> = Vec::new();
    // open ancestors of the next line: (indent, node)
    let mut stack: Vec<(usize, SectionNode)> = Vec::new();
    let mut problems = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let stripped = strip_comment(raw);
        let text = stripped.trim();
        if text.is_empty() {
            continue;
        }
        let indent = indentation(&stripped);
        let (text, is_section) = match text.strip_suffix(':') {
            Some(head) => (head.trim_end().to_string(), true),
            None => (text.to_string(), false),
        };
        let node = SectionNode {
            line: index + 1,
            text,
            is_section,
            children: Vec::new(),
        };

        let mut closed = None;
        while stack.last().is_some_and(|(level, _)| *level >= indent) {
            closed = stack.last().map(|(level, _)| *level);
            close_top(&mut stack, &mut roots);
        }
        if let Some(level) = closed {
            if level != indent && !stack.is_empty() {
                problems.push(
                    Diagnostic::error(
                        ErrorQuality::Semantic,
                        format!(
                            "inconsistent indentation: indented by {} but the lines above use {}",
                            indent, level
                        ),
                    )
                    .at_line(Some(node.line)),
                );
            }
        }
        stack.push((indent, node));
    }
    while !stack.is_empty() {
        close_top(&mut stack, &mut roots);
    }
    if problems.is_empty() {
        Ok(roots)
    } else {
        Err(problems)
    }
}

fn close_top(stack: &mut Vec<(usize, SectionNode)>, roots: &mut Vec<SectionNode>) {
    if let Some((_, node)) = stack.pop() {
        match stack.last_mut() {
            Some((_, parent)) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}

/// Read a script file from disk.
pub fn read_script_file(path: &Path) -> Result<Vec<SectionNode>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    read_script(&content).map_err(|problems| {
        let lines: Vec<String> = problems.iter().map(ToString::to_string).collect();
        format!("{}: {}", path.display(), lines.join("; "))
    })
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

/// Top-level skein.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Filter directive, e.g. `skein=debug`.
    #[serde(default)]
    pub log: Option<String>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Report parse warnings.
    #[serde(default = "default_true")]
    pub warnings: bool,

    #[serde(default)]
    pub events: Vec<EventDecl>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log: None,
            log_format: LogFormat::default(),
            warnings: true,
            events: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A host event scripts can bind to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventDecl {
    pub name: String,
    pub patterns: Vec<String>,
    /// `event-<key>` values the host supplies, by type name.
    #[serde(default)]
    pub values: IndexMap<String, String>,
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a skein.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<EngineConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a skein.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<EngineConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config against the registered types. Returns a list
/// of errors (empty = valid).
pub fn validate_config(config: &EngineConfig, types: &TypeTable) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = FxHashSet::default();

    for event in &config.events {
        let name = event.name.trim().to_lowercase();
        if name.is_empty() {
            errors.push(ValidationError {
                message: "event name must not be empty".to_string(),
            });
            continue;
        }
        if !seen.insert(name) {
            errors.push(ValidationError {
                message: format!("event '{}' is declared more than once", event.name),
            });
        }
        if event.patterns.iter().all(|p| p.trim().is_empty()) {
            errors.push(ValidationError {
                message: format!("event '{}' has no patterns", event.name),
            });
        }
        for (key, type_name) in &event.values {
            if types.lookup(type_name).is_none() {
                errors.push(ValidationError {
                    message: format!(
                        "event '{}' value '{}' has unknown type '{}'",
                        event.name, key, type_name
                    ),
                });
            }
        }
    }

    errors
}
