//! SK-006: Syntax matcher.
//!
//! Recursive backtracking over a compiled [`Pattern`] with a pattern cursor
//! and an input cursor. Ordered choice throughout: the first alternative,
//! the first (shortest) placeholder span and the first registered entry that
//! succeed win. Failures never abort the search; the single best diagnostic
//! is threaded through the recursion in a [`BestError`] and only surfaces
//! when every candidate fails.

use super::executor::{Condition, Effect, EventFilter, SectionKind};
use super::expr::{EventDefault, Expr};
use super::pattern::{GroupKind, Pattern, Token, TypeRequest};
use super::registry::{Registry, SyntaxEntry};
use super::types::{with_article, Datum, Diagnostic, ErrorQuality, TypeId, Value};

/// Sub-expression nesting limit.
pub const MAX_DEPTH: usize = 32;

// ============================================================================
// Parse scope and results
// ============================================================================

/// Where in a trigger a line is being parsed.
#[derive(Debug, Clone, Default)]
pub struct ParseScope {
    pub event: Option<String>,
    pub event_values: Vec<(String, TypeId)>,
    /// Enclosing sections, outermost first.
    pub sections: Vec<SectionKind>,
    /// Element types of the enclosing loops, outermost first.
    pub loops: Vec<TypeId>,
}

impl ParseScope {
    pub fn for_event(event: &str, values: Vec<(String, TypeId)>) -> Self {
        Self {
            event: Some(event.to_string()),
            event_values: values,
            sections: Vec::new(),
            loops: Vec::new(),
        }
    }

    pub fn count(&self, kind: SectionKind) -> usize {
        self.sections.iter().filter(|k| **k == kind).count()
    }

    /// Enclosing sections below the trigger root.
    pub fn nested_sections(&self) -> usize {
        self.sections
            .iter()
            .filter(|k| **k != SectionKind::Trigger)
            .count()
    }

    pub fn event_value(&self, key: &str) -> Option<TypeId> {
        let key = key.trim().to_lowercase();
        self.event_values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, t)| *t)
    }
}

/// What constructors see besides the match itself.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub registry: &'a Registry,
    pub scope: &'a ParseScope,
}

impl<'a> BuildContext<'a> {
    pub fn new(registry: &'a Registry, scope: &'a ParseScope) -> Self {
        Self { registry, scope }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexCapture {
    pub text: String,
    pub groups: Vec<Option<String>>,
}

/// A successful match, handed to the entry's constructor.
#[derive(Debug)]
pub struct ParsedOperation {
    text: String,
    pattern_index: usize,
    mark: i32,
    exprs: Vec<Option<Expr>>,
    spans: Vec<Option<String>>,
    alternatives: Vec<Option<usize>>,
    regexes: Vec<Option<RegexCapture>>,
}

impl ParsedOperation {
    /// The matched input line.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Which of the entry's patterns matched.
    pub fn pattern_index(&self) -> usize {
        self.pattern_index
    }

    /// XOR of the marks of every taken alternative.
    pub fn mark(&self) -> i32 {
        self.mark
    }

    /// Placeholder count of the matched pattern.
    pub fn slot_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn expr(&self, slot: usize) -> Option<&Expr> {
        self.exprs.get(slot).and_then(Option::as_ref)
    }

    pub fn take_expr(&mut self, slot: usize) -> Option<Expr> {
        self.exprs.get_mut(slot).and_then(Option::take)
    }

    /// Raw input consumed by a placeholder (`None` when omitted).
    pub fn span(&self, slot: usize) -> Option<&str> {
        self.spans.get(slot).and_then(|s| s.as_deref())
    }

    /// Alternative taken in the n-th group (`None` when an optional was skipped).
    pub fn alternative(&self, group: usize) -> Option<usize> {
        self.alternatives.get(group).copied().flatten()
    }

    pub fn regex(&self, slot: usize) -> Option<&RegexCapture> {
        self.regexes.get(slot).and_then(Option::as_ref)
    }
}

/// A parse result with the warnings gathered while producing it.
#[derive(Debug)]
pub struct Parsed<T> {
    pub value: T,
    pub warnings: Vec<Diagnostic>,
}

impl<T> Parsed<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        Parsed {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

/// Best-quality diagnostic seen so far in one parse attempt.
#[derive(Debug, Clone, Default)]
pub struct BestError {
    quality: ErrorQuality,
    message: Option<String>,
}

impl BestError {
    /// Keep `message` only if it ranks strictly above the current one.
    pub fn record(&mut self, quality: ErrorQuality, message: impl Into<String>) {
        if quality > self.quality {
            self.quality = quality;
            self.message = Some(message.into());
        }
    }

    pub fn quality(&self) -> ErrorQuality {
        self.quality
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The recorded error, or the generic `fallback` when nothing ranked.
    pub fn into_diagnostic(self, fallback: impl FnOnce() -> String) -> Diagnostic {
        match self.message {
            Some(message) if self.quality > ErrorQuality::None => {
                Diagnostic::error(self.quality, message)
            }
            _ => Diagnostic::error(ErrorQuality::None, fallback()),
        }
    }
}

// ============================================================================
// Pattern matching
// ============================================================================

#[derive(Clone)]
struct Captures {
    exprs: Vec<Option<Expr>>,
    spans: Vec<Option<String>>,
    alternatives: Vec<Option<usize>>,
    regexes: Vec<Option<RegexCapture>>,
    mark: i32,
    warnings: Vec<Diagnostic>,
}

impl Captures {
    fn new(pattern: &Pattern) -> Self {
        Self {
            exprs: vec![None; pattern.placeholder_count()],
            spans: vec![None; pattern.placeholder_count()],
            alternatives: vec![None; pattern.group_count()],
            regexes: vec![None; pattern.regex_count()],
            mark: 0,
            warnings: Vec::new(),
        }
    }
}

struct PatternMatch<'m> {
    pattern: &'m Pattern,
    input: &'m [char],
    ctx: &'m BuildContext<'m>,
    depth: usize,
}

fn chars_match(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// End of the smallest span starting at `i` that does not split a quoted
/// string or a `{…}`/`(…)` group.
fn next_boundary(input: &[char], i: usize) -> usize {
    let n = input.len();
    match input.get(i) {
        Some('"') => {
            let mut j = i + 1;
            while j < n {
                if input[j] == '"' {
                    if input.get(j + 1) == Some(&'"') {
                        j += 2;
                        continue;
                    }
                    return j + 1;
                }
                j += 1;
            }
            n
        }
        Some('{') | Some('(') => {
            let mut stack = Vec::new();
            let mut j = i;
            while j < n {
                match input[j] {
                    '"' => {
                        j = next_boundary(input, j);
                        continue;
                    }
                    '{' => stack.push('}'),
                    '(' => stack.push(')'),
                    c @ ('}' | ')') => {
                        if stack.last() == Some(&c) {
                            stack.pop();
                        }
                        if stack.is_empty() {
                            return j + 1;
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            n
        }
        _ => (i + 1).min(n),
    }
}

impl PatternMatch<'_> {
    fn try_match(&self, p: usize, i: usize, best: &mut BestError) -> Option<Captures> {
        let tokens = self.pattern.tokens();
        let n = self.input.len();
        let Some(token) = tokens.get(p) else {
            return (i == n).then(|| Captures::new(self.pattern));
        };

        match token {
            Token::Char(c) => {
                if i < n && chars_match(self.input[i], *c) {
                    self.try_match(p + 1, i + 1, best)
                } else {
                    None
                }
            }
            Token::Space => {
                if i < n && self.input[i].is_whitespace() {
                    let mut j = i;
                    while j < n && self.input[j].is_whitespace() {
                        j += 1;
                    }
                    self.try_match(p + 1, j, best)
                } else if i == 0 || i == n || self.input[i - 1].is_whitespace() {
                    self.try_match(p + 1, i, best)
                } else {
                    None
                }
            }
            Token::Open {
                kind,
                alternatives,
                close,
                ordinal,
            } => {
                for (index, alt) in alternatives.iter().enumerate() {
                    if let Some(mut caps) = self.try_match(alt.start, i, best) {
                        caps.alternatives[*ordinal] = Some(index);
                        caps.mark ^= alt.mark;
                        return Some(caps);
                    }
                }
                if *kind == GroupKind::Optional {
                    self.try_match(close + 1, i, best)
                } else {
                    None
                }
            }
            Token::Bar { close } => self.try_match(close + 1, i, best),
            Token::Close => self.try_match(p + 1, i, best),
            Token::Placeholder { slot, request, .. } => {
                if i >= n {
                    return None;
                }
                let mut end = if p + 1 == tokens.len() {
                    n
                } else {
                    next_boundary(self.input, i)
                };
                loop {
                    let span: String = self.input[i..end].iter().collect();
                    if !span.trim().is_empty() {
                        if let Some(mut caps) = self.try_match(p + 1, end, best) {
                            if let Some(parsed) = self.parse_span(&span, request, best) {
                                caps.exprs[*slot] = Some(parsed.value);
                                caps.spans[*slot] = Some(span.trim().to_string());
                                caps.warnings.extend(parsed.warnings);
                                return Some(caps);
                            }
                        }
                    }
                    if end >= n {
                        return None;
                    }
                    end = next_boundary(self.input, end);
                }
            }
            Token::Regex { slot, regex } => {
                if i >= n {
                    return None;
                }
                let mut end = next_boundary(self.input, i);
                loop {
                    let span: String = self.input[i..end].iter().collect();
                    if let Some(found) = regex.captures(&span) {
                        let groups = found
                            .iter()
                            .skip(1)
                            .map(|g| g.map(|m| m.as_str().to_string()))
                            .collect();
                        if let Some(mut caps) = self.try_match(p + 1, end, best) {
                            caps.regexes[*slot] = Some(RegexCapture { text: span, groups });
                            return Some(caps);
                        }
                    }
                    if end >= n {
                        return None;
                    }
                    end = next_boundary(self.input, end);
                }
            }
        }
    }

    fn parse_span(
        &self,
        span: &str,
        request: &TypeRequest,
        best: &mut BestError,
    ) -> Option<Parsed<Expr>> {
        let parsed = parse_expression_at(span, request, self.ctx, best, self.depth + 1)?;
        if !request.plural && !parsed.value.is_single() {
            best.record(
                ErrorQuality::WrongType,
                format!(
                    "'{}' can only be {}, not more",
                    span.trim(),
                    describe_request(self.ctx.registry, request)
                ),
            );
            return None;
        }
        Some(parsed)
    }
}

/// Match one pattern and fill omitted placeholders with their defaults.
fn match_pattern_at(
    pattern: &Pattern,
    pattern_index: usize,
    text: &str,
    ctx: &BuildContext<'_>,
    best: &mut BestError,
    depth: usize,
) -> Option<(ParsedOperation, Vec<Diagnostic>)> {
    let input: Vec<char> = text.chars().collect();
    let search = PatternMatch {
        pattern,
        input: &input,
        ctx,
        depth,
    };
    let mut caps = search.try_match(0, 0, best)?;

    for (slot, request, optional) in pattern.placeholders() {
        if caps.exprs[slot].is_some() {
            continue;
        }
        let default = request
            .types
            .iter()
            .find_map(|t| ctx.registry.default_for(*t).map(|f| (*t, f.clone())));
        match default {
            Some((ty, provider)) => {
                caps.exprs[slot] = Some(Expr::computed(EventDefault::new(ty, provider)));
            }
            None if optional => {}
            None => {
                best.record(
                    ErrorQuality::Semantic,
                    format!(
                        "'{}' needs {} here",
                        text,
                        describe_request(ctx.registry, request)
                    ),
                );
                return None;
            }
        }
    }

    let op = ParsedOperation {
        text: text.to_string(),
        pattern_index,
        mark: caps.mark,
        exprs: caps.exprs,
        spans: caps.spans,
        alternatives: caps.alternatives,
        regexes: caps.regexes,
    };
    Some((op, caps.warnings))
}

/// Try an entry's patterns in order. A constructor rejection ends the entry.
fn match_entry<T>(
    entry: &SyntaxEntry<T>,
    text: &str,
    ctx: &BuildContext<'_>,
    best: &mut BestError,
    depth: usize,
) -> Option<Parsed<T>> {
    for (index, pattern) in entry.patterns().iter().enumerate() {
        let Some((op, warnings)) = match_pattern_at(pattern, index, text, ctx, best, depth) else {
            continue;
        };
        return match entry.construct(op, ctx) {
            Ok(value) => Some(Parsed { value, warnings }),
            Err(message) => {
                best.record(ErrorQuality::Semantic, message);
                None
            }
        };
    }
    None
}

// ============================================================================
// Expressions
// ============================================================================

/// "a number", "a number or text", "numbers".
pub fn describe_request(registry: &Registry, request: &TypeRequest) -> String {
    let types = registry.types();
    let names: Vec<&str> = request
        .types
        .iter()
        .map(|t| {
            if request.plural {
                types.plural_name(*t)
            } else {
                types.name(*t)
            }
        })
        .collect();
    let joined = names.join(" or ");
    if request.plural {
        joined
    } else {
        with_article(&joined)
    }
}

fn convert_request(expr: Expr, request: &TypeRequest, registry: &Registry) -> Option<Expr> {
    request
        .types
        .iter()
        .find_map(|t| expr.clone().convert_to(registry, *t))
}

/// Inner text of `( … )` when the parentheses wrap the whole input.
fn strip_parens(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    let chars: Vec<char> = text.chars().collect();
    (next_boundary(&chars, 0) == chars.len()).then_some(inner)
}

/// Contents of a single `"…"` string with `""` escapes.
fn unquote(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '"' && chars.next() != Some('"') {
            return None;
        }
        out.push(c);
    }
    Some(out)
}

fn parse_quoted(
    original: &str,
    contents: String,
    request: &TypeRequest,
    registry: &Registry,
    best: &mut BestError,
) -> Option<Parsed<Expr>> {
    let Some(text_ty) = registry.text() else {
        best.record(
            ErrorQuality::NotParseable,
            format!("{} is not {}", original, describe_request(registry, request)),
        );
        return None;
    };
    let literal = Expr::literal(Value::new(text_ty, Datum::Text(contents)), original);
    match convert_request(literal, request, registry) {
        Some(expr) => Some(Parsed::new(expr)),
        None => {
            best.record(
                ErrorQuality::WrongType,
                format!(
                    "{} is text, not {}",
                    original,
                    describe_request(registry, request)
                ),
            );
            None
        }
    }
}

fn parse_expression_at(
    text: &str,
    request: &TypeRequest,
    ctx: &BuildContext<'_>,
    best: &mut BestError,
    depth: usize,
) -> Option<Parsed<Expr>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if depth > MAX_DEPTH {
        best.record(
            ErrorQuality::Semantic,
            format!("'{}' is nested too deeply", text),
        );
        return None;
    }
    if let Some(inner) = strip_parens(text) {
        return parse_expression_at(inner, request, ctx, best, depth + 1);
    }
    let registry = ctx.registry;
    if let Some(contents) = unquote(text) {
        return parse_quoted(text, contents, request, registry, best);
    }

    for syntax in registry.expressions() {
        if !request
            .types
            .iter()
            .any(|t| registry.can_yield(syntax.return_type, *t))
        {
            continue;
        }
        let Some(parsed) = match_entry(&syntax.entry, text, ctx, best, depth) else {
            continue;
        };
        let described = parsed.value.describe(registry);
        match convert_request(parsed.value, request, registry) {
            Some(value) => {
                return Some(Parsed {
                    value,
                    warnings: parsed.warnings,
                })
            }
            None => best.record(
                ErrorQuality::WrongType,
                format!(
                    "{} is not {}",
                    described,
                    describe_request(registry, request)
                ),
            ),
        }
    }

    for ty in &request.types {
        if let Some(value) = registry.parse_text(text, *ty) {
            return Some(Parsed::new(Expr::literal(value, text)));
        }
    }

    if let Some(split) = split_list(text) {
        return parse_list(text, split, request, ctx, best, depth);
    }

    best.record(
        ErrorQuality::NotParseable,
        format!("'{}' is not {}", text, describe_request(registry, request)),
    );
    None
}

// ============================================================================
// Lists
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
struct ListSplit {
    pieces: Vec<String>,
    conjunctive: bool,
    warning: Option<String>,
}

/// `word` at `at`, followed by whitespace; returns the position after it.
fn keyword_at(chars: &[char], at: usize, word: &str) -> Option<usize> {
    let len = word.chars().count();
    if at + len >= chars.len() {
        return None;
    }
    let matches = word
        .chars()
        .enumerate()
        .all(|(k, w)| chars_match(chars[at + k], w));
    (matches && chars[at + len].is_whitespace()).then_some(at + len + 1)
}

/// Split on top-level `,`, ` and `, ` or ` (quotes and brackets stay whole).
fn split_list(text: &str) -> Option<ListSplit> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut pieces = Vec::new();
    let (mut ands, mut ors) = (0, 0);
    let (mut start, mut i) = (0, 0);

    while i < n {
        match chars[i] {
            '"' | '{' | '(' => {
                i = next_boundary(&chars, i);
                continue;
            }
            ',' => {
                pieces.push(chars[start..i].iter().collect::<String>());
                i += 1;
                let mut j = i;
                while j < n && chars[j].is_whitespace() {
                    j += 1;
                }
                if let Some(after) = keyword_at(&chars, j, "and") {
                    ands += 1;
                    i = after;
                } else if let Some(after) = keyword_at(&chars, j, "or") {
                    ors += 1;
                    i = after;
                }
                start = i;
                continue;
            }
            c if c.is_whitespace() => {
                let and = keyword_at(&chars, i + 1, "and");
                let or = keyword_at(&chars, i + 1, "or");
                if let Some(after) = and.or(or) {
                    pieces.push(chars[start..i].iter().collect::<String>());
                    if and.is_some() {
                        ands += 1;
                    } else {
                        ors += 1;
                    }
                    i = after;
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    pieces.push(chars[start..].iter().collect::<String>());

    if pieces.len() < 2 || pieces.iter().any(|p| p.trim().is_empty()) {
        return None;
    }
    let pieces: Vec<String> = pieces.into_iter().map(|p| p.trim().to_string()).collect();
    let (conjunctive, warning) = match (ands > 0, ors > 0) {
        (true, true) => (
            true,
            Some(format!(
                "list '{}' mixes 'and' and 'or'; treating it as 'and'",
                text
            )),
        ),
        (false, true) => (false, None),
        (true, false) => (true, None),
        (false, false) => (
            true,
            Some(format!(
                "list '{}' is missing 'and' or 'or'; treating it as 'and'",
                text
            )),
        ),
    };
    Some(ListSplit {
        pieces,
        conjunctive,
        warning,
    })
}

fn parse_list(
    text: &str,
    split: ListSplit,
    request: &TypeRequest,
    ctx: &BuildContext<'_>,
    best: &mut BestError,
    depth: usize,
) -> Option<Parsed<Expr>> {
    let mut warnings: Vec<Diagnostic> = split.warning.into_iter().map(Diagnostic::warning).collect();
    let mut items = Vec::with_capacity(split.pieces.len());
    for piece in &split.pieces {
        let parsed = parse_expression_at(piece, request, ctx, best, depth + 1)?;
        warnings.extend(parsed.warnings);
        items.push(parsed.value);
    }

    let types = ctx.registry.types();
    let ty = items
        .iter()
        .map(Expr::return_type)
        .reduce(|a, b| types.common_supertype(a, b))
        .unwrap_or(ctx.registry.object());

    let value = if items.iter().all(|e| e.literal_values().is_some()) {
        let values = items
            .into_iter()
            .flat_map(|e| match e {
                Expr::Literal { values, .. } => values,
                _ => Vec::new(),
            })
            .collect();
        Expr::Literal {
            ty,
            values,
            conjunctive: split.conjunctive,
            text: text.to_string(),
        }
    } else {
        Expr::List {
            items,
            conjunctive: split.conjunctive,
            ty,
        }
    };
    Some(Parsed { value, warnings })
}

// ============================================================================
// Entry points
// ============================================================================

/// A parsed statement line.
pub enum Statement {
    Effect(Box<dyn Effect>),
    Condition(Box<dyn Condition>),
}

/// The event a trigger header names.
pub struct EventMatch {
    pub event: String,
    pub values: Vec<(String, TypeId)>,
    pub filter: Option<Box<dyn EventFilter>>,
}

/// Match `input` against a single pattern.
pub fn match_pattern(
    pattern: &Pattern,
    input: &str,
    ctx: &BuildContext<'_>,
) -> Option<ParsedOperation> {
    let mut best = BestError::default();
    match_pattern_at(pattern, 0, input.trim(), ctx, &mut best, 0).map(|(op, _)| op)
}

/// Parse a stand-alone expression of the requested type(s).
pub fn parse_expression(
    text: &str,
    request: &TypeRequest,
    ctx: &BuildContext<'_>,
) -> Result<Parsed<Expr>, Diagnostic> {
    let text = text.trim();
    let mut best = BestError::default();
    let Some(parsed) = parse_expression_at(text, request, ctx, &mut best, 0) else {
        return Err(best.into_diagnostic(|| format!("can't understand this expression: '{}'", text)));
    };
    if !request.plural && !parsed.value.is_single() {
        return Err(Diagnostic::error(
            ErrorQuality::WrongType,
            format!(
                "'{}' can only be {}, not more",
                text,
                describe_request(ctx.registry, request)
            ),
        ));
    }
    Ok(parsed)
}

pub fn parse_effect(
    text: &str,
    ctx: &BuildContext<'_>,
) -> Result<Parsed<Box<dyn Effect>>, Diagnostic> {
    let text = text.trim();
    let mut best = BestError::default();
    for entry in ctx.registry.effects() {
        if let Some(parsed) = match_entry(entry, text, ctx, &mut best, 0) {
            return Ok(parsed);
        }
    }
    Err(best.into_diagnostic(|| format!("can't understand this effect: '{}'", text)))
}

pub fn parse_condition(
    text: &str,
    ctx: &BuildContext<'_>,
) -> Result<Parsed<Box<dyn Condition>>, Diagnostic> {
    let text = text.trim();
    let mut best = BestError::default();
    for entry in ctx.registry.conditions() {
        if let Some(parsed) = match_entry(entry, text, ctx, &mut best, 0) {
            return Ok(parsed);
        }
    }
    Err(best.into_diagnostic(|| format!("can't understand this condition: '{}'", text)))
}

/// A line on its own: effects are tried before conditions.
pub fn parse_statement(text: &str, ctx: &BuildContext<'_>) -> Result<Parsed<Statement>, Diagnostic> {
    let text = text.trim();
    let mut best = BestError::default();
    for entry in ctx.registry.effects() {
        if let Some(parsed) = match_entry(entry, text, ctx, &mut best, 0) {
            return Ok(parsed.map(Statement::Effect));
        }
    }
    for entry in ctx.registry.conditions() {
        if let Some(parsed) = match_entry(entry, text, ctx, &mut best, 0) {
            return Ok(parsed.map(Statement::Condition));
        }
    }
    Err(best.into_diagnostic(|| format!("can't understand this condition/effect: '{}'", text)))
}

pub fn parse_event(text: &str, registry: &Registry) -> Result<Parsed<EventMatch>, Diagnostic> {
    let text = text.trim();
    let scope = ParseScope::default();
    let ctx = BuildContext::new(registry, &scope);
    let mut best = BestError::default();
    for syntax in registry.events() {
        if let Some(parsed) = match_entry(&syntax.entry, text, &ctx, &mut best, 0) {
            return Ok(parsed.map(|filter| EventMatch {
                event: syntax.entry.name().to_string(),
                values: syntax.values.clone(),
                filter,
            }));
        }
    }
    Err(best.into_diagnostic(|| format!("can't understand this event: '{}'", text)))
}
