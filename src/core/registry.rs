//! SK-002: Registry: semantic types, conversions, comparators and syntax.
//!
//! Everything is registered on a [`RegistryBuilder`] at startup. `freeze()`
//! consumes the builder, closes the conversion graph and yields an immutable
//! [`Registry`] that is shared read-only by the matcher and the interpreter.

use super::compare::{ComparatorRegistry, Resolution};
use super::convert::{ConversionGraph, Converter};
use super::executor::{Condition, Effect, EventContext, EventFilter};
use super::expr::Expr;
use super::matcher::{BuildContext, ParsedOperation};
use super::pattern::{Pattern, PatternError};
use super::types::{event_key, Datum, Relation, TypeId, Value};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type ParseFn = Arc<dyn Fn(&str) -> Option<Datum> + Send + Sync>;
pub type PrintFn = Arc<dyn Fn(&Datum) -> String + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn(&dyn EventContext) -> Option<Datum> + Send + Sync>;

/// Builds one operation from a successful match. `Err` is a semantic
/// rejection of the candidate.
pub type Constructor<T> =
    Arc<dyn Fn(ParsedOperation, &BuildContext<'_>) -> Result<T, String> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("type id {0} does not belong to this registry")]
    ForeignType(u32),

    #[error("{kind} '{name}' is already registered")]
    DuplicateSyntax { kind: SyntaxKind, name: String },

    #[error("cannot insert before unknown {kind} '{anchor}'")]
    UnknownAnchor { kind: SyntaxKind, anchor: String },

    #[error("{kind} '{name}' has no patterns")]
    NoPatterns { kind: SyntaxKind, name: String },

    #[error("bad pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: PatternError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    Event,
    Condition,
    Effect,
    Expression,
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "event"),
            Self::Condition => write!(f, "condition"),
            Self::Effect => write!(f, "effect"),
            Self::Expression => write!(f, "expression"),
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// Declaration of a semantic type, passed to [`RegistryBuilder::register_type`].
pub struct TypeSpec {
    code_name: String,
    plural: Option<String>,
    parent: Option<TypeId>,
    parser: Option<ParseFn>,
    printer: Option<PrintFn>,
    default: Option<DefaultFn>,
}

impl TypeSpec {
    pub fn new(code_name: &str) -> Self {
        Self {
            code_name: code_name.to_lowercase(),
            plural: None,
            parent: None,
            parser: None,
            printer: None,
            default: None,
        }
    }

    /// Plural form used in placeholders; defaults to `<name>s`.
    pub fn plural(mut self, plural: &str) -> Self {
        self.plural = Some(plural.to_lowercase());
        self
    }

    /// Supertype; defaults to `object`.
    pub fn parent(mut self, parent: TypeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn parser(mut self, f: impl Fn(&str) -> Option<Datum> + Send + Sync + 'static) -> Self {
        self.parser = Some(Arc::new(f));
        self
    }

    pub fn printer(mut self, f: impl Fn(&Datum) -> String + Send + Sync + 'static) -> Self {
        self.printer = Some(Arc::new(f));
        self
    }

    /// Value an omitted placeholder of this type takes, computed per event.
    pub fn default_value(
        mut self,
        f: impl Fn(&dyn EventContext) -> Option<Datum> + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(Arc::new(f));
        self
    }
}

#[derive(Clone)]
pub struct TypeInfo {
    pub id: TypeId,
    pub code_name: String,
    pub plural: String,
    pub parent: Option<TypeId>,
    pub parser: Option<ParseFn>,
    pub printer: Option<PrintFn>,
    pub default: Option<DefaultFn>,
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("id", &self.id)
            .field("code_name", &self.code_name)
            .field("parent", &self.parent)
            .field("parser", &self.parser.is_some())
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// Registered types in registration order. `object` is always `TypeId(0)`.
#[derive(Debug, Clone)]
pub struct TypeTable {
    infos: Vec<TypeInfo>,
    by_name: FxHashMap<String, (TypeId, bool)>,
}

pub const OBJECT: TypeId = TypeId(0);

impl TypeTable {
    fn new() -> Self {
        let mut table = Self {
            infos: Vec::new(),
            by_name: FxHashMap::default(),
        };
        table.infos.push(TypeInfo {
            id: OBJECT,
            code_name: "object".into(),
            plural: "objects".into(),
            parent: None,
            parser: None,
            printer: None,
            default: None,
        });
        table.by_name.insert("object".into(), (OBJECT, false));
        table.by_name.insert("objects".into(), (OBJECT, true));
        table
    }

    fn register(&mut self, spec: TypeSpec) -> Result<TypeId, RegistryError> {
        let plural = spec
            .plural
            .unwrap_or_else(|| format!("{}s", spec.code_name));
        for name in [&spec.code_name, &plural] {
            if self.by_name.contains_key(name) {
                return Err(RegistryError::DuplicateType(name.clone()));
            }
        }
        let parent = spec.parent.unwrap_or(OBJECT);
        self.check(parent)?;

        let id = TypeId(self.infos.len() as u32);
        self.by_name.insert(spec.code_name.clone(), (id, false));
        self.by_name.insert(plural.clone(), (id, true));
        self.infos.push(TypeInfo {
            id,
            code_name: spec.code_name,
            plural,
            parent: Some(parent),
            parser: spec.parser,
            printer: spec.printer,
            default: spec.default,
        });
        Ok(id)
    }

    fn check(&self, id: TypeId) -> Result<(), RegistryError> {
        if id.rank() < self.infos.len() {
            Ok(())
        } else {
            Err(RegistryError::ForeignType(id.0))
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeInfo> {
        self.infos.get(id.rank())
    }

    /// Code name of a type (`"object"` for unknown ids).
    pub fn name(&self, id: TypeId) -> &str {
        self.get(id).map_or("object", |t| t.code_name.as_str())
    }

    pub fn plural_name(&self, id: TypeId) -> &str {
        self.get(id).map_or("objects", |t| t.plural.as_str())
    }

    /// Resolve a singular or plural type name: `(type, is_plural)`.
    pub fn lookup(&self, name: &str) -> Option<(TypeId, bool)> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    /// Whether `sub` is `sup` or one of its descendants.
    pub fn is_assignable(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == sup {
                return true;
            }
            current = self.get(id).and_then(|t| t.parent);
        }
        false
    }

    /// Either type is assignable to the other.
    pub fn is_related(&self, a: TypeId, b: TypeId) -> bool {
        self.is_assignable(a, b) || self.is_assignable(b, a)
    }

    /// Whether some other registered type is assignable to `id`.
    pub fn has_subtypes(&self, id: TypeId) -> bool {
        self.infos
            .iter()
            .any(|t| t.id != id && self.is_assignable(t.id, id))
    }

    /// Closest type both `a` and `b` are assignable to.
    pub fn common_supertype(&self, a: TypeId, b: TypeId) -> TypeId {
        let mut current = Some(a);
        while let Some(id) = current {
            if self.is_assignable(b, id) {
                return id;
            }
            current = self.get(id).and_then(|t| t.parent);
        }
        OBJECT
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.infos.iter()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

// ============================================================================
// Syntax entries
// ============================================================================

/// A named operation with its ordered patterns and constructor.
pub struct SyntaxEntry<T> {
    name: String,
    patterns: Vec<Pattern>,
    ctor: Constructor<T>,
}

impl<T> SyntaxEntry<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn construct(&self, op: ParsedOperation, ctx: &BuildContext<'_>) -> Result<T, String> {
        (self.ctor)(op, ctx)
    }
}

/// An event a trigger can bind to; carries the values the event exposes
/// to `event-<key>` expressions.
pub struct EventSyntax {
    pub entry: SyntaxEntry<Option<Box<dyn EventFilter>>>,
    pub values: Vec<(String, TypeId)>,
}

pub struct ExpressionSyntax {
    pub entry: SyntaxEntry<Expr>,
    pub return_type: TypeId,
}

#[derive(Default)]
pub struct SyntaxTables {
    events: Vec<EventSyntax>,
    conditions: Vec<SyntaxEntry<Box<dyn Condition>>>,
    effects: Vec<SyntaxEntry<Box<dyn Effect>>>,
    expressions: Vec<ExpressionSyntax>,
}

fn place<E>(
    list: &mut Vec<E>,
    kind: SyntaxKind,
    name_of: impl Fn(&E) -> &str,
    anchor: Option<&str>,
    entry: E,
) -> Result<(), RegistryError> {
    let name = name_of(&entry).to_string();
    if list.iter().any(|e| name_of(e) == name) {
        return Err(RegistryError::DuplicateSyntax { kind, name });
    }
    match anchor {
        None => list.push(entry),
        Some(anchor) => {
            let at = list.iter().position(|e| name_of(e) == anchor).ok_or_else(|| {
                RegistryError::UnknownAnchor {
                    kind,
                    anchor: anchor.to_string(),
                }
            })?;
            list.insert(at, entry);
        }
    }
    Ok(())
}

// ============================================================================
// Builder
// ============================================================================

/// Mutable registration phase.
pub struct RegistryBuilder {
    types: TypeTable,
    conversions: ConversionGraph,
    comparators: ComparatorRegistry,
    syntax: SyntaxTables,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Empty builder with only `object` registered.
    pub fn new() -> Self {
        Self {
            types: TypeTable::new(),
            conversions: ConversionGraph::default(),
            comparators: ComparatorRegistry::default(),
            syntax: SyntaxTables::default(),
        }
    }

    pub fn register_type(&mut self, spec: TypeSpec) -> Result<TypeId, RegistryError> {
        self.types.register(spec)
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.types.lookup(name).map(|(id, _)| id)
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn register_conversion(
        &mut self,
        from: TypeId,
        to: TypeId,
        f: impl Fn(&Value) -> Option<Datum> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.types.check(from)?;
        self.types.check(to)?;
        self.conversions.register(from, to, Arc::new(f));
        Ok(())
    }

    pub fn register_comparator(
        &mut self,
        t1: TypeId,
        t2: TypeId,
        supports_ordering: bool,
        f: impl Fn(&Value, &Value) -> Relation + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.types.check(t1)?;
        self.types.check(t2)?;
        self.comparators
            .register(t1, t2, supports_ordering, Arc::new(f));
        Ok(())
    }

    fn entry<T>(
        &self,
        kind: SyntaxKind,
        name: &str,
        patterns: &[&str],
        ctor: Constructor<T>,
    ) -> Result<SyntaxEntry<T>, RegistryError> {
        if patterns.is_empty() {
            return Err(RegistryError::NoPatterns {
                kind,
                name: name.to_string(),
            });
        }
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::compile(p, &self.types).map_err(|source| RegistryError::Pattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SyntaxEntry {
            name: name.to_string(),
            patterns,
            ctor,
        })
    }

    /// Register an event. The entry name is the event name contexts report.
    pub fn register_event<F>(
        &mut self,
        name: &str,
        patterns: &[&str],
        values: &[(&str, TypeId)],
        ctor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ParsedOperation, &BuildContext<'_>) -> Result<Option<Box<dyn EventFilter>>, String>
            + Send
            + Sync
            + 'static,
    {
        for (_, ty) in values {
            self.types.check(*ty)?;
        }
        let entry = self.entry(SyntaxKind::Event, name, patterns, Arc::new(ctor))?;
        let syntax = EventSyntax {
            entry,
            values: values
                .iter()
                .map(|(k, t)| (k.to_lowercase(), *t))
                .collect(),
        };
        place(
            &mut self.syntax.events,
            SyntaxKind::Event,
            |e| e.entry.name(),
            None,
            syntax,
        )
    }

    pub fn register_condition<F>(
        &mut self,
        name: &str,
        patterns: &[&str],
        ctor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ParsedOperation, &BuildContext<'_>) -> Result<Box<dyn Condition>, String>
            + Send
            + Sync
            + 'static,
    {
        self.add_condition(None, name, patterns, Arc::new(ctor))
    }

    /// Register a condition ahead of the already-registered `anchor`.
    pub fn register_condition_before<F>(
        &mut self,
        anchor: &str,
        name: &str,
        patterns: &[&str],
        ctor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ParsedOperation, &BuildContext<'_>) -> Result<Box<dyn Condition>, String>
            + Send
            + Sync
            + 'static,
    {
        self.add_condition(Some(anchor), name, patterns, Arc::new(ctor))
    }

    fn add_condition(
        &mut self,
        anchor: Option<&str>,
        name: &str,
        patterns: &[&str],
        ctor: Constructor<Box<dyn Condition>>,
    ) -> Result<(), RegistryError> {
        let entry = self.entry(SyntaxKind::Condition, name, patterns, ctor)?;
        place(
            &mut self.syntax.conditions,
            SyntaxKind::Condition,
            |e| e.name(),
            anchor,
            entry,
        )
    }

    pub fn register_effect<F>(
        &mut self,
        name: &str,
        patterns: &[&str],
        ctor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ParsedOperation, &BuildContext<'_>) -> Result<Box<dyn Effect>, String>
            + Send
            + Sync
            + 'static,
    {
        self.add_effect(None, name, patterns, Arc::new(ctor))
    }

    /// Register an effect ahead of the already-registered `anchor`.
    pub fn register_effect_before<F>(
        &mut self,
        anchor: &str,
        name: &str,
        patterns: &[&str],
        ctor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ParsedOperation, &BuildContext<'_>) -> Result<Box<dyn Effect>, String>
            + Send
            + Sync
            + 'static,
    {
        self.add_effect(Some(anchor), name, patterns, Arc::new(ctor))
    }

    fn add_effect(
        &mut self,
        anchor: Option<&str>,
        name: &str,
        patterns: &[&str],
        ctor: Constructor<Box<dyn Effect>>,
    ) -> Result<(), RegistryError> {
        let entry = self.entry(SyntaxKind::Effect, name, patterns, ctor)?;
        place(
            &mut self.syntax.effects,
            SyntaxKind::Effect,
            |e| e.name(),
            anchor,
            entry,
        )
    }

    pub fn register_expression<F>(
        &mut self,
        name: &str,
        return_type: TypeId,
        patterns: &[&str],
        ctor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ParsedOperation, &BuildContext<'_>) -> Result<Expr, String> + Send + Sync + 'static,
    {
        self.add_expression(None, name, return_type, patterns, Arc::new(ctor))
    }

    /// Register an expression ahead of the already-registered `anchor`.
    pub fn register_expression_before<F>(
        &mut self,
        anchor: &str,
        name: &str,
        return_type: TypeId,
        patterns: &[&str],
        ctor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ParsedOperation, &BuildContext<'_>) -> Result<Expr, String> + Send + Sync + 'static,
    {
        self.add_expression(Some(anchor), name, return_type, patterns, Arc::new(ctor))
    }

    fn add_expression(
        &mut self,
        anchor: Option<&str>,
        name: &str,
        return_type: TypeId,
        patterns: &[&str],
        ctor: Constructor<Expr>,
    ) -> Result<(), RegistryError> {
        self.types.check(return_type)?;
        let entry = self.entry(SyntaxKind::Expression, name, patterns, ctor)?;
        place(
            &mut self.syntax.expressions,
            SyntaxKind::Expression,
            |e| e.entry.name(),
            anchor,
            ExpressionSyntax { entry, return_type },
        )
    }

    /// End registration: synthesize transitive conversions and freeze.
    pub fn freeze(mut self) -> Registry {
        let synthesized = self.conversions.close(&self.types);
        tracing::debug!(
            types = self.types.len(),
            conversions = self.conversions.len(),
            synthesized,
            comparators = self.comparators.len(),
            events = self.syntax.events.len(),
            conditions = self.syntax.conditions.len(),
            effects = self.syntax.effects.len(),
            expressions = self.syntax.expressions.len(),
            "registry frozen"
        );
        Registry {
            types: self.types,
            conversions: self.conversions,
            comparators: self.comparators,
            syntax: self.syntax,
        }
    }
}

// ============================================================================
// Frozen registry
// ============================================================================

/// Read-only registry shared by loading and execution.
pub struct Registry {
    types: TypeTable,
    conversions: ConversionGraph,
    comparators: ComparatorRegistry,
    syntax: SyntaxTables,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types.len())
            .field("conversions", &self.conversions.len())
            .field("comparators", &self.comparators.len())
            .finish()
    }
}

impl Registry {
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.types.lookup(name).map(|(id, _)| id)
    }

    pub fn object(&self) -> TypeId {
        OBJECT
    }

    /// The type quoted strings parse as, if registered.
    pub fn text(&self) -> Option<TypeId> {
        self.type_id("text")
    }

    pub fn type_name(&self, id: TypeId) -> &str {
        self.types.name(id)
    }

    pub fn is_assignable(&self, sub: TypeId, sup: TypeId) -> bool {
        self.types.is_assignable(sub, sup)
    }

    /// Parse literal text as `target`.
    ///
    /// Phase 1 tries every parseable type assignable to `target`, in
    /// registration order. Phase 2 parses as another type that converts to
    /// `target` and converts the result.
    pub fn parse_text(&self, text: &str, target: TypeId) -> Option<Value> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let parseable = || {
            self.types
                .iter()
                .filter_map(|t| t.parser.as_ref().map(|p| (t.id, p)))
        };
        for (id, parser) in parseable() {
            if self.types.is_assignable(id, target) {
                if let Some(datum) = parser(text) {
                    return Some(Value::new(id, datum));
                }
            }
        }
        for (id, parser) in parseable() {
            if self.types.is_assignable(id, target) {
                continue;
            }
            let Some(conv) = self.conversions.find(&self.types, id, target) else {
                continue;
            };
            if let Some(value) = parser(text).and_then(|d| conv.apply(&Value::new(id, d))) {
                return Some(value);
            }
        }
        None
    }

    /// Printed form of a value: the type's printer, or the datum itself.
    pub fn to_text(&self, value: &Value) -> String {
        match self.types.get(value.ty()).and_then(|t| t.printer.as_ref()) {
            Some(printer) => printer(value.datum()),
            None => value.datum().to_string(),
        }
    }

    pub fn find_converter(&self, from: TypeId, to: TypeId) -> Option<&Converter> {
        self.conversions.find(&self.types, from, to)
    }

    /// Convert a value by its own exact type.
    pub fn convert(&self, value: &Value, to: TypeId) -> Option<Value> {
        self.conversions
            .convert(&self.types, value, value.ty(), to)
    }

    /// Convert a value treated as type `from`.
    pub fn convert_from(&self, value: &Value, from: TypeId, to: TypeId) -> Option<Value> {
        self.conversions.convert(&self.types, value, from, to)
    }

    /// Whether values of `from` can possibly end up as `to`.
    pub fn can_yield(&self, from: TypeId, to: TypeId) -> bool {
        self.types.is_related(from, to) || self.find_converter(from, to).is_some()
    }

    pub fn compare(&self, v1: &Value, v2: &Value) -> Relation {
        self.comparators
            .compare(&self.types, &self.conversions, v1, v2)
    }

    pub fn resolve_comparison(&self, t1: TypeId, t2: TypeId) -> Option<Resolution<'_>> {
        self.comparators
            .find(&self.types, &self.conversions, t1, t2)
    }

    /// Parse-time check: values of these types can be compared at all.
    ///
    /// Supertypes defer the decision to runtime.
    pub fn may_compare(&self, t1: TypeId, t2: TypeId) -> bool {
        t1 == t2 || self.types.is_related(t1, t2) || self.resolve_comparison(t1, t2).is_some()
    }

    /// Parse-time check for `<`/`>` style relations. A supertype operand
    /// may still hold orderable values, so it defers to runtime.
    pub fn supports_ordering(&self, t1: TypeId, t2: TypeId) -> bool {
        match self.resolve_comparison(t1, t2) {
            Some(resolution) => resolution.supports_ordering(),
            None => self.types.has_subtypes(t1) || self.types.has_subtypes(t2),
        }
    }

    pub fn default_for(&self, ty: TypeId) -> Option<&DefaultFn> {
        self.types.get(ty).and_then(|t| t.default.as_ref())
    }

    pub fn events(&self) -> &[EventSyntax] {
        &self.syntax.events
    }

    pub fn event(&self, name: &str) -> Option<&EventSyntax> {
        let key = event_key(name);
        self.syntax
            .events
            .iter()
            .find(|e| event_key(e.entry.name()) == key)
    }

    pub fn conditions(&self) -> &[SyntaxEntry<Box<dyn Condition>>] {
        &self.syntax.conditions
    }

    pub fn effects(&self) -> &[SyntaxEntry<Box<dyn Effect>>] {
        &self.syntax.effects
    }

    pub fn expressions(&self) -> &[ExpressionSyntax] {
        &self.syntax.expressions
    }

    /// `(kind, name, pattern)` for every registered pattern, in match order.
    pub fn syntax_listing(&self) -> Vec<(SyntaxKind, &str, &str)> {
        let mut out = Vec::new();
        for e in &self.syntax.events {
            push_patterns(&mut out, SyntaxKind::Event, &e.entry);
        }
        for e in &self.syntax.conditions {
            push_patterns(&mut out, SyntaxKind::Condition, e);
        }
        for e in &self.syntax.effects {
            push_patterns(&mut out, SyntaxKind::Effect, e);
        }
        for e in &self.syntax.expressions {
            push_patterns(&mut out, SyntaxKind::Expression, &e.entry);
        }
        out
    }
}

fn push_patterns<'a, T>(
    out: &mut Vec<(SyntaxKind, &'a str, &'a str)>,
    kind: SyntaxKind,
    entry: &'a SyntaxEntry<T>,
) {
    for p in &entry.patterns {
        out.push((kind, entry.name(), p.source()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_parser(s: &str) -> Option<Datum> {
        s.parse::<i64>().ok().map(Datum::Int)
    }

    #[test]
    fn test_sk002_object_is_root() {
        let mut b = RegistryBuilder::new();
        let animal = b.register_type(TypeSpec::new("animal")).unwrap();
        let dog = b.register_type(TypeSpec::new("dog").parent(animal)).unwrap();
        let reg = b.freeze();
        assert_eq!(reg.type_id("object"), Some(OBJECT));
        assert!(reg.is_assignable(dog, animal));
        assert!(reg.is_assignable(dog, OBJECT));
        assert!(!reg.is_assignable(animal, dog));
        assert_eq!(reg.types().common_supertype(dog, animal), animal);
        assert_eq!(reg.types().lookup("dogs"), Some((dog, true)));
        assert!(reg.types().has_subtypes(animal));
        assert!(!reg.types().has_subtypes(dog));
        assert!(reg.supports_ordering(OBJECT, dog));
        assert!(!reg.supports_ordering(dog, dog));
    }

    #[test]
    fn test_sk002_duplicate_type_rejected() {
        let mut b = RegistryBuilder::new();
        b.register_type(TypeSpec::new("thing")).unwrap();
        assert!(matches!(
            b.register_type(TypeSpec::new("Thing")),
            Err(RegistryError::DuplicateType(_))
        ));
        assert!(matches!(
            b.register_type(TypeSpec::new("other").plural("things")),
            Err(RegistryError::DuplicateType(_))
        ));
    }

    #[test]
    fn test_sk002_parser_preferred_over_conversion() {
        let mut b = RegistryBuilder::new();
        let code = b
            .register_type(TypeSpec::new("code").parser(|s| Some(Datum::Text(s.to_string()))))
            .unwrap();
        let count = b
            .register_type(TypeSpec::new("count").parser(numeric_parser))
            .unwrap();
        b.register_conversion(code, count, |_| Some(Datum::Int(-1)))
            .unwrap();
        let reg = b.freeze();

        assert_eq!(reg.parse_text("42", count), Some(Value::new(count, Datum::Int(42))));
        // count's own parser fails; phase 2 goes through code → count
        assert_eq!(reg.parse_text("abc", count), Some(Value::new(count, Datum::Int(-1))));
    }

    #[test]
    fn test_sk002_parse_text_tries_subtypes() {
        let mut b = RegistryBuilder::new();
        let shape = b.register_type(TypeSpec::new("shape")).unwrap();
        let circle = b
            .register_type(
                TypeSpec::new("circle")
                    .parent(shape)
                    .parser(|s| (s == "circle").then(|| Datum::Text(s.into()))),
            )
            .unwrap();
        let reg = b.freeze();
        assert_eq!(
            reg.parse_text("circle", shape),
            Some(Value::new(circle, Datum::Text("circle".into())))
        );
        assert_eq!(reg.parse_text("square", shape), None);
        assert_eq!(reg.parse_text("  ", OBJECT), None);
    }

    #[test]
    fn test_sk002_insert_before_and_duplicates() {
        let mut b = RegistryBuilder::new();
        b.register_effect("first", &["first"], |_, _| Err("unused".into()))
            .unwrap();
        b.register_effect("second", &["second"], |_, _| Err("unused".into()))
            .unwrap();
        b.register_effect_before("first", "zeroth", &["zeroth"], |_, _| {
            Err("unused".into())
        })
        .unwrap();
        assert!(matches!(
            b.register_effect("first", &["again"], |_, _| Err("unused".into())),
            Err(RegistryError::DuplicateSyntax { .. })
        ));
        assert!(matches!(
            b.register_effect_before("missing", "x", &["x"], |_, _| Err("unused".into())),
            Err(RegistryError::UnknownAnchor { .. })
        ));
        assert!(matches!(
            b.register_effect("bad", &["(unclosed"], |_, _| Err("unused".into())),
            Err(RegistryError::Pattern { .. })
        ));
        let reg = b.freeze();
        let names: Vec<&str> = reg.effects().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["zeroth", "first", "second"]);
    }

    #[test]
    fn test_sk002_foreign_type_rejected() {
        let mut b = RegistryBuilder::new();
        let bogus = TypeId(99);
        assert!(matches!(
            b.register_conversion(OBJECT, bogus, |_| None),
            Err(RegistryError::ForeignType(99))
        ));
    }
}
