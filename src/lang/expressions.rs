//! SK-021: Stock expressions.
//!
//! - `{name}`, `{_local}`, `{list::*}` variables (settable, addable, removable)
//! - `loop-value`, `loop-value-N`
//! - `event-<key>` for the values the trigger's event declares
//! - `+ - * /` with the usual precedence and left associativity
//! - `size of %objects%`

use super::types::StockTypes;
use crate::core::executor::{Frame, RuntimeError};
use crate::core::expr::{Computed, Expr};
use crate::core::registry::{Registry, RegistryBuilder, RegistryError};
use crate::core::types::{with_article, ChangeMode, ChangeSpec, Datum, Relation, TypeId, Value};
use crate::core::variables::is_list_name;
use std::any::Any;

// ============================================================================
// Variables
// ============================================================================

#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    object: TypeId,
    number: TypeId,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_list(&self) -> bool {
        is_list_name(&self.name)
    }

    /// `add`/`remove` on a single variable: numeric increment.
    fn shift(&self, frame: &mut Frame<'_>, delta: &[Value], op: Operator) -> Result<(), RuntimeError> {
        let name = self.name.as_str();
        let mut current = match frame.variables(name).get(name).first() {
            None => Datum::Int(0),
            Some(v) if v.datum().as_f64().is_some() => v.datum().clone(),
            Some(_) => {
                return Err(RuntimeError::Unsupported(format!(
                    "{{{}}} does not hold a number",
                    name
                )))
            }
        };
        for d in delta {
            current = op.apply(&current, d.datum()).ok_or_else(|| {
                RuntimeError::Unsupported(format!("{{{}}} would overflow", name))
            })?;
        }
        frame
            .variables_mut(name)
            .set(name, vec![Value::new(self.number, current)]);
        Ok(())
    }
}

impl Computed for Variable {
    fn evaluate(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
        Ok(frame.variables(&self.name).get(&self.name).to_vec())
    }

    fn return_type(&self) -> TypeId {
        self.object
    }

    fn is_single(&self) -> bool {
        !self.is_list()
    }

    fn accepts_change(&self, mode: ChangeMode) -> Option<ChangeSpec> {
        let list = self.is_list();
        let ty = match mode {
            ChangeMode::Add | ChangeMode::Remove if !list => self.number,
            _ => self.object,
        };
        Some(ChangeSpec { ty, plural: list })
    }

    fn change(
        &self,
        frame: &mut Frame<'_>,
        delta: &[Value],
        mode: ChangeMode,
    ) -> Result<(), RuntimeError> {
        let registry = frame.registry();
        let name = self.name.as_str();
        match (mode, self.is_list()) {
            (ChangeMode::Set, true) => frame.variables_mut(name).set(name, delta.to_vec()),
            (ChangeMode::Set, false) => frame
                .variables_mut(name)
                .set(name, delta.iter().take(1).cloned().collect()),
            (ChangeMode::Clear, _) => frame.variables_mut(name).clear(name),
            (ChangeMode::Add, true) => frame.variables_mut(name).add(name, delta),
            (ChangeMode::Remove, true) => frame.variables_mut(name).remove_where(name, |v| {
                delta
                    .iter()
                    .any(|d| registry.compare(v, d) == Relation::Equal)
            }),
            (ChangeMode::Add, false) => return self.shift(frame, delta, Operator::Add),
            (ChangeMode::Remove, false) => return self.shift(frame, delta, Operator::Subtract),
        }
        Ok(())
    }

    fn describe(&self, _registry: &Registry) -> String {
        format!("{{{}}}", self.name)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

// ============================================================================
// Loop and event values
// ============================================================================

#[derive(Debug, Clone)]
pub struct LoopValue {
    /// `None` for the innermost loop.
    nth: Option<usize>,
    ty: TypeId,
}

impl Computed for LoopValue {
    fn evaluate(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
        Ok(frame.loop_value(self.nth).cloned().into_iter().collect())
    }

    fn return_type(&self) -> TypeId {
        self.ty
    }

    fn is_single(&self) -> bool {
        true
    }

    fn describe(&self, _registry: &Registry) -> String {
        match self.nth {
            Some(n) => format!("loop-value-{}", n),
            None => "loop-value".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventValue {
    key: String,
    ty: TypeId,
}

impl Computed for EventValue {
    fn evaluate(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
        Ok(frame.event().event_value(&self.key).into_iter().collect())
    }

    fn return_type(&self) -> TypeId {
        self.ty
    }

    fn is_single(&self) -> bool {
        true
    }

    fn describe(&self, _registry: &Registry) -> String {
        format!("event-{}", self.key)
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    fn from_mark(mark: i32) -> Option<Self> {
        match mark {
            1 => Some(Self::Add),
            2 => Some(Self::Subtract),
            3 => Some(Self::Multiply),
            4 => Some(Self::Divide),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }

    fn is_additive(self) -> bool {
        matches!(self, Self::Add | Self::Subtract)
    }

    /// Integer arithmetic while exact, float otherwise. `None` for division
    /// by zero and non-finite results.
    pub fn apply(self, a: &Datum, b: &Datum) -> Option<Datum> {
        if let (Datum::Int(x), Datum::Int(y)) = (a, b) {
            let exact = match self {
                Self::Add => x.checked_add(*y),
                Self::Subtract => x.checked_sub(*y),
                Self::Multiply => x.checked_mul(*y),
                Self::Divide if *y == 0 => return None,
                Self::Divide if x.checked_rem(*y) == Some(0) => x.checked_div(*y),
                Self::Divide => None,
            };
            if let Some(n) = exact {
                return Some(Datum::Int(n));
            }
        }
        let (x, y) = (a.as_f64()?, b.as_f64()?);
        let result = match self {
            Self::Add => x + y,
            Self::Subtract => x - y,
            Self::Multiply => x * y,
            Self::Divide if y == 0.0 => return None,
            Self::Divide => x / y,
        };
        result.is_finite().then_some(Datum::Float(result))
    }
}

#[derive(Debug, Clone)]
pub struct Arithmetic {
    left: Expr,
    op: Operator,
    right: Expr,
    number: TypeId,
    /// Parsed from a parenthesised span; never re-associated.
    grouped: bool,
}

impl Arithmetic {
    /// Shortest-first matching binds `a - b - c` as `a - (b - c)`; rebuild
    /// it as `(a - b) - c` down the left spine of same-precedence operands.
    fn associate(left: Expr, op: Operator, right: Expr, number: TypeId) -> Self {
        if let Some(inner) = right.downcast::<Arithmetic>() {
            if !inner.grouped && inner.op.is_additive() == op.is_additive() {
                let spine = Self::associate(left, op, inner.left.clone(), number);
                return Self {
                    left: Expr::computed(spine),
                    op: inner.op,
                    right: inner.right.clone(),
                    number,
                    grouped: false,
                };
            }
        }
        Self {
            left,
            op,
            right,
            number,
            grouped: false,
        }
    }
}

/// Whether `(` at the start of `span` closes at its very end.
fn wrapped_in_parens(span: &str) -> bool {
    if !span.starts_with('(') || !span.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    let mut quoted = false;
    for (i, c) in span.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + c.len_utf8() == span.len();
                }
            }
            _ => {}
        }
    }
    false
}

fn mark_grouped(expr: Expr, span: Option<&str>) -> Expr {
    if span.is_some_and(wrapped_in_parens) {
        if let Some(a) = expr.downcast::<Arithmetic>() {
            return Expr::computed(Arithmetic {
                grouped: true,
                ..a.clone()
            });
        }
    }
    expr
}

impl Computed for Arithmetic {
    fn evaluate(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
        // an unset operand counts as zero
        let operand = |e: &Expr| -> Result<Datum, RuntimeError> {
            Ok(e.evaluate_one(frame)?
                .map_or(Datum::Int(0), Value::into_datum))
        };
        let (a, b) = (operand(&self.left)?, operand(&self.right)?);
        Ok(self
            .op
            .apply(&a, &b)
            .map(|d| Value::new(self.number, d))
            .into_iter()
            .collect())
    }

    fn return_type(&self) -> TypeId {
        self.number
    }

    fn is_single(&self) -> bool {
        true
    }

    fn describe(&self, registry: &Registry) -> String {
        let text = format!(
            "{} {} {}",
            self.left.describe(registry),
            self.op.symbol(),
            self.right.describe(registry)
        );
        if self.grouped {
            format!("({})", text)
        } else {
            text
        }
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

// ============================================================================
// Size
// ============================================================================

#[derive(Debug, Clone)]
pub struct Size {
    source: Expr,
    number: TypeId,
}

impl Computed for Size {
    fn evaluate(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
        let count = self.source.evaluate_all(frame)?.len();
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        Ok(vec![Value::new(self.number, Datum::Int(count))])
    }

    fn return_type(&self) -> TypeId {
        self.number
    }

    fn is_single(&self) -> bool {
        true
    }

    fn describe(&self, registry: &Registry) -> String {
        format!("size of {}", self.source.describe(registry))
    }
}

// ============================================================================
// Registration
// ============================================================================

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    let StockTypes { object, number, .. } = StockTypes::lookup(b)?;

    b.register_expression("variable", object, &["\\{<[^{}]+>\\}"], move |op, _| {
        let name = op
            .regex(0)
            .map(|c| c.text.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            return Err("a variable needs a name".into());
        }
        Ok(Expr::computed(Variable {
            name,
            object,
            number,
        }))
    })?;

    b.register_expression("loop-value", object, &["[the] loop-value[-<\\d+>]"], |op, ctx| {
        let loops = &ctx.scope.loops;
        let nth = match op.regex(0) {
            Some(c) => Some(
                c.text
                    .parse::<usize>()
                    .map_err(|_| format!("'{}' is not a loop number", c.text))?,
            ),
            None => None,
        };
        let ty = match nth {
            None => *loops
                .last()
                .ok_or_else(|| "there's no loop that encloses loop-value".to_string())?,
            Some(n) if (1..=loops.len()).contains(&n) => loops[n - 1],
            Some(n) => {
                return Err(format!(
                    "there's no loop number {} here, only {} loop(s) enclose this line",
                    n,
                    loops.len()
                ))
            }
        };
        Ok(Expr::computed(LoopValue { nth, ty }))
    })?;

    b.register_expression(
        "event-value",
        object,
        &["[the] event-<(?i)[a-z][a-z0-9_]*>"],
        |op, ctx| {
            let key = op
                .regex(0)
                .map(|c| c.text.to_lowercase())
                .unwrap_or_default();
            let ty = ctx.scope.event_value(&key).ok_or_else(|| match &ctx.scope.event {
                Some(event) => format!(
                    "there's no event-{} in {} event",
                    key,
                    with_article(event)
                ),
                None => format!("event-{} can only be used inside a trigger", key),
            })?;
            Ok(Expr::computed(EventValue { key, ty }))
        },
    )?;

    b.register_expression(
        "size",
        number,
        &["[the] (size|amount|number) of %objects%"],
        move |mut op, _| {
            let source = op.take_expr(0).ok_or("size of what?")?;
            Ok(Expr::computed(Size { source, number }))
        },
    )?;

    // additive before multiplicative: the first match is the outermost operator
    for (name, pattern) in [
        ("additive", "%number% (1¦+|2¦-) %number%"),
        ("multiplicative", "%number% (3¦*|4¦/) %number%"),
    ] {
        b.register_expression(name, number, &[pattern], move |mut op, _| {
            let operator = Operator::from_mark(op.mark())
                .ok_or_else(|| format!("unknown operator in '{}'", op.text()))?;
            let left = op.take_expr(0).ok_or("missing left operand")?;
            let right = op.take_expr(1).ok_or("missing right operand")?;
            let left = mark_grouped(left, op.span(0));
            let right = mark_grouped(right, op.span(1));
            Ok(Expr::computed(Arithmetic::associate(
                left, operator, right, number,
            )))
        })?;
    }
    Ok(())
}
