//! SK-007: Expressions: typed, possibly multi-valued value nodes.
//!
//! A closed variant set: literals, computed nodes supplied by the vocabulary,
//! converted views and parsed lists. A `Converted` node never wraps another
//! `Converted`; conversion is always re-requested from the innermost source.

use super::convert::Converter;
use super::executor::{Frame, RuntimeError};
use super::registry::{DefaultFn, Registry};
use super::types::{ChangeMode, ChangeSpec, TypeId, Value};
use rand::seq::SliceRandom;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A vocabulary-defined expression evaluated against a frame.
pub trait Computed: Send + Sync + fmt::Debug {
    fn evaluate(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError>;

    fn return_type(&self) -> TypeId;

    fn is_single(&self) -> bool;

    fn accepts_change(&self, _mode: ChangeMode) -> Option<ChangeSpec> {
        None
    }

    fn change(
        &self,
        frame: &mut Frame<'_>,
        _delta: &[Value],
        mode: ChangeMode,
    ) -> Result<(), RuntimeError> {
        Err(RuntimeError::Unsupported(format!(
            "cannot {} {}",
            mode,
            self.describe(frame.registry())
        )))
    }

    fn describe(&self, registry: &Registry) -> String;

    /// Downcast hook for constructors that restructure their operands.
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal {
        ty: TypeId,
        values: Vec<Value>,
        conjunctive: bool,
        text: String,
    },
    Computed(Arc<dyn Computed>),
    Converted {
        source: Box<Expr>,
        target: TypeId,
        /// `None`: each value is converted by its own runtime type.
        converter: Option<Converter>,
    },
    List {
        items: Vec<Expr>,
        conjunctive: bool,
        ty: TypeId,
    },
}

impl Expr {
    pub fn literal(value: Value, text: impl Into<String>) -> Self {
        Self::Literal {
            ty: value.ty(),
            values: vec![value],
            conjunctive: true,
            text: text.into(),
        }
    }

    pub fn computed(c: impl Computed + 'static) -> Self {
        Self::Computed(Arc::new(c))
    }

    pub fn return_type(&self) -> TypeId {
        match self {
            Self::Literal { ty, .. } | Self::List { ty, .. } => *ty,
            Self::Computed(c) => c.return_type(),
            Self::Converted { target, .. } => *target,
        }
    }

    /// At most one value per evaluation. Exclusive ("or") lists are single.
    pub fn is_single(&self) -> bool {
        match self {
            Self::Literal {
                values,
                conjunctive,
                ..
            } => values.len() <= 1 || !conjunctive,
            Self::Computed(c) => c.is_single(),
            Self::Converted { source, .. } => source.is_single(),
            Self::List {
                items, conjunctive, ..
            } => {
                items.len() <= 1 && items.iter().all(Expr::is_single)
                    || !conjunctive && items.iter().all(Expr::is_single)
            }
        }
    }

    pub fn is_conjunctive(&self) -> bool {
        match self {
            Self::Literal { conjunctive, .. } | Self::List { conjunctive, .. } => *conjunctive,
            Self::Computed(_) => true,
            Self::Converted { source, .. } => source.is_conjunctive(),
        }
    }

    pub fn literal_values(&self) -> Option<&[Value]> {
        match self {
            Self::Literal { values, .. } => Some(values),
            _ => None,
        }
    }

    /// The concrete computed node, if this is one of type `T`.
    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Computed(c) => c.as_any().and_then(|a| a.downcast_ref::<T>()),
            _ => None,
        }
    }

    /// Every value, including all members of an exclusive list.
    pub fn evaluate_all(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
        match self {
            Self::Literal { values, .. } => Ok(values.clone()),
            Self::Computed(c) => c.evaluate(frame),
            Self::Converted { source, .. } => {
                let values = source.evaluate_all(frame)?;
                Ok(self.convert_values(frame.registry(), values))
            }
            Self::List { items, .. } => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(item.evaluate_all(frame)?);
                }
                Ok(out)
            }
        }
    }

    /// The values this expression stands for. An exclusive list yields one
    /// uniformly chosen non-empty member per call, or nothing if all are empty.
    pub fn evaluate_many(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
        match self {
            Self::Literal {
                values,
                conjunctive: false,
                ..
            } if values.len() > 1 => Ok(values
                .choose(&mut rand::thread_rng())
                .cloned()
                .into_iter()
                .collect()),
            Self::List {
                items,
                conjunctive: false,
                ..
            } if items.len() > 1 => {
                let mut order: Vec<usize> = (0..items.len()).collect();
                order.shuffle(&mut rand::thread_rng());
                for i in order {
                    let values = items[i].evaluate_many(frame)?;
                    if !values.is_empty() {
                        return Ok(values);
                    }
                }
                Ok(Vec::new())
            }
            Self::Converted { source, .. } => {
                let values = source.evaluate_many(frame)?;
                Ok(self.convert_values(frame.registry(), values))
            }
            _ => self.evaluate_all(frame),
        }
    }

    /// The single value, or an error if this expression may yield several.
    pub fn evaluate_one(&self, frame: &Frame<'_>) -> Result<Option<Value>, RuntimeError> {
        if !self.is_single() {
            return Err(RuntimeError::MultipleValues {
                expr: self.describe(frame.registry()),
            });
        }
        Ok(self.evaluate_many(frame)?.into_iter().next())
    }

    /// Check a predicate against the values: all must hold for "and"
    /// expressions, any for "or" lists. Negation applies per value and an
    /// empty expression never satisfies the check.
    pub fn check(
        &self,
        frame: &Frame<'_>,
        negated: bool,
        mut pred: impl FnMut(&Value) -> bool,
    ) -> Result<bool, RuntimeError> {
        let values = self.evaluate_all(frame)?;
        if values.is_empty() {
            return Ok(false);
        }
        let conjunctive = self.is_conjunctive();
        for value in &values {
            let holds = negated ^ pred(value);
            if conjunctive && !holds {
                return Ok(false);
            }
            if !conjunctive && holds {
                return Ok(true);
            }
        }
        Ok(conjunctive)
    }

    fn convert_values(&self, registry: &Registry, values: Vec<Value>) -> Vec<Value> {
        let Self::Converted {
            target, converter, ..
        } = self
        else {
            return values;
        };
        values
            .iter()
            .filter_map(|v| {
                if registry.is_assignable(v.ty(), *target) {
                    return Some(v.clone());
                }
                match converter {
                    Some(c) if registry.is_assignable(v.ty(), c.from()) => c.apply(v),
                    _ => registry.convert(v, *target),
                }
            })
            .collect()
    }

    /// A view of this expression as `target`, or `None` if no conversion
    /// path exists. Literals convert eagerly.
    pub fn convert_to(self, registry: &Registry, target: TypeId) -> Option<Expr> {
        let from = self.return_type();
        match self {
            Self::Converted { source, .. } => (*source).convert_to(registry, target),
            Self::Literal {
                ty,
                values,
                conjunctive,
                text,
            } => {
                if registry.is_assignable(ty, target) {
                    return Some(Self::Literal {
                        ty,
                        values,
                        conjunctive,
                        text,
                    });
                }
                let values = values
                    .iter()
                    .map(|v| registry.convert(v, target))
                    .collect::<Option<Vec<_>>>()?;
                Some(Self::Literal {
                    ty: target,
                    values,
                    conjunctive,
                    text,
                })
            }
            Self::List {
                items, conjunctive, ..
            } => {
                if registry.is_assignable(from, target) {
                    return Some(Self::List {
                        items,
                        conjunctive,
                        ty: from,
                    });
                }
                let items = items
                    .into_iter()
                    .map(|item| item.convert_to(registry, target))
                    .collect::<Option<Vec<_>>>()?;
                Some(Self::List {
                    items,
                    conjunctive,
                    ty: target,
                })
            }
            computed @ Self::Computed(_) => {
                if registry.is_assignable(from, target) {
                    return Some(computed);
                }
                if let Some(conv) = registry.find_converter(from, target) {
                    return Some(Self::Converted {
                        source: Box::new(computed),
                        target,
                        converter: Some(conv.clone()),
                    });
                }
                if registry.is_assignable(target, from) {
                    return Some(Self::Converted {
                        source: Box::new(computed),
                        target,
                        converter: None,
                    });
                }
                None
            }
        }
    }

    pub fn accepts_change(&self, mode: ChangeMode) -> Option<ChangeSpec> {
        match self {
            Self::Computed(c) => c.accepts_change(mode),
            Self::Converted { source, .. } => source.accepts_change(mode),
            _ => None,
        }
    }

    pub fn change(
        &self,
        frame: &mut Frame<'_>,
        delta: &[Value],
        mode: ChangeMode,
    ) -> Result<(), RuntimeError> {
        match self {
            Self::Computed(c) => c.change(frame, delta, mode),
            Self::Converted { source, .. } => source.change(frame, delta, mode),
            _ => Err(RuntimeError::Unsupported(format!(
                "cannot {} {}",
                mode,
                self.describe(frame.registry())
            ))),
        }
    }

    pub fn describe(&self, registry: &Registry) -> String {
        match self {
            Self::Literal { text, .. } => text.clone(),
            Self::Computed(c) => c.describe(registry),
            Self::Converted { source, .. } => source.describe(registry),
            Self::List {
                items, conjunctive, ..
            } => {
                let parts: Vec<String> = items.iter().map(|i| i.describe(registry)).collect();
                join_list(&parts, *conjunctive)
            }
        }
    }
}

/// "a", "a and b", "a, b or c".
pub fn join_list(parts: &[String], conjunctive: bool) -> String {
    let word = if conjunctive { "and" } else { "or" };
    match parts {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} {} {}", init.join(", "), word, last),
    }
}

/// Value an omitted placeholder takes: the type's default for the event.
#[derive(Clone)]
pub struct EventDefault {
    ty: TypeId,
    provider: DefaultFn,
}

impl EventDefault {
    pub fn new(ty: TypeId, provider: DefaultFn) -> Self {
        Self { ty, provider }
    }
}

impl fmt::Debug for EventDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDefault").field("ty", &self.ty).finish()
    }
}

impl Computed for EventDefault {
    fn evaluate(&self, frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
        Ok((self.provider)(frame.event())
            .map(|d| Value::new(self.ty, d))
            .into_iter()
            .collect())
    }

    fn return_type(&self) -> TypeId {
        self.ty
    }

    fn is_single(&self) -> bool {
        true
    }

    fn describe(&self, registry: &Registry) -> String {
        format!("the {}", registry.type_name(self.ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::NullEvent;
    use crate::core::registry::{RegistryBuilder, TypeSpec};
    use crate::core::types::Datum;
    use crate::core::variables::Variables;

    fn registry() -> (Registry, TypeId, TypeId) {
        let mut b = RegistryBuilder::new();
        let int = b
            .register_type(TypeSpec::new("integer").parser(|s| s.parse().ok().map(Datum::Int)))
            .unwrap();
        let label = b.register_type(TypeSpec::new("label")).unwrap();
        b.register_conversion(int, label, |v| Some(Datum::Text(v.datum().to_string())))
            .unwrap();
        (b.freeze(), int, label)
    }

    #[derive(Debug)]
    struct Fixed(TypeId, Vec<Value>);

    impl Computed for Fixed {
        fn evaluate(&self, _frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
            Ok(self.1.clone())
        }
        fn return_type(&self) -> TypeId {
            self.0
        }
        fn is_single(&self) -> bool {
            self.1.len() <= 1
        }
        fn describe(&self, _registry: &Registry) -> String {
            "fixed".into()
        }
    }

    fn ints(ty: TypeId, ns: &[i64]) -> Vec<Value> {
        ns.iter().map(|n| Value::new(ty, Datum::Int(*n))).collect()
    }

    #[test]
    fn test_sk007_converted_never_nests() {
        let (reg, int, label) = registry();
        let obj = reg.object();
        let e = Expr::computed(Fixed(obj, ints(int, &[3])));
        let as_int = e.convert_to(&reg, int).unwrap();
        assert!(matches!(&as_int, Expr::Converted { converter: None, .. }));
        let as_label = as_int.convert_to(&reg, label).unwrap();
        match &as_label {
            Expr::Converted { source, target, .. } => {
                assert!(matches!(**source, Expr::Computed(_)));
                assert_eq!(*target, label);
            }
            other => panic!("expected converted, got {:?}", other),
        }
    }

    #[test]
    fn test_sk007_literal_converts_eagerly() {
        let (reg, int, label) = registry();
        let lit = Expr::literal(Value::new(int, Datum::Int(7)), "7");
        let converted = lit.convert_to(&reg, label).unwrap();
        assert_eq!(
            converted.literal_values().unwrap(),
            &[Value::new(label, Datum::Text("7".into()))]
        );
        let back = converted.convert_to(&reg, int);
        assert!(back.is_none());
    }

    #[test]
    fn test_sk007_dynamic_conversion_drops_failures() {
        let (reg, int, label) = registry();
        let mut vals = ints(int, &[1]);
        vals.push(Value::new(label, Datum::Text("x".into())));
        let e = Expr::computed(Fixed(reg.object(), vals))
            .convert_to(&reg, int)
            .unwrap();
        let mut globals = Variables::default();
        let mut event = NullEvent;
        let frame = Frame::new(&reg, &mut event, &mut globals, 0);
        assert_eq!(e.evaluate_all(&frame).unwrap(), ints(int, &[1]));
    }

    #[test]
    fn test_sk007_or_list_picks_one() {
        let (reg, int, _) = registry();
        let e = Expr::Literal {
            ty: int,
            values: ints(int, &[1, 2, 3]),
            conjunctive: false,
            text: "1, 2 or 3".into(),
        };
        assert!(e.is_single());
        let mut globals = Variables::default();
        let mut event = NullEvent;
        let frame = Frame::new(&reg, &mut event, &mut globals, 0);
        for _ in 0..20 {
            let many = e.evaluate_many(&frame).unwrap();
            assert_eq!(many.len(), 1);
            assert!(ints(int, &[1, 2, 3]).contains(&many[0]));
        }
        assert_eq!(e.evaluate_all(&frame).unwrap().len(), 3);
    }

    #[test]
    fn test_sk007_or_list_skips_missing_members() {
        let (reg, int, _) = registry();
        let mut globals = Variables::default();
        let mut event = NullEvent;
        let frame = Frame::new(&reg, &mut event, &mut globals, 0);
        let five = Value::new(int, Datum::Int(5));

        let e = Expr::List {
            items: vec![
                Expr::computed(Fixed(int, vec![])),
                Expr::literal(five.clone(), "5"),
            ],
            conjunctive: false,
            ty: int,
        };
        assert!(e.is_single());
        for _ in 0..100 {
            assert_eq!(e.evaluate_one(&frame).unwrap(), Some(five.clone()));
        }

        let none = Expr::List {
            items: vec![
                Expr::computed(Fixed(int, vec![])),
                Expr::computed(Fixed(int, vec![])),
            ],
            conjunctive: false,
            ty: int,
        };
        assert!(none.evaluate_many(&frame).unwrap().is_empty());
        assert_eq!(none.evaluate_one(&frame).unwrap(), None);
    }

    #[test]
    fn test_sk007_evaluate_one_rejects_and_list() {
        let (reg, int, _) = registry();
        let e = Expr::Literal {
            ty: int,
            values: ints(int, &[1, 2]),
            conjunctive: true,
            text: "1 and 2".into(),
        };
        let mut globals = Variables::default();
        let mut event = NullEvent;
        let frame = Frame::new(&reg, &mut event, &mut globals, 0);
        assert!(matches!(
            e.evaluate_one(&frame),
            Err(RuntimeError::MultipleValues { .. })
        ));
    }

    #[test]
    fn test_sk007_check_semantics() {
        let (reg, int, _) = registry();
        let mut globals = Variables::default();
        let mut event = NullEvent;
        let frame = Frame::new(&reg, &mut event, &mut globals, 0);
        let positive = |v: &Value| v.datum().as_f64().is_some_and(|x| x > 0.0);

        let all = Expr::Literal {
            ty: int,
            values: ints(int, &[1, -2]),
            conjunctive: true,
            text: String::new(),
        };
        assert!(!all.check(&frame, false, positive).unwrap());
        let any = Expr::Literal {
            ty: int,
            values: ints(int, &[1, -2]),
            conjunctive: false,
            text: String::new(),
        };
        assert!(any.check(&frame, false, positive).unwrap());
        assert!(any.check(&frame, true, positive).unwrap());

        let empty = Expr::computed(Fixed(int, vec![]));
        assert!(!empty.check(&frame, false, positive).unwrap());
        assert!(!empty.check(&frame, true, positive).unwrap());
    }

    #[test]
    fn test_sk007_join_list() {
        let parts: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(join_list(&parts, true), "a, b and c");
        assert_eq!(join_list(&parts[..1], false), "a");
        assert_eq!(join_list(&parts[..2], false), "a or b");
    }
}
