//! SK-003: Conversion graph.
//!
//! Directed `from → to` edges between semantic types. At most one direct edge
//! exists per pair; re-registering a pair replaces the converter but keeps its
//! original position. When the registry freezes, [`ConversionGraph::close`]
//! synthesizes single-hop compositions (`A→B`, `B→C` ⇒ `A→C`) from the direct
//! edges only, so no chain is ever longer than two hops.

use super::registry::TypeTable;
use super::types::{Datum, TypeId, Value};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::sync::Arc;

/// Value-mapping function of a direct edge. The result is stamped with the
/// edge's target type.
pub type ConvertFn = Arc<dyn Fn(&Value) -> Option<Datum> + Send + Sync>;

/// A registered or synthesized conversion edge.
#[derive(Clone)]
pub struct Converter {
    from: TypeId,
    to: TypeId,
    kind: ConverterKind,
}

#[derive(Clone)]
enum ConverterKind {
    Direct(ConvertFn),
    Chained(Box<Converter>, Box<Converter>),
}

impl Converter {
    fn direct(from: TypeId, to: TypeId, f: ConvertFn) -> Self {
        Self {
            from,
            to,
            kind: ConverterKind::Direct(f),
        }
    }

    fn chain(first: Converter, second: Converter) -> Self {
        Self {
            from: first.from,
            to: second.to,
            kind: ConverterKind::Chained(Box::new(first), Box::new(second)),
        }
    }

    pub fn from(&self) -> TypeId {
        self.from
    }

    pub fn to(&self) -> TypeId {
        self.to
    }

    /// Whether this edge was synthesized at freeze time.
    pub fn is_chained(&self) -> bool {
        matches!(self.kind, ConverterKind::Chained(..))
    }

    /// Convert a value; `None` if any hop fails.
    pub fn apply(&self, value: &Value) -> Option<Value> {
        match &self.kind {
            ConverterKind::Direct(f) => f(value).map(|d| Value::new(self.to, d)),
            ConverterKind::Chained(first, second) => {
                let mid = first.apply(value)?;
                second.apply(&mid)
            }
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("chained", &self.is_chained())
            .finish()
    }
}

/// All conversion edges, in registration order.
#[derive(Clone, Default)]
pub struct ConversionGraph {
    edges: IndexMap<(TypeId, TypeId), Converter, FxBuildHasher>,
}

impl ConversionGraph {
    /// Register (or replace) the direct edge `from → to`.
    pub fn register(&mut self, from: TypeId, to: TypeId, f: ConvertFn) {
        self.edges.insert((from, to), Converter::direct(from, to, f));
    }

    /// Synthesize single-hop transitive edges. Returns how many were added.
    ///
    /// Only direct edges are composed, and a composition is added only where
    /// no existing edge already covers the (assignable) pair.
    pub fn close(&mut self, types: &TypeTable) -> usize {
        let direct: Vec<Converter> = self
            .edges
            .values()
            .filter(|c| !c.is_chained())
            .cloned()
            .collect();

        let mut added = 0;
        for first in &direct {
            for second in &direct {
                if !types.is_assignable(first.to, second.from) {
                    continue;
                }
                let (from, to) = (first.from, second.to);
                if from == to || types.is_assignable(from, to) {
                    continue;
                }
                if self.find(types, from, to).is_some() {
                    continue;
                }
                self.edges
                    .insert((from, to), Converter::chain(first.clone(), second.clone()));
                added += 1;
            }
        }
        added
    }

    /// Exact edge first, then the first edge (in registration order) whose
    /// source accepts `from` and whose target is assignable to `to`.
    pub fn find(&self, types: &TypeTable, from: TypeId, to: TypeId) -> Option<&Converter> {
        if let Some(c) = self.edges.get(&(from, to)) {
            return Some(c);
        }
        self.edges
            .values()
            .find(|c| types.is_assignable(from, c.from) && types.is_assignable(c.to, to))
    }

    /// Convert `value` (treated as type `from`) to `to`.
    pub fn convert(
        &self,
        types: &TypeTable,
        value: &Value,
        from: TypeId,
        to: TypeId,
    ) -> Option<Value> {
        if types.is_assignable(value.ty(), to) {
            return Some(value.clone());
        }
        self.find(types, from, to)?.apply(value)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{RegistryBuilder, TypeSpec};

    fn abc() -> (RegistryBuilder, TypeId, TypeId, TypeId) {
        let mut b = RegistryBuilder::new();
        let a = b.register_type(TypeSpec::new("alpha")).unwrap();
        let bb = b.register_type(TypeSpec::new("beta")).unwrap();
        let c = b.register_type(TypeSpec::new("gamma")).unwrap();
        (b, a, bb, c)
    }

    fn int(value: &Value) -> Option<i64> {
        match value.datum() {
            Datum::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[test]
    fn test_sk003_transitive_composition() {
        let (mut b, a, bb, c) = abc();
        b.register_conversion(a, bb, |v: &Value| int(v).map(|n| Datum::Int(n + 1)))
            .unwrap();
        b.register_conversion(bb, c, |v: &Value| int(v).map(|n| Datum::Int(n * 10)))
            .unwrap();
        let reg = b.freeze();

        let x = Value::new(a, Datum::Int(4));
        let direct = reg
            .convert_from(&reg.convert_from(&x, a, bb).unwrap(), bb, c)
            .unwrap();
        let composed = reg.convert_from(&x, a, c).unwrap();
        assert_eq!(composed, direct);
        assert_eq!(composed, Value::new(c, Datum::Int(50)));
        assert!(reg.find_converter(a, c).unwrap().is_chained());
    }

    #[test]
    fn test_sk003_failed_hop_yields_none() {
        let (mut b, a, bb, c) = abc();
        b.register_conversion(a, bb, |v: &Value| int(v).map(Datum::Int))
            .unwrap();
        b.register_conversion(bb, c, |v: &Value| {
            int(v).filter(|n| *n > 0).map(Datum::Int)
        })
        .unwrap();
        let reg = b.freeze();
        let x = Value::new(a, Datum::Int(-1));
        assert!(reg.convert_from(&x, a, c).is_none());
        let y = Value::new(a, Datum::Text("no".into()));
        assert!(reg.convert_from(&y, a, c).is_none());
    }

    #[test]
    fn test_sk003_no_multi_hop_chains() {
        let mut b = RegistryBuilder::new();
        let t1 = b.register_type(TypeSpec::new("t1")).unwrap();
        let t2 = b.register_type(TypeSpec::new("t2")).unwrap();
        let t3 = b.register_type(TypeSpec::new("t3")).unwrap();
        let t4 = b.register_type(TypeSpec::new("t4")).unwrap();
        let id = |v: &Value| Some(v.datum().clone());
        b.register_conversion(t1, t2, id).unwrap();
        b.register_conversion(t2, t3, id).unwrap();
        b.register_conversion(t3, t4, id).unwrap();
        let reg = b.freeze();
        assert!(reg.find_converter(t1, t3).is_some());
        assert!(reg.find_converter(t2, t4).is_some());
        assert!(reg.find_converter(t1, t4).is_none());
    }

    #[test]
    fn test_sk003_existing_edge_not_overwritten() {
        let (mut b, a, bb, c) = abc();
        b.register_conversion(a, bb, |_: &Value| Some(Datum::Int(1)))
            .unwrap();
        b.register_conversion(bb, c, |_: &Value| Some(Datum::Int(2)))
            .unwrap();
        b.register_conversion(a, c, |_: &Value| Some(Datum::Int(3)))
            .unwrap();
        let reg = b.freeze();
        let x = Value::new(a, Datum::Int(0));
        assert_eq!(reg.convert_from(&x, a, c), Some(Value::new(c, Datum::Int(3))));
        assert!(!reg.find_converter(a, c).unwrap().is_chained());
    }

    #[test]
    fn test_sk003_reregistration_replaces() {
        let (mut b, a, bb, _) = abc();
        b.register_conversion(a, bb, |_: &Value| Some(Datum::Int(1)))
            .unwrap();
        b.register_conversion(a, bb, |_: &Value| Some(Datum::Int(2)))
            .unwrap();
        let reg = b.freeze();
        let x = Value::new(a, Datum::Int(0));
        assert_eq!(reg.convert_from(&x, a, bb), Some(Value::new(bb, Datum::Int(2))));
    }

    #[test]
    fn test_sk003_assignable_source_edge() {
        let mut b = RegistryBuilder::new();
        let animal = b.register_type(TypeSpec::new("animal")).unwrap();
        let dog = b
            .register_type(TypeSpec::new("dog").parent(animal))
            .unwrap();
        let text = b.register_type(TypeSpec::new("label")).unwrap();
        b.register_conversion(animal, text, |v: &Value| Some(v.datum().clone()))
            .unwrap();
        let reg = b.freeze();
        let rex = Value::new(dog, Datum::Text("rex".into()));
        assert_eq!(
            reg.convert(&rex, text),
            Some(Value::new(text, Datum::Text("rex".into())))
        );
    }
}
