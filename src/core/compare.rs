//! SK-004: Comparator registry.
//!
//! Lookup order for operands of types `(t1, t2)`:
//! 1. a comparator accepting `(t1, t2)` (exact or assignable);
//! 2. identical exact types with no such comparator: structural equality;
//! 3. a comparator registered for the swapped pair, result switched;
//! 4. a comparator reachable by converting one or both operands;
//! 5. a conversion from one operand's type to the other's, then structural equality.
//!
//! Structural equality never yields an ordering.

use super::convert::{ConversionGraph, Converter};
use super::registry::TypeTable;
use super::types::{Relation, TypeId, Value};
use std::fmt;
use std::sync::Arc;

pub type CompareFn = Arc<dyn Fn(&Value, &Value) -> Relation + Send + Sync>;

#[derive(Clone)]
pub struct Comparator {
    t1: TypeId,
    t2: TypeId,
    supports_ordering: bool,
    f: CompareFn,
}

impl Comparator {
    pub fn types(&self) -> (TypeId, TypeId) {
        (self.t1, self.t2)
    }

    pub fn supports_ordering(&self) -> bool {
        self.supports_ordering
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator")
            .field("t1", &self.t1)
            .field("t2", &self.t2)
            .field("supports_ordering", &self.supports_ordering)
            .finish()
    }
}

/// How two operand types get compared.
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Direct(&'a Comparator),
    Swapped(&'a Comparator),
    Converted {
        comparator: &'a Comparator,
        first: Option<&'a Converter>,
        second: Option<&'a Converter>,
        swapped: bool,
    },
    Structural {
        first: Option<&'a Converter>,
        second: Option<&'a Converter>,
    },
}

impl Resolution<'_> {
    pub fn supports_ordering(&self) -> bool {
        match self {
            Self::Direct(c) | Self::Swapped(c) => c.supports_ordering,
            Self::Converted { comparator, .. } => comparator.supports_ordering,
            Self::Structural { .. } => false,
        }
    }

    /// `None` when an operand conversion fails at runtime.
    pub fn apply(&self, v1: &Value, v2: &Value) -> Option<Relation> {
        match self {
            Self::Direct(c) => Some((c.f)(v1, v2)),
            Self::Swapped(c) => Some((c.f)(v2, v1).switched()),
            Self::Converted {
                comparator,
                first,
                second,
                swapped,
            } => {
                let a = convert_operand(*first, v1)?;
                let b = convert_operand(*second, v2)?;
                if *swapped {
                    Some((comparator.f)(&b, &a).switched())
                } else {
                    Some((comparator.f)(&a, &b))
                }
            }
            Self::Structural { first, second } => {
                let a = convert_operand(*first, v1)?;
                let b = convert_operand(*second, v2)?;
                Some(structural(&a, &b))
            }
        }
    }
}

fn convert_operand(conv: Option<&Converter>, v: &Value) -> Option<Value> {
    match conv {
        Some(c) => c.apply(v),
        None => Some(v.clone()),
    }
}

/// Fallback for identical exact types without a comparator.
pub fn structural(v1: &Value, v2: &Value) -> Relation {
    if v1 == v2 {
        Relation::Equal
    } else {
        Relation::NotEqual
    }
}

#[derive(Clone, Default, Debug)]
pub struct ComparatorRegistry {
    entries: Vec<Comparator>,
}

impl ComparatorRegistry {
    /// Register (or replace) the comparator for `(t1, t2)`.
    pub fn register(&mut self, t1: TypeId, t2: TypeId, supports_ordering: bool, f: CompareFn) {
        let comparator = Comparator {
            t1,
            t2,
            supports_ordering,
            f,
        };
        match self.entries.iter_mut().find(|c| c.t1 == t1 && c.t2 == t2) {
            Some(existing) => *existing = comparator,
            None => self.entries.push(comparator),
        }
    }

    fn direct(&self, types: &TypeTable, t1: TypeId, t2: TypeId) -> Option<&Comparator> {
        self.entries
            .iter()
            .find(|c| types.is_assignable(t1, c.t1) && types.is_assignable(t2, c.t2))
    }

    /// Resolve how `(t1, t2)` operands are compared, excluding the
    /// identical-type structural fallback.
    pub fn find<'a>(
        &'a self,
        types: &TypeTable,
        conversions: &'a ConversionGraph,
        t1: TypeId,
        t2: TypeId,
    ) -> Option<Resolution<'a>> {
        if let Some(c) = self.direct(types, t1, t2) {
            return Some(Resolution::Direct(c));
        }
        if let Some(c) = self.direct(types, t2, t1) {
            return Some(Resolution::Swapped(c));
        }

        let path = |from: TypeId, to: TypeId| -> Option<Option<&'a Converter>> {
            if types.is_assignable(from, to) {
                Some(None)
            } else {
                conversions.find(types, from, to).map(Some)
            }
        };

        for c in &self.entries {
            if let (Some(first), Some(second)) = (path(t1, c.t1), path(t2, c.t2)) {
                return Some(Resolution::Converted {
                    comparator: c,
                    first,
                    second,
                    swapped: false,
                });
            }
            if let (Some(first), Some(second)) = (path(t1, c.t2), path(t2, c.t1)) {
                return Some(Resolution::Converted {
                    comparator: c,
                    first,
                    second,
                    swapped: true,
                });
            }
        }

        if let Some(conv) = conversions.find(types, t1, t2) {
            return Some(Resolution::Structural {
                first: Some(conv),
                second: None,
            });
        }
        if let Some(conv) = conversions.find(types, t2, t1) {
            return Some(Resolution::Structural {
                first: None,
                second: Some(conv),
            });
        }
        None
    }

    /// Compare two runtime values by their exact types.
    pub fn compare(
        &self,
        types: &TypeTable,
        conversions: &ConversionGraph,
        v1: &Value,
        v2: &Value,
    ) -> Relation {
        let (t1, t2) = (v1.ty(), v2.ty());
        if let Some(c) = self.direct(types, t1, t2) {
            return (c.f)(v1, v2);
        }
        if t1 == t2 {
            return structural(v1, v2);
        }
        self.find(types, conversions, t1, t2)
            .and_then(|r| r.apply(v1, v2))
            .unwrap_or(Relation::NotEqual)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::core::registry::{RegistryBuilder, TypeSpec};
    use crate::core::types::{Datum, Relation, TypeId, Value};

    fn num(v: &Value) -> f64 {
        v.datum().as_f64().unwrap_or(f64::NAN)
    }

    fn numeric(a: &Value, b: &Value) -> Relation {
        num(a)
            .partial_cmp(&num(b))
            .map(Relation::from_ordering)
            .unwrap_or(Relation::NotEqual)
    }

    fn two_types() -> (RegistryBuilder, TypeId, TypeId) {
        let mut b = RegistryBuilder::new();
        let meters = b.register_type(TypeSpec::new("meters")).unwrap();
        let feet = b.register_type(TypeSpec::new("feet")).unwrap();
        (b, meters, feet)
    }

    #[test]
    fn test_sk004_direct_and_swapped() {
        let (mut b, m, f) = two_types();
        // meters vs feet: compare meters against feet converted to meters
        b.register_comparator(m, f, true, |a: &Value, b: &Value| {
            let feet_in_m = num(b) * 0.3048;
            num(a)
                .partial_cmp(&feet_in_m)
                .map(Relation::from_ordering)
                .unwrap_or(Relation::NotEqual)
        })
        .unwrap();
        let reg = b.freeze();
        let one_m = Value::new(m, Datum::Float(1.0));
        let one_ft = Value::new(f, Datum::Float(1.0));
        assert_eq!(reg.compare(&one_m, &one_ft), Relation::Greater);
        assert_eq!(reg.compare(&one_ft, &one_m), Relation::Smaller);
    }

    #[test]
    fn test_sk004_structural_fallback_never_orders() {
        let (b, m, _) = two_types();
        let reg = b.freeze();
        let a = Value::new(m, Datum::Int(1));
        let same = Value::new(m, Datum::Int(1));
        let other = Value::new(m, Datum::Int(7));
        assert_eq!(reg.compare(&a, &same), Relation::Equal);
        assert_eq!(reg.compare(&a, &other), Relation::NotEqual);
        assert_eq!(reg.compare(&other, &a), Relation::NotEqual);
    }

    #[test]
    fn test_sk004_structural_wins_over_converted_for_identical_types() {
        let (mut b, m, f) = two_types();
        b.register_conversion(m, f, |v: &Value| Some(v.datum().clone()))
            .unwrap();
        b.register_comparator(f, f, true, numeric).unwrap();
        let reg = b.freeze();
        let a = Value::new(m, Datum::Int(1));
        let c = Value::new(m, Datum::Int(9));
        assert_eq!(reg.compare(&a, &c), Relation::NotEqual);
    }

    #[test]
    fn test_sk004_converted_operand() {
        let (mut b, m, f) = two_types();
        b.register_conversion(f, m, |v: &Value| {
            v.datum().as_f64().map(|x| Datum::Float(x * 0.3048))
        })
        .unwrap();
        b.register_comparator(m, m, true, numeric).unwrap();
        let reg = b.freeze();
        let ten_ft = Value::new(f, Datum::Float(10.0));
        let two_m = Value::new(m, Datum::Float(2.0));
        assert_eq!(reg.compare(&ten_ft, &two_m), Relation::Greater);
        assert_eq!(reg.compare(&two_m, &ten_ft), Relation::Smaller);
    }

    #[test]
    fn test_sk004_conversion_then_structural() {
        let (mut b, m, f) = two_types();
        b.register_conversion(f, m, |v: &Value| Some(v.datum().clone()))
            .unwrap();
        let reg = b.freeze();
        let a = Value::new(f, Datum::Int(3));
        let c = Value::new(m, Datum::Int(3));
        assert_eq!(reg.compare(&a, &c), Relation::Equal);
        assert!(!reg.supports_ordering(f, m));
    }

    #[test]
    fn test_sk004_unrelated_types_not_equal() {
        let (b, m, f) = two_types();
        let reg = b.freeze();
        let a = Value::new(m, Datum::Int(3));
        let c = Value::new(f, Datum::Int(3));
        assert_eq!(reg.compare(&a, &c), Relation::NotEqual);
        assert!(!reg.may_compare(m, f));
    }
}
