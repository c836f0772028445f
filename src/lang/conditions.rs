//! SK-022: Stock conditions: comparisons and `is set`.

use super::types::StockTypes;
use crate::core::executor::{Condition, Frame, RuntimeError};
use crate::core::expr::Expr;
use crate::core::registry::{Registry, RegistryBuilder, RegistryError};
use crate::core::types::{with_article, Relation, Value};

/// `is`, `are`, `is not`, `isn't`... with mark 1 when negated.
const NEGATABLE: &str = "(is [1¦not]|are [1¦not]|1¦isn't|1¦aren't)";

// ============================================================================
// Comparison
// ============================================================================

pub struct Compare {
    left: Expr,
    relation: Relation,
    right: Expr,
    negated: bool,
}

impl Condition for Compare {
    /// Every left value must relate to the right side (all of an "and"
    /// list, any of an "or" list). An empty side never matches.
    fn check(&self, frame: &Frame<'_>) -> Result<bool, RuntimeError> {
        let registry = frame.registry();
        let right = self.right.evaluate_all(frame)?;
        if right.is_empty() {
            return Ok(false);
        }
        let all = self.right.is_conjunctive();
        self.left.check(frame, self.negated, |l| {
            let holds = |r: &Value| {
                self.relation.is_satisfied_by(registry.compare(l, r))
            };
            if all {
                right.iter().all(holds)
            } else {
                right.iter().any(holds)
            }
        })
    }

    fn describe(&self, registry: &Registry) -> String {
        format!(
            "{} is {}{} {}",
            self.left.describe(registry),
            if self.negated { "not " } else { "" },
            self.relation,
            self.right.describe(registry)
        )
    }
}

fn comparison_patterns() -> Vec<(String, Relation)> {
    let greater = "(greater|more|higher|bigger|larger)";
    let smaller = "(less|smaller|lower)";
    vec![
        (
            format!("%objects% {NEGATABLE} {greater} than or equal to %objects%"),
            Relation::GreaterOrEqual,
        ),
        (
            format!("%objects% {NEGATABLE} {smaller} than or equal to %objects%"),
            Relation::SmallerOrEqual,
        ),
        (
            format!("%objects% {NEGATABLE} {greater} than %objects%"),
            Relation::Greater,
        ),
        (
            format!("%objects% {NEGATABLE} {smaller} than %objects%"),
            Relation::Smaller,
        ),
        ("%objects% >= %objects%".into(), Relation::GreaterOrEqual),
        ("%objects% \\<= %objects%".into(), Relation::SmallerOrEqual),
        ("%objects% (!=|\\<>) %objects%".into(), Relation::NotEqual),
        ("%objects% =[=] %objects%".into(), Relation::Equal),
        ("%objects% > %objects%".into(), Relation::Greater),
        ("%objects% \\< %objects%".into(), Relation::Smaller),
        (
            format!("%objects% {NEGATABLE} [equal to] %objects%"),
            Relation::Equal,
        ),
    ]
}

// ============================================================================
// Set
// ============================================================================

pub struct IsSet {
    expr: Expr,
    negated: bool,
}

impl Condition for IsSet {
    fn check(&self, frame: &Frame<'_>) -> Result<bool, RuntimeError> {
        let set = !self.expr.evaluate_all(frame)?.is_empty();
        Ok(set != self.negated)
    }

    fn describe(&self, registry: &Registry) -> String {
        format!(
            "{} is {}set",
            self.expr.describe(registry),
            if self.negated { "not " } else { "" }
        )
    }
}

// ============================================================================
// Registration
// ============================================================================

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    StockTypes::lookup(b)?;

    let set_pattern = format!("%objects% {NEGATABLE} set");
    b.register_condition("is set", &[set_pattern.as_str()], |mut op, _| {
        let expr = op.take_expr(0).ok_or("is set needs a value")?;
        Ok(Box::new(IsSet {
            expr,
            negated: op.mark() & 1 == 1,
        }) as Box<dyn Condition>)
    })?;

    let rows = comparison_patterns();
    let relations: Vec<Relation> = rows.iter().map(|(_, r)| *r).collect();
    let patterns: Vec<&str> = rows.iter().map(|(p, _)| p.as_str()).collect();
    b.register_condition("compare", &patterns, move |mut op, ctx| {
        let relation = relations
            .get(op.pattern_index())
            .copied()
            .ok_or("unknown comparison")?;
        let left = op.take_expr(0).ok_or("missing left side")?;
        let right = op.take_expr(1).ok_or("missing right side")?;
        let (lt, rt) = (left.return_type(), right.return_type());
        let registry = ctx.registry;
        if !registry.may_compare(lt, rt) {
            return Err(format!(
                "{} can't be compared with {}",
                with_article(registry.type_name(lt)),
                with_article(registry.type_name(rt))
            ));
        }
        if relation.is_ordering() && !registry.supports_ordering(lt, rt) {
            return Err(format!(
                "{} can't be compared with {} by size",
                with_article(registry.type_name(lt)),
                with_article(registry.type_name(rt))
            ));
        }
        Ok(Box::new(Compare {
            left,
            relation,
            right,
            negated: op.mark() & 1 == 1,
        }) as Box<dyn Condition>)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::NullEvent;
    use crate::core::matcher::{parse_condition, BuildContext, ParseScope};
    use crate::core::types::Datum;
    use crate::core::variables::Variables;

    fn registry() -> (Registry, StockTypes) {
        let mut b = RegistryBuilder::new();
        super::super::types::register(&mut b).unwrap();
        super::super::expressions::register(&mut b).unwrap();
        register(&mut b).unwrap();
        let stock = StockTypes::lookup(&b).unwrap();
        (b.freeze(), stock)
    }

    fn parse(reg: &Registry, text: &str) -> Result<Box<dyn Condition>, String> {
        let scope = ParseScope::default();
        let ctx = BuildContext::new(reg, &scope);
        parse_condition(text, &ctx)
            .map(|p| p.value)
            .map_err(|d| d.message)
    }

    fn holds(reg: &Registry, globals: &mut Variables, text: &str) -> bool {
        let condition = parse(reg, text).unwrap();
        let mut event = NullEvent;
        let frame = Frame::new(reg, &mut event, globals, 0);
        condition.check(&frame).unwrap()
    }

    #[test]
    fn test_sk022_numeric_relations() {
        let (reg, _) = registry();
        let mut g = Variables::default();
        assert!(holds(&reg, &mut g, "3 is greater than 2"));
        assert!(!holds(&reg, &mut g, "3 is not greater than 2"));
        assert!(holds(&reg, &mut g, "2 is less than or equal to 2"));
        assert!(holds(&reg, &mut g, "2 >= 2"));
        assert!(holds(&reg, &mut g, "1 < 2.5"));
        assert!(holds(&reg, &mut g, "2 + 2 = 4"));
        assert!(holds(&reg, &mut g, "4 != 5"));
        assert!(holds(&reg, &mut g, "4 isn't 5"));
    }

    #[test]
    fn test_sk022_list_semantics() {
        let (reg, _) = registry();
        let mut g = Variables::default();
        assert!(holds(&reg, &mut g, "3 is 1, 2 or 3"));
        assert!(!holds(&reg, &mut g, "3 is 1, 2 and 3"));
        assert!(holds(&reg, &mut g, "4 and 5 are greater than 3"));
        assert!(!holds(&reg, &mut g, "4 and 2 are greater than 3"));
        assert!(holds(&reg, &mut g, "4 or 2 is greater than 3"));
    }

    #[test]
    fn test_sk022_text_equality_ignores_case() {
        let (reg, _) = registry();
        let mut g = Variables::default();
        assert!(holds(&reg, &mut g, "\"Hello\" is \"hello\""));
        let err = parse(&reg, "\"a\" is greater than \"b\"").err().unwrap();
        assert_eq!(err, "a text can't be compared with a text by size");
    }

    #[test]
    fn test_sk022_unset_operands_never_match() {
        let (reg, _) = registry();
        let mut g = Variables::default();
        assert!(!holds(&reg, &mut g, "{nothing} is 1"));
        assert!(!holds(&reg, &mut g, "{nothing} is not 1"));
        assert!(!holds(&reg, &mut g, "1 is {nothing}"));
    }

    #[test]
    fn test_sk022_is_set() {
        let (reg, stock) = registry();
        let mut g = Variables::default();
        assert!(holds(&reg, &mut g, "{x} is not set"));
        g.set("x", vec![Value::new(stock.number, Datum::Int(1))]);
        assert!(holds(&reg, &mut g, "{x} is set"));
        assert!(!holds(&reg, &mut g, "{x} isn't set"));
        assert!(holds(&reg, &mut g, "{x} is 1"));
    }
}
