//! SK-024: Stock events.
//!
//! `load`/`unload` fire around script installation. Host events come from
//! the `events:` section of the engine config; any placeholder in their
//! patterns becomes a filter on the event value of the same type.

use super::types::StockTypes;
use crate::core::engine::{LOAD_EVENT, UNLOAD_EVENT};
use crate::core::executor::{EventContext, EventFilter};
use crate::core::matcher::{BuildContext, ParsedOperation};
use crate::core::parser::EventDecl;
use crate::core::registry::{Registry, RegistryBuilder, RegistryError};
use crate::core::types::{Relation, TypeId, Value};

/// Accepts an occurrence whose event values equal the literals written in
/// the trigger header. Several literals of one slot are alternatives.
pub struct LiteralFilter {
    checks: Vec<(String, Vec<Value>)>,
}

impl EventFilter for LiteralFilter {
    fn matches(&self, event: &dyn EventContext, registry: &Registry) -> bool {
        self.checks.iter().all(|(key, wanted)| {
            event.event_value(key).is_some_and(|actual| {
                wanted
                    .iter()
                    .any(|w| registry.compare(&actual, w) == Relation::Equal)
            })
        })
    }
}

fn build_filter(
    op: &ParsedOperation,
    ctx: &BuildContext<'_>,
    values: &[(String, TypeId)],
) -> Result<Option<Box<dyn EventFilter>>, String> {
    let mut checks = Vec::new();
    for slot in 0..op.slot_count() {
        let Some(expr) = op.expr(slot) else {
            continue;
        };
        let literals = expr.literal_values().ok_or_else(|| {
            format!(
                "event filters must be literal values, not {}",
                expr.describe(ctx.registry)
            )
        })?;
        let ty = expr.return_type();
        let key = values
            .iter()
            .find(|(_, t)| ctx.registry.is_assignable(ty, *t))
            .map(|(k, _)| k.clone())
            .ok_or_else(|| {
                format!(
                    "{} event has no value to compare {} with",
                    op.text(),
                    expr.describe(ctx.registry)
                )
            })?;
        checks.push((key, literals.to_vec()));
    }
    if checks.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Box::new(LiteralFilter { checks })))
    }
}

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    StockTypes::lookup(b)?;
    b.register_event(LOAD_EVENT, &["[script] load[ing]"], &[], |_, _| Ok(None))?;
    b.register_event(UNLOAD_EVENT, &["[script] unload[ing]"], &[], |_, _| Ok(None))?;
    Ok(())
}

/// Register the host events declared in the engine config.
pub fn register_declared(b: &mut RegistryBuilder, decls: &[EventDecl]) -> Result<(), RegistryError> {
    for decl in decls {
        let values = decl
            .values
            .iter()
            .map(|(key, type_name)| {
                b.type_id(type_name)
                    .map(|t| (key.to_lowercase(), t))
                    .ok_or_else(|| RegistryError::UnknownType(type_name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let keyed: Vec<(&str, TypeId)> = values.iter().map(|(k, t)| (k.as_str(), *t)).collect();
        let patterns: Vec<&str> = decl.patterns.iter().map(String::as_str).collect();

        let filter_values = values.clone();
        b.register_event(&decl.name, &patterns, &keyed, move |op, ctx| {
            build_filter(&op, ctx, &filter_values)
        })?;
        tracing::debug!(event = %decl.name, values = values.len(), "host event declared");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::HostEvent;
    use crate::core::matcher::parse_event;
    use crate::core::types::Datum;
    use indexmap::IndexMap;

    fn decl(name: &str, patterns: &[&str], values: &[(&str, &str)]) -> EventDecl {
        EventDecl {
            name: name.into(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<IndexMap<_, _>>(),
        }
    }

    fn registry(decls: &[EventDecl]) -> (Registry, StockTypes) {
        let mut b = RegistryBuilder::new();
        super::super::types::register(&mut b).unwrap();
        register(&mut b).unwrap();
        register_declared(&mut b, decls).unwrap();
        let stock = StockTypes::lookup(&b).unwrap();
        (b.freeze(), stock)
    }

    #[test]
    fn test_sk024_script_events() {
        let (reg, _) = registry(&[]);
        assert_eq!(parse_event("script load", &reg).unwrap().value.event, "load");
        assert_eq!(parse_event("unloading", &reg).unwrap().value.event, "unload");
    }

    #[test]
    fn test_sk024_declared_event_values() {
        let decls = [decl(
            "join",
            &["[player] join[ing]"],
            &[("Name", "text"), ("level", "number")],
        )];
        let (reg, stock) = registry(&decls);
        let matched = parse_event("player join", &reg).unwrap().value;
        assert_eq!(matched.event, "join");
        assert_eq!(
            matched.values,
            vec![("name".to_string(), stock.text), ("level".to_string(), stock.number)]
        );
        assert!(matched.filter.is_none());
    }

    #[test]
    fn test_sk024_literal_filter() {
        let decls = [decl("tick", &["tick [%-numbers%]"], &[("count", "number")])];
        let (reg, stock) = registry(&decls);
        let filter = parse_event("tick 2 or 3", &reg).unwrap().value.filter.unwrap();

        let at = |n: i64| {
            HostEvent::new("tick").with_value("count", Value::new(stock.number, Datum::Int(n)))
        };
        assert!(filter.matches(&at(3), &reg));
        assert!(!filter.matches(&at(4), &reg));
        assert!(!filter.matches(&HostEvent::new("tick"), &reg));
    }

    #[test]
    fn test_sk024_filter_with_escaped_percent() {
        let decls = [decl(
            "charge",
            &["charge %-number% \\% %-text%"],
            &[("count", "number"), ("label", "text")],
        )];
        let (reg, stock) = registry(&decls);
        let filter = parse_event("charge 5 % \"x\"", &reg)
            .unwrap()
            .value
            .filter
            .unwrap();

        let at = |label: &str| {
            HostEvent::new("charge")
                .with_value("count", Value::new(stock.number, Datum::Int(5)))
                .with_value("label", Value::new(stock.text, Datum::Text(label.into())))
        };
        assert!(filter.matches(&at("x"), &reg));
        assert!(!filter.matches(&at("y"), &reg));
    }

    #[test]
    fn test_sk024_unknown_value_type() {
        let mut b = RegistryBuilder::new();
        super::super::types::register(&mut b).unwrap();
        let err = register_declared(&mut b, &[decl("x", &["x"], &[("v", "colour")])])
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownType(t) if t == "colour"));
    }
}
