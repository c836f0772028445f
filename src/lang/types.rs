//! SK-020: Stock types: number, text, boolean.

use crate::core::registry::{RegistryBuilder, RegistryError, TypeSpec};
use crate::core::types::{Datum, Relation, TypeId, Value};

/// Ids of the stock types, looked up once per registration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockTypes {
    pub object: TypeId,
    pub number: TypeId,
    pub text: TypeId,
    pub boolean: TypeId,
}

impl StockTypes {
    pub fn lookup(b: &RegistryBuilder) -> Result<Self, RegistryError> {
        let id = |name: &str| {
            b.type_id(name)
                .ok_or_else(|| RegistryError::UnknownType(name.to_string()))
        };
        Ok(Self {
            object: id("object")?,
            number: id("number")?,
            text: id("text")?,
            boolean: id("boolean")?,
        })
    }
}

/// Integers stay exact; anything else finite becomes a float.
pub fn parse_number(s: &str) -> Option<Datum> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Datum::Int(n));
    }
    if !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .map(Datum::Float)
}

pub fn parse_boolean(s: &str) -> Option<Datum> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" => Some(Datum::Bool(true)),
        "false" | "no" | "off" => Some(Datum::Bool(false)),
        _ => None,
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Relation {
    let ordering = match (a.datum(), b.datum()) {
        (Datum::Int(x), Datum::Int(y)) => Some(x.cmp(y)),
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    };
    ordering.map_or(Relation::NotEqual, Relation::from_ordering)
}

/// Text equality ignores case; there is no text ordering.
fn compare_texts(a: &Value, b: &Value) -> Relation {
    match (a.datum().as_text(), b.datum().as_text()) {
        (Some(x), Some(y)) if x.to_lowercase() == y.to_lowercase() => Relation::Equal,
        _ => Relation::NotEqual,
    }
}

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    let number = b.register_type(TypeSpec::new("number").parser(parse_number))?;
    let text = b.register_type(TypeSpec::new("text"))?;
    let boolean = b.register_type(
        TypeSpec::new("boolean")
            .parser(parse_boolean)
            .printer(|d| match d.as_bool() {
                Some(true) => "true".into(),
                Some(false) => "false".into(),
                None => d.to_string(),
            }),
    )?;

    b.register_conversion(number, text, |v| Some(Datum::Text(v.datum().to_string())))?;
    b.register_conversion(boolean, text, |v| {
        v.datum().as_bool().map(|x| Datum::Text(x.to_string()))
    })?;

    b.register_comparator(number, number, true, compare_numbers)?;
    b.register_comparator(text, text, false, compare_texts)?;
    tracing::trace!("stock types registered");
    Ok(())
}
