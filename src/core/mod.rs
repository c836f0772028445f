//! Engine core: type model, syntax matching, operation trees, loading.

pub mod compare;
pub mod convert;
pub mod engine;
pub mod executor;
pub mod expr;
pub mod loader;
pub mod matcher;
pub mod parser;
pub mod pattern;
pub mod registry;
pub mod types;
pub mod variables;
