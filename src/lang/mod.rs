//! Default vocabulary: stock types, expressions, conditions, effects, events.

pub mod conditions;
pub mod effects;
pub mod events;
pub mod expressions;
pub mod types;

use crate::core::parser::EngineConfig;
use crate::core::registry::{Registry, RegistryBuilder, RegistryError};

/// A builder with the whole default vocabulary registered. Hosts add their
/// own syntax to it before freezing.
pub fn builder() -> Result<RegistryBuilder, RegistryError> {
    let mut b = RegistryBuilder::new();
    types::register(&mut b)?;
    expressions::register(&mut b)?;
    conditions::register(&mut b)?;
    effects::register(&mut b)?;
    events::register(&mut b)?;
    Ok(b)
}

/// Default vocabulary plus the host events declared in `config`, frozen.
pub fn registry(config: &EngineConfig) -> Result<Registry, RegistryError> {
    let mut b = builder()?;
    events::register_declared(&mut b, &config.events)?;
    Ok(b.freeze())
}
