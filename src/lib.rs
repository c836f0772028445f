//! Skein: a trigger scripting engine.
//!
//! Scripts bind indented operation trees to host events. Every line is
//! matched against registered syntax patterns; values flow through a typed
//! conversion graph and comparator registry.

pub mod cli;
pub mod core;
pub mod lang;
pub mod logging;
