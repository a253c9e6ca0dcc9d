//! CLI command implementations.

pub(crate) mod inspect;
pub(crate) mod replay;
pub(crate) mod synth;
