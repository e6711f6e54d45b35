//! CLI command implementations.

pub(crate) mod export;
pub(crate) mod fetch;
