//! unquantified: a scripting engine for financial data queries.
//!
//! Hexagonal architecture: the engine in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], and the `unq` front end in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
