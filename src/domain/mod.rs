//! Script engine: value model, grammar, builder, evaluator and validation.

pub mod value;
pub mod syntax;
pub mod grammar;
pub mod statement;
pub mod builder;
pub mod environment;
pub mod contract;
pub mod evaluator;
pub mod engine;
pub mod request;
pub mod sweep;
pub mod session;
pub mod config_validation;
pub mod error;
