//! Statements produced by the AST builder and consumed by the evaluator.

use crate::domain::value::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assignment {
        variable: String,
        value: Value,
    },
    Call {
        command: String,
        arguments: Vec<Value>,
    },
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assignment { variable, value } => write!(f, "${} = {}", variable, value),
            Statement::Call { command, arguments } => {
                write!(f, "{}", command)?;
                for (i, argument) in arguments.iter().enumerate() {
                    let separator = if i == 0 { " " } else { ", " };
                    write!(f, "{}{}", separator, argument)?;
                }
                Ok(())
            }
        }
    }
}
