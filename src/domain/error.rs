//! Domain error types.

use crate::ports::handler_port::HandlerError;

/// A syntax error at the rightmost position the grammar could not advance past.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    /// 0-based byte offset into the source text.
    pub position: usize,
    /// Terminals the grammar would have accepted at `position`.
    pub expected: Vec<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
            expected: Vec::new(),
        }
    }

    /// 1-based line and column of the error position.
    pub fn line_column(&self, input: &str) -> (usize, usize) {
        let end = self.position.min(input.len());
        let consumed = &input[..end];
        let line = consumed.matches('\n').count() + 1;
        let line_start = consumed.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = consumed[line_start..].chars().count() + 1;
        (line, column)
    }

    /// Format the error with the offending line and a caret under the error position.
    pub fn display_with_context(&self, input: &str) -> String {
        let (line, column) = self.line_column(input);
        let text = input.lines().nth(line - 1).unwrap_or("");
        let caret = " ".repeat(column - 1) + "^";
        format!(
            "{line}:{column}: {err}\n{text}\n{caret}",
            line = line,
            column = column,
            err = self,
            text = text,
            caret = caret
        )
    }
}

/// Top-level error type for parsing, validating and running scripts.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("unknown command: {name}")]
    UnknownCommand { name: String },

    #[error("unknown variable: ${name}")]
    UnknownVariable { name: String },

    #[error("{command} takes {min} to {max} arguments, got {found}")]
    Arity {
        command: String,
        min: usize,
        max: usize,
        found: usize,
    },

    #[error("{command}: argument {index} must be {expected}, found {found}")]
    TypeMismatch {
        command: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("{command}: {reason}")]
    Range { command: String, reason: String },

    #[error("{command} failed: {source}")]
    Handler {
        command: String,
        #[source]
        source: HandlerError,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ScriptError {
    fn from(err: serde_json::Error) -> Self {
        ScriptError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<&ScriptError> for std::process::ExitCode {
    fn from(err: &ScriptError) -> Self {
        let code: u8 = match err {
            ScriptError::Io(_) => 1,
            ScriptError::ConfigParse { .. } | ScriptError::ConfigInvalid { .. } => 2,
            ScriptError::Syntax(_) => 3,
            ScriptError::UnknownCommand { .. }
            | ScriptError::UnknownVariable { .. }
            | ScriptError::Arity { .. }
            | ScriptError::TypeMismatch { .. }
            | ScriptError::Range { .. } => 4,
            ScriptError::Handler { .. } => 5,
            ScriptError::Serialization { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
