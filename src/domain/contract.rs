//! Call contracts and argument validation.
//!
//! A contract lists the argument shapes a command accepts, in order. The first
//! `required` shapes are mandatory and the rest are optional trailing arguments,
//! so the arity range is `[required, parameters.len()]`. Validation only checks;
//! handlers always receive the arguments exactly as written.

use crate::domain::error::ScriptError;
use crate::domain::value::{
    MINUTES_PER_DAY, ParameterValue, SpecialKeyword, Symbol, TimeParameter, Value,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentShape {
    /// A symbol or a symbol array.
    Symbols,
    /// Start of a time range; defaults to `first`.
    From,
    /// End of a time range; defaults to `last`.
    To,
    TimeFrame,
    Text,
    Parameters,
}

impl ArgumentShape {
    fn describe(self) -> &'static str {
        match self {
            ArgumentShape::Symbols => "a symbol or symbol array",
            ArgumentShape::From | ArgumentShape::To => "a time or an offset",
            ArgumentShape::TimeFrame => "a time frame",
            ArgumentShape::Text => "a string",
            ArgumentShape::Parameters => "a parameter block",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContract {
    pub name: &'static str,
    pub parameters: &'static [ArgumentShape],
    pub required: usize,
}

const HISTORY_SHAPES: &[ArgumentShape] = &[
    ArgumentShape::Symbols,
    ArgumentShape::From,
    ArgumentShape::To,
    ArgumentShape::TimeFrame,
];

const CORRELATION_SHAPES: &[ArgumentShape] =
    &[ArgumentShape::Symbols, ArgumentShape::From, ArgumentShape::To];

const BACKTEST_SHAPES: &[ArgumentShape] = &[
    ArgumentShape::Text,
    ArgumentShape::Symbols,
    ArgumentShape::From,
    ArgumentShape::To,
    ArgumentShape::TimeFrame,
    ArgumentShape::Parameters,
];

pub const CANDLE: CommandContract = CommandContract {
    name: "candle",
    parameters: HISTORY_SHAPES,
    required: 1,
};

pub const PLOT: CommandContract = CommandContract {
    name: "plot",
    parameters: HISTORY_SHAPES,
    required: 1,
};

pub const CORRELATION: CommandContract = CommandContract {
    name: "correlation",
    parameters: CORRELATION_SHAPES,
    required: 1,
};

pub const BACKTEST: CommandContract = CommandContract {
    name: "backtest",
    parameters: BACKTEST_SHAPES,
    required: 2,
};

pub const TIMEZONE: CommandContract = CommandContract {
    name: "timezone",
    parameters: &[ArgumentShape::Text],
    required: 1,
};

impl CommandContract {
    pub fn min_arity(&self) -> usize {
        self.required
    }

    pub fn max_arity(&self) -> usize {
        self.parameters.len()
    }

    /// The argument in the position declared for `shape`, if it was supplied.
    pub fn argument<'v>(&self, shape: ArgumentShape, arguments: &'v [Value]) -> Option<&'v Value> {
        let index = self.parameters.iter().position(|s| *s == shape)?;
        arguments.get(index)
    }

    pub fn validate(&self, arguments: &[Value]) -> Result<(), ScriptError> {
        let found = arguments.len();
        if found < self.min_arity() || found > self.max_arity() {
            return Err(ScriptError::Arity {
                command: self.name.to_string(),
                min: self.min_arity(),
                max: self.max_arity(),
                found,
            });
        }

        for (index, (shape, argument)) in self.parameters.iter().zip(arguments).enumerate() {
            let position = index + 1;
            match shape {
                ArgumentShape::Symbols => validate_symbols(self.name, position, argument)?,
                ArgumentShape::From | ArgumentShape::To => {
                    if !matches!(argument, Value::TimeParameter(_) | Value::Offset(_)) {
                        return Err(mismatch(self.name, position, shape.describe(), argument));
                    }
                }
                ArgumentShape::TimeFrame => validate_time_frame(self.name, position, argument)?,
                ArgumentShape::Text => {
                    if !matches!(argument, Value::StringLiteral(_)) {
                        return Err(mismatch(self.name, position, shape.describe(), argument));
                    }
                }
                ArgumentShape::Parameters => validate_parameters(self.name, position, argument)?,
            }
        }

        if let Some(from_index) = self
            .parameters
            .iter()
            .position(|s| *s == ArgumentShape::From)
        {
            let first = Value::TimeParameter(TimeParameter::Special(SpecialKeyword::First));
            let last = Value::TimeParameter(TimeParameter::Special(SpecialKeyword::Last));
            let from = self.argument(ArgumentShape::From, arguments).unwrap_or(&first);
            let to = self.argument(ArgumentShape::To, arguments).unwrap_or(&last);
            validate_time_range(self.name, from_index + 1, from, to)?;
        }
        Ok(())
    }
}

fn mismatch(command: &str, index: usize, expected: &str, found: &Value) -> ScriptError {
    ScriptError::TypeMismatch {
        command: command.to_string(),
        index,
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

/// Two or more uppercase letters and digits with at least one letter, or `all`.
pub fn is_valid_symbol(symbol: &Symbol) -> bool {
    if symbol.is_all() {
        return true;
    }
    let name = &symbol.name;
    name.len() >= 2
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && name.chars().any(|c| c.is_ascii_uppercase())
}

/// A single symbol or an array made only of symbols.
pub fn validate_symbols(command: &str, index: usize, value: &Value) -> Result<(), ScriptError> {
    let valid = match value {
        Value::Symbol(symbol) => is_valid_symbol(symbol),
        Value::SymbolArray(elements) => elements.iter().all(|element| match element {
            Value::Symbol(symbol) => is_valid_symbol(symbol),
            _ => false,
        }),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(mismatch(
            command,
            index,
            ArgumentShape::Symbols.describe(),
            value,
        ))
    }
}

/// At least two time-describing arguments, at least one of them absolute.
pub fn validate_time_range(
    command: &str,
    index: usize,
    from: &Value,
    to: &Value,
) -> Result<(), ScriptError> {
    let mut concrete = 0;
    let mut offsets = 0;
    for value in [from, to] {
        match value {
            Value::TimeParameter(_) => concrete += 1,
            Value::Offset(_) => offsets += 1,
            _ => {}
        }
    }
    if concrete + offsets >= 2 && concrete >= 1 {
        return Ok(());
    }
    let found = if offsets == 2 {
        "two offsets".to_string()
    } else {
        format!("{} and {}", from.kind(), to.kind())
    };
    Err(ScriptError::TypeMismatch {
        command: command.to_string(),
        index,
        expected: "a time range with at least one absolute time".to_string(),
        found,
    })
}

pub fn validate_time_frame(command: &str, index: usize, value: &Value) -> Result<(), ScriptError> {
    match value {
        Value::TimeFrame(tf) if tf.is_valid() => Ok(()),
        Value::TimeFrame(tf) => Err(ScriptError::Range {
            command: command.to_string(),
            reason: format!(
                "time frame must be between 1 and {} minutes, got {}",
                MINUTES_PER_DAY,
                tf.minutes()
            ),
        }),
        other => Err(mismatch(
            command,
            index,
            ArgumentShape::TimeFrame.describe(),
            other,
        )),
    }
}

/// A parameter block whose sweeps have a positive step and `high >= low`.
pub fn validate_parameters(command: &str, index: usize, value: &Value) -> Result<(), ScriptError> {
    let Value::Parameters(parameters) = value else {
        return Err(mismatch(
            command,
            index,
            ArgumentShape::Parameters.describe(),
            value,
        ));
    };
    for parameter in parameters {
        if let ParameterValue::Range { low, high, step } = &parameter.value {
            if let Some(step) = step {
                if step.is_nan() || *step <= 0.0 {
                    return Err(ScriptError::Range {
                        command: command.to_string(),
                        reason: format!("{}: step must be positive, got {}", parameter.name, step),
                    });
                }
            }
            if let Some(high) = high {
                if high < low {
                    return Err(ScriptError::Range {
                        command: command.to_string(),
                        reason: format!(
                            "{}: upper bound {} is below lower bound {}",
                            parameter.name, high, low
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Contracts by command name.
#[derive(Debug, Clone, Default)]
pub struct ContractTable {
    contracts: HashMap<String, CommandContract>,
}

impl ContractTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in command set.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for contract in [CANDLE, PLOT, CORRELATION, BACKTEST, TIMEZONE] {
            table.insert(contract);
        }
        table
    }

    pub fn insert(&mut self, contract: CommandContract) {
        self.contracts.insert(contract.name.to_string(), contract);
    }

    pub fn get(&self, command: &str) -> Option<&CommandContract> {
        self.contracts.get(command)
    }

    /// Validate `arguments` against the contract for `command`. Commands
    /// without a contract are accepted as is.
    pub fn validate(&self, command: &str, arguments: &[Value]) -> Result<(), ScriptError> {
        match self.get(command) {
            Some(contract) => contract.validate(arguments),
            None => Ok(()),
        }
    }
}
