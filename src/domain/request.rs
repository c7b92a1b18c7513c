//! Backend request shapes.
//!
//! Validated call arguments are turned into the JSON requests the market-data
//! backend expects. Omitted trailing arguments take their defaults here: `from`
//! is `first`, `to` is `last` and the time frame is daily.

use crate::domain::contract::{ArgumentShape, CommandContract};
use crate::domain::error::ScriptError;
use crate::domain::value::{
    OffsetUnit, Parameter, ParameterValue, SpecialKeyword, TimeFrame, TimeParameter, Value,
    ALL_SYMBOLS,
};
use serde::{Deserialize, Serialize};

/// Wall-clock layout used for concrete dates on the wire.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A point in time as the backend understands it. Exactly one of `date`,
/// `offset` with `offset_unit`, or `special_keyword` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelativeDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_unit: Option<OffsetUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_keyword: Option<SpecialKeyword>,
}

impl RelativeDateTime {
    pub fn special(keyword: SpecialKeyword) -> Self {
        Self {
            date: None,
            offset: None,
            offset_unit: None,
            special_keyword: Some(keyword),
        }
    }

    /// `None` unless `value` is a time or an offset.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimeParameter(TimeParameter::Concrete(time)) => Some(Self {
                date: Some(time.naive_local().format(DATE_FORMAT).to_string()),
                offset: None,
                offset_unit: None,
                special_keyword: None,
            }),
            Value::TimeParameter(TimeParameter::Special(keyword)) => Some(Self::special(*keyword)),
            Value::Offset(offset) => Some(Self {
                date: None,
                offset: Some(offset.magnitude),
                offset_unit: Some(offset.unit),
                special_keyword: None,
            }),
            _ => None,
        }
    }
}

/// Wire form of one backtest parameter; exactly one value field is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
}

impl From<&Parameter> for ParameterRequest {
    fn from(parameter: &Parameter) -> Self {
        let mut request = ParameterRequest {
            name: parameter.name.clone(),
            ..Default::default()
        };
        match &parameter.value {
            ParameterValue::Numeric(n) => request.value = Some(*n),
            ParameterValue::NumericList(values) => request.values = Some(values.clone()),
            ParameterValue::Range { low, high, step } => {
                request.low = Some(*low);
                request.high = *high;
                request.step = *step;
            }
            ParameterValue::StringList(values) => request.string_values = Some(values.clone()),
            ParameterValue::Bool(b) => request.bool_value = Some(*b),
            ParameterValue::Text(s) => request.string_value = Some(s.clone()),
        }
        request
    }
}

/// Request for `candle` and `plot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub symbols: Vec<String>,
    pub from: RelativeDateTime,
    pub to: RelativeDateTime,
    pub time_frame: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationRequest {
    pub symbols: Vec<String>,
    pub from: RelativeDateTime,
    pub to: RelativeDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
    pub strategy: String,
    pub symbols: Vec<String>,
    pub from: RelativeDateTime,
    pub to: RelativeDateTime,
    pub time_frame: u32,
    pub parameters: Vec<ParameterRequest>,
}

fn mismatch(contract: &CommandContract, shape: ArgumentShape, expected: &str, found: &Value) -> ScriptError {
    let index = contract
        .parameters
        .iter()
        .position(|s| *s == shape)
        .map_or(0, |i| i + 1);
    ScriptError::TypeMismatch {
        command: contract.name.to_string(),
        index,
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

fn symbols(contract: &CommandContract, arguments: &[Value]) -> Result<Vec<String>, ScriptError> {
    let Some(value) = contract.argument(ArgumentShape::Symbols, arguments) else {
        return Err(ScriptError::Arity {
            command: contract.name.to_string(),
            min: contract.min_arity(),
            max: contract.max_arity(),
            found: arguments.len(),
        });
    };
    let element_name = |element: &Value| match element {
        Value::Symbol(symbol) => Ok(symbol.name.clone()),
        other => Err(mismatch(contract, ArgumentShape::Symbols, "a symbol", other)),
    };
    match value {
        Value::Symbol(symbol) => Ok(vec![symbol.name.clone()]),
        Value::SymbolArray(elements) => elements.iter().map(element_name).collect(),
        other => Err(mismatch(
            contract,
            ArgumentShape::Symbols,
            "a symbol or symbol array",
            other,
        )),
    }
}

fn time_bound(
    contract: &CommandContract,
    shape: ArgumentShape,
    arguments: &[Value],
    default: SpecialKeyword,
) -> Result<RelativeDateTime, ScriptError> {
    match contract.argument(shape, arguments) {
        None => Ok(RelativeDateTime::special(default)),
        Some(value) => RelativeDateTime::from_value(value)
            .ok_or_else(|| mismatch(contract, shape, "a time or an offset", value)),
    }
}

fn time_frame(contract: &CommandContract, arguments: &[Value]) -> Result<u32, ScriptError> {
    match contract.argument(ArgumentShape::TimeFrame, arguments) {
        None => Ok(TimeFrame::DAILY.minutes()),
        Some(Value::TimeFrame(tf)) => Ok(tf.minutes()),
        Some(other) => Err(mismatch(contract, ArgumentShape::TimeFrame, "a time frame", other)),
    }
}

impl HistoryRequest {
    pub fn from_arguments(contract: &CommandContract, arguments: &[Value]) -> Result<Self, ScriptError> {
        Ok(Self {
            symbols: symbols(contract, arguments)?,
            from: time_bound(contract, ArgumentShape::From, arguments, SpecialKeyword::First)?,
            to: time_bound(contract, ArgumentShape::To, arguments, SpecialKeyword::Last)?,
            time_frame: time_frame(contract, arguments)?,
        })
    }
}

impl CorrelationRequest {
    pub fn from_arguments(contract: &CommandContract, arguments: &[Value]) -> Result<Self, ScriptError> {
        Ok(Self {
            symbols: symbols(contract, arguments)?,
            from: time_bound(contract, ArgumentShape::From, arguments, SpecialKeyword::First)?,
            to: time_bound(contract, ArgumentShape::To, arguments, SpecialKeyword::Last)?,
        })
    }
}

impl BacktestRequest {
    pub fn from_arguments(contract: &CommandContract, arguments: &[Value]) -> Result<Self, ScriptError> {
        let strategy = match contract.argument(ArgumentShape::Text, arguments) {
            Some(Value::StringLiteral(name)) => name.clone(),
            Some(other) => return Err(mismatch(contract, ArgumentShape::Text, "a string", other)),
            None => {
                return Err(ScriptError::Arity {
                    command: contract.name.to_string(),
                    min: contract.min_arity(),
                    max: contract.max_arity(),
                    found: arguments.len(),
                });
            }
        };
        let parameters = match contract.argument(ArgumentShape::Parameters, arguments) {
            None => Vec::new(),
            Some(Value::Parameters(parameters)) => {
                parameters.iter().map(ParameterRequest::from).collect()
            }
            Some(other) => {
                return Err(mismatch(
                    contract,
                    ArgumentShape::Parameters,
                    "a parameter block",
                    other,
                ));
            }
        };
        Ok(Self {
            strategy,
            symbols: symbols(contract, arguments)?,
            from: time_bound(contract, ArgumentShape::From, arguments, SpecialKeyword::First)?,
            to: time_bound(contract, ArgumentShape::To, arguments, SpecialKeyword::Last)?,
            time_frame: time_frame(contract, arguments)?,
            parameters,
        })
    }
}

impl Value {
    /// The value as it crosses the handler boundary. Offsets only make sense
    /// next to a time and unresolved variables never reach a handler, so both
    /// are rejected.
    pub fn to_json(&self) -> Result<serde_json::Value, ScriptError> {
        use serde_json::json;

        let json = match self {
            Value::Numeric(n) => json!(n),
            Value::Bool(b) => json!(b),
            Value::StringLiteral(s) => json!(s),
            Value::Symbol(symbol) if symbol.is_all() => json!([ALL_SYMBOLS]),
            Value::Symbol(symbol) => json!(symbol.name),
            Value::SymbolArray(elements) => serde_json::Value::Array(
                elements
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::TimeFrame(tf) => json!(tf.minutes()),
            Value::TimeParameter(_) => match RelativeDateTime::from_value(self) {
                Some(time) => serde_json::to_value(time)?,
                None => serde_json::Value::Null,
            },
            Value::Parameters(parameters) => serde_json::to_value(
                parameters
                    .iter()
                    .map(ParameterRequest::from)
                    .collect::<Vec<_>>(),
            )?,
            Value::Parameter(parameter) => serde_json::to_value(ParameterRequest::from(parameter))?,
            Value::Offset(_) | Value::Variable(_) => {
                return Err(ScriptError::TypeMismatch {
                    command: "emit".to_string(),
                    index: 1,
                    expected: "a standalone value".to_string(),
                    found: self.kind().to_string(),
                });
            }
        };
        Ok(json)
    }
}
