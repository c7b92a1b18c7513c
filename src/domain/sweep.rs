//! Parameter sweep expansion.
//!
//! A parameter block describes a grid of backtest runs: numeric lists and
//! ranges contribute one axis each, every other parameter stays fixed. The grid
//! is the cartesian product of all axes, in declaration order.

use crate::domain::error::ScriptError;
use crate::domain::value::{Parameter, ParameterValue};

/// Step used when a range omits one.
pub const DEFAULT_STEP: f64 = 1.0;

// Absorbs float error when the last step lands exactly on `high`.
const STEP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Numeric(f64),
    Bool(bool),
    Text(String),
    StringList(Vec<String>),
}

/// One parameter fixed to a single value for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub name: String,
    pub value: SettingValue,
}

fn sweep_error(reason: String) -> ScriptError {
    ScriptError::Range {
        command: "backtest".to_string(),
        reason,
    }
}

/// Index of the last step of a bounded range.
fn last_step(name: &str, low: f64, high: f64, step: Option<f64>) -> Result<usize, ScriptError> {
    let step = step.unwrap_or(DEFAULT_STEP);
    if step.is_nan() || step <= 0.0 {
        return Err(sweep_error(format!(
            "{}: step must be positive, got {}",
            name, step
        )));
    }
    if high < low {
        return Err(sweep_error(format!(
            "{}: upper bound {} is below lower bound {}",
            name, high, low
        )));
    }
    Ok(((high - low) / step + STEP_EPSILON).floor() as usize)
}

fn axis_len(parameter: &Parameter) -> Result<usize, ScriptError> {
    match &parameter.value {
        ParameterValue::NumericList(values) => Ok(values.len()),
        ParameterValue::Range {
            low,
            high: Some(high),
            step,
        } => Ok(last_step(&parameter.name, *low, *high, *step)?.saturating_add(1)),
        _ => Ok(1),
    }
}

fn axis(parameter: &Parameter) -> Result<Vec<SettingValue>, ScriptError> {
    let values = match &parameter.value {
        ParameterValue::Numeric(n) => vec![SettingValue::Numeric(*n)],
        ParameterValue::NumericList(values) => {
            values.iter().copied().map(SettingValue::Numeric).collect()
        }
        ParameterValue::Range { low, high, step } => match high {
            None => vec![SettingValue::Numeric(*low)],
            Some(high) => {
                let last = last_step(&parameter.name, *low, *high, *step)?;
                let step = step.unwrap_or(DEFAULT_STEP);
                (0..=last)
                    .map(|i| SettingValue::Numeric(low + step * i as f64))
                    .collect()
            }
        },
        ParameterValue::StringList(values) => vec![SettingValue::StringList(values.clone())],
        ParameterValue::Bool(b) => vec![SettingValue::Bool(*b)],
        ParameterValue::Text(s) => vec![SettingValue::Text(s.clone())],
    };
    Ok(values)
}

/// Number of runs `parameters` expands to, or `None` on overflow.
pub fn run_count(parameters: &[Parameter]) -> Result<Option<usize>, ScriptError> {
    let mut total: usize = 1;
    for parameter in parameters {
        match total.checked_mul(axis_len(parameter)?) {
            Some(next) => total = next,
            None => return Ok(None),
        }
    }
    Ok(Some(total))
}

/// Number of runs `parameters` expands to, failing above `limit`.
pub fn check_limit(parameters: &[Parameter], limit: usize) -> Result<usize, ScriptError> {
    match run_count(parameters)? {
        Some(count) if count <= limit => Ok(count),
        _ => Err(sweep_error(format!(
            "parameter sweep exceeds the limit of {} runs",
            limit
        ))),
    }
}

/// Expand `parameters` into one settings list per run. Fails when the grid
/// would exceed `limit` runs.
pub fn expand(parameters: &[Parameter], limit: usize) -> Result<Vec<Vec<Setting>>, ScriptError> {
    check_limit(parameters, limit)?;

    let mut runs: Vec<Vec<Setting>> = vec![Vec::new()];
    for parameter in parameters {
        let values = axis(parameter)?;
        runs = runs
            .into_iter()
            .flat_map(|run| {
                values.iter().map(move |value| {
                    let mut next = run.clone();
                    next.push(Setting {
                        name: parameter.name.clone(),
                        value: value.clone(),
                    });
                    next
                })
            })
            .collect();
    }
    Ok(runs)
}
