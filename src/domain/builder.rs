//! AST builder: turns a parse tree into typed statements.
//!
//! Building is a pure function of the tree and the timezone in effect. Literal
//! errors the grammar cannot see (impossible calendar dates, integer overflow)
//! are reported as syntax errors at the literal's start position.

use crate::domain::error::ParseError;
use crate::domain::statement::Statement;
use crate::domain::syntax::{
    ArrayElement, DateFields, Literal, Node, ParameterLiteral, ParseTree, Separator,
    SyntaxParameter, SyntaxStatement,
};
use crate::domain::value::{
    ConcreteTime, MINUTES_PER_DAY, MINUTES_PER_HOUR, Offset, OffsetUnit, Parameter,
    ParameterValue, SpecialKeyword, Symbol, TimeFrame, TimeParameter, Value, ALL_SYMBOLS,
};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::str::FromStr;

/// Build the statement list for `tree`. Concrete dates are interpreted in
/// `timezone`, or UTC when none is configured.
pub fn build(tree: &ParseTree, timezone: Option<Tz>) -> Result<Vec<Statement>, ParseError> {
    let builder = Builder {
        timezone: timezone.unwrap_or(Tz::UTC),
    };
    tree.statements
        .iter()
        .map(|statement| builder.statement(statement))
        .collect()
}

struct Builder {
    timezone: Tz,
}

fn number<T: FromStr>(text: &str, position: usize, what: &str) -> Result<T, ParseError> {
    text.parse()
        .map_err(|_| ParseError::new(format!("{} out of range: {}", what, text), position))
}

/// Decimal literal as a finite `f64`; literals too large for one are rejected.
fn float(text: &str, position: usize) -> Result<f64, ParseError> {
    let value: f64 = number(text, position, "number")?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::new(format!("number out of range: {}", text), position))
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

impl Builder {
    fn statement(&self, statement: &SyntaxStatement) -> Result<Statement, ParseError> {
        match statement {
            SyntaxStatement::Assignment {
                variable, value, ..
            } => Ok(Statement::Assignment {
                variable: variable.clone(),
                value: self.value(value)?,
            }),
            SyntaxStatement::Call {
                command, arguments, ..
            } => Ok(Statement::Call {
                command: command.clone(),
                arguments: arguments
                    .iter()
                    .map(|node| self.value(node))
                    .collect::<Result<_, _>>()?,
            }),
        }
    }

    fn value(&self, node: &Node) -> Result<Value, ParseError> {
        let position = node.span.start;
        match &node.literal {
            Literal::Variable(name) => Ok(Value::Variable(name.clone())),
            Literal::DateTime {
                date,
                hour,
                minute,
                second,
            } => {
                let hour = number(hour, position, "hour")?;
                let minute = number(minute, position, "minute")?;
                let second = match second {
                    Some(second) => number(second, position, "second")?,
                    None => 0,
                };
                self.concrete_time(date, hour, minute, second, position)
            }
            Literal::Date(date) => self.concrete_time(date, 0, 0, 0, position),
            Literal::Offset {
                negative,
                magnitude,
                unit,
            } => {
                let magnitude: i32 = number(magnitude, position, "offset")?;
                let unit = OffsetUnit::from_suffix(unit).ok_or_else(|| {
                    ParseError::new(format!("unknown offset unit '{}'", unit), position)
                })?;
                let magnitude = if *negative { -magnitude } else { magnitude };
                Ok(Value::Offset(Offset::new(magnitude, unit)))
            }
            Literal::TimeFrame { count, unit } => {
                let count: u32 = number(count, position, "time frame")?;
                let minutes = match unit.as_str() {
                    "h" => count.checked_mul(MINUTES_PER_HOUR).ok_or_else(|| {
                        ParseError::new(format!("time frame out of range: {}h", count), position)
                    })?,
                    _ => count,
                };
                Ok(Value::TimeFrame(TimeFrame(minutes)))
            }
            Literal::Symbol(name) => Ok(Value::Symbol(Symbol::new(name.clone()))),
            Literal::Numeric(text) => Ok(Value::Numeric(float(text, position)?)),
            Literal::Keyword(word) => keyword(word, position),
            Literal::Text(raw) => Ok(Value::StringLiteral(unescape(raw))),
            Literal::SymbolArray(elements) => elements
                .iter()
                .map(|element| self.array_element(element))
                .collect::<Result<_, _>>()
                .map(Value::SymbolArray),
            Literal::Parameters(entries) => entries
                .iter()
                .map(|entry| self.parameter(entry))
                .collect::<Result<_, _>>()
                .map(Value::Parameters),
        }
    }

    fn concrete_time(
        &self,
        date: &DateFields,
        hour: u32,
        minute: u32,
        second: u32,
        position: usize,
    ) -> Result<Value, ParseError> {
        let year: i32 = number(&date.year, position, "year")?;
        let month: u32 = number(&date.month, position, "month")?;
        let day: u32 = number(&date.day, position, "day")?;
        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| {
                ParseError::new(
                    format!("invalid date {}-{}-{}", date.year, date.month, date.day),
                    position,
                )
            })?
            .and_hms_opt(hour, minute, second)
            .ok_or_else(|| {
                ParseError::new(
                    format!("invalid time {:02}:{:02}:{:02}", hour, minute, second),
                    position,
                )
            })?;
        let time = ConcreteTime::from_local(naive, self.timezone).ok_or_else(|| {
            ParseError::new(
                format!("{} does not exist in {}", naive, self.timezone.name()),
                position,
            )
        })?;
        Ok(Value::TimeParameter(TimeParameter::Concrete(time)))
    }

    fn array_element(&self, element: &ArrayElement) -> Result<Value, ParseError> {
        let name = match &element.node.literal {
            Literal::Symbol(name) => name.clone(),
            Literal::Keyword(word) if word == ALL_SYMBOLS => ALL_SYMBOLS.to_string(),
            _ => {
                return Err(ParseError::new(
                    "symbol arrays may only contain symbols",
                    element.node.span.start,
                ));
            }
        };
        Ok(Value::Symbol(Symbol {
            name,
            separator: element.separator == Separator::Emphasized,
        }))
    }

    fn parameter(&self, entry: &SyntaxParameter) -> Result<Parameter, ParseError> {
        let position = entry.span.start;
        let value = match &entry.value {
            ParameterLiteral::Numeric(text) => {
                ParameterValue::Numeric(float(text, position)?)
            }
            ParameterLiteral::NumericList(items) => ParameterValue::NumericList(
                items
                    .iter()
                    .map(|item| float(item, position))
                    .collect::<Result<_, _>>()?,
            ),
            ParameterLiteral::Range { low, high, step } => ParameterValue::Range {
                low: float(low, position)?,
                high: high
                    .as_deref()
                    .map(|high| float(high, position))
                    .transpose()?,
                step: step
                    .as_deref()
                    .map(|step| float(step, position))
                    .transpose()?,
            },
            ParameterLiteral::StringList(items) => {
                ParameterValue::StringList(items.iter().map(|item| unescape(item)).collect())
            }
            ParameterLiteral::Text(raw) => ParameterValue::Text(unescape(raw)),
            ParameterLiteral::Bool(word) => ParameterValue::Bool(word == "true"),
        };
        Ok(Parameter {
            name: entry.name.clone(),
            value,
        })
    }
}

fn keyword(word: &str, position: usize) -> Result<Value, ParseError> {
    let value = match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "first" => Value::TimeParameter(TimeParameter::Special(SpecialKeyword::First)),
        "last" => Value::TimeParameter(TimeParameter::Special(SpecialKeyword::Last)),
        "now" => Value::TimeParameter(TimeParameter::Special(SpecialKeyword::Now)),
        "daily" => Value::TimeFrame(TimeFrame(MINUTES_PER_DAY)),
        ALL_SYMBOLS => Value::Symbol(Symbol::all()),
        other => {
            return Err(ParseError::new(
                format!("unknown keyword '{}'", other),
                position,
            ));
        }
    };
    Ok(value)
}
