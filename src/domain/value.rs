//! Script value model.
//!
//! Every literal the grammar accepts evaluates to one [`Value`] variant:
//! - `TimeParameter`: a concrete calendar time or one of `first`, `last`, `now`
//! - `TimeFrame`: an aggregation granularity in minutes
//! - `Offset`: a signed relative delta, only meaningful next to a `TimeParameter`
//! - `Symbol` / `SymbolArray`: tickers or the `all` keyword
//! - `Parameters`: a backtest parameter block, possibly containing sweeps

use chrono::{DateTime, Duration, Months, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MINUTES_PER_HOUR: u32 = 60;
pub const MINUTES_PER_DAY: u32 = 1440;
pub const ALL_SYMBOLS: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Numeric(f64),
    Bool(bool),
    TimeParameter(TimeParameter),
    TimeFrame(TimeFrame),
    Offset(Offset),
    Symbol(Symbol),
    SymbolArray(Vec<Value>),
    StringLiteral(String),
    Parameters(Vec<Parameter>),
    Parameter(Parameter),
    Variable(String),
}

impl Value {
    /// Human-readable name of the variant, used in type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Numeric(_) => "a number",
            Value::Bool(_) => "a boolean",
            Value::TimeParameter(_) => "a time",
            Value::TimeFrame(_) => "a time frame",
            Value::Offset(_) => "an offset",
            Value::Symbol(_) => "a symbol",
            Value::SymbolArray(_) => "a symbol array",
            Value::StringLiteral(_) => "a string",
            Value::Parameters(_) => "a parameter block",
            Value::Parameter(_) => "a parameter",
            Value::Variable(_) => "a variable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeParameter {
    Concrete(ConcreteTime),
    Special(SpecialKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecialKeyword {
    First,
    Last,
    Now,
}

impl SpecialKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            SpecialKeyword::First => "first",
            SpecialKeyword::Last => "last",
            SpecialKeyword::Now => "now",
        }
    }
}

/// A calendar time pinned to a named timezone.
///
/// Serialized as an RFC 3339 timestamp plus the IANA zone name so that a
/// restored value has the same wall-clock fields and zone as the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConcreteTimeRepr", into = "ConcreteTimeRepr")]
pub struct ConcreteTime(DateTime<Tz>);

impl ConcreteTime {
    /// Interpret a wall-clock time in `timezone`. Ambiguous local times resolve to
    /// the earlier instant; times skipped by a DST transition yield `None`.
    pub fn from_local(naive: NaiveDateTime, timezone: Tz) -> Option<Self> {
        timezone.from_local_datetime(&naive).earliest().map(ConcreteTime)
    }

    pub fn date_time(&self) -> &DateTime<Tz> {
        &self.0
    }

    pub fn timezone(&self) -> Tz {
        self.0.timezone()
    }

    pub fn naive_local(&self) -> NaiveDateTime {
        self.0.naive_local()
    }
}

impl From<DateTime<Tz>> for ConcreteTime {
    fn from(time: DateTime<Tz>) -> Self {
        ConcreteTime(time)
    }
}

#[derive(Serialize, Deserialize)]
struct ConcreteTimeRepr {
    time: String,
    timezone: String,
}

impl From<ConcreteTime> for ConcreteTimeRepr {
    fn from(value: ConcreteTime) -> Self {
        ConcreteTimeRepr {
            time: value.0.to_rfc3339(),
            timezone: value.0.timezone().name().to_string(),
        }
    }
}

impl TryFrom<ConcreteTimeRepr> for ConcreteTime {
    type Error = String;

    fn try_from(repr: ConcreteTimeRepr) -> Result<Self, Self::Error> {
        let timezone: Tz = repr
            .timezone
            .parse()
            .map_err(|_| format!("unknown timezone '{}'", repr.timezone))?;
        let time = DateTime::parse_from_rfc3339(&repr.time)
            .map_err(|e| format!("invalid timestamp '{}': {}", repr.time, e))?;
        Ok(ConcreteTime(time.with_timezone(&timezone)))
    }
}

/// Aggregation granularity in minutes. Valid values lie in `1..=1440`; the
/// bound is checked when a command validates its arguments, not on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeFrame(pub u32);

impl TimeFrame {
    pub const DAILY: TimeFrame = TimeFrame(MINUTES_PER_DAY);

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        (1..=MINUTES_PER_DAY).contains(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetUnit {
    #[serde(rename = "m")]
    Minute,
    #[serde(rename = "h")]
    Hour,
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "w")]
    Week,
    #[serde(rename = "mo")]
    Month,
    #[serde(rename = "y")]
    Year,
}

impl OffsetUnit {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "m" => Some(OffsetUnit::Minute),
            "h" => Some(OffsetUnit::Hour),
            "d" => Some(OffsetUnit::Day),
            "w" => Some(OffsetUnit::Week),
            "mo" => Some(OffsetUnit::Month),
            "y" => Some(OffsetUnit::Year),
            _ => None,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            OffsetUnit::Minute => "m",
            OffsetUnit::Hour => "h",
            OffsetUnit::Day => "d",
            OffsetUnit::Week => "w",
            OffsetUnit::Month => "mo",
            OffsetUnit::Year => "y",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub magnitude: i32,
    pub unit: OffsetUnit,
}

impl Offset {
    pub fn new(magnitude: i32, unit: OffsetUnit) -> Self {
        Self { magnitude, unit }
    }

    /// Shift `time` by this offset. Month and year steps are calendar-aware and
    /// clamp to the last day of the target month. Returns `None` on overflow.
    pub fn apply_to(&self, time: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let time = time.clone();
        let magnitude = i64::from(self.magnitude);
        match self.unit {
            OffsetUnit::Minute => time.checked_add_signed(Duration::try_minutes(magnitude)?),
            OffsetUnit::Hour => time.checked_add_signed(Duration::try_hours(magnitude)?),
            OffsetUnit::Day => time.checked_add_signed(Duration::try_days(magnitude)?),
            OffsetUnit::Week => time.checked_add_signed(Duration::try_weeks(magnitude)?),
            OffsetUnit::Month => add_months(time, magnitude),
            OffsetUnit::Year => add_months(time, magnitude.checked_mul(12)?),
        }
    }
}

fn add_months(time: DateTime<Tz>, months: i64) -> Option<DateTime<Tz>> {
    let count = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        time.checked_add_months(count)
    } else {
        time.checked_sub_months(count)
    }
}

/// A ticker or the `all` keyword. `separator` marks the start of a new display
/// group inside a symbol array (`[ES, NQ | YM]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    #[serde(default)]
    pub separator: bool,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            separator: false,
        }
    }

    pub fn all() -> Self {
        Self::new(ALL_SYMBOLS)
    }

    pub fn is_all(&self) -> bool {
        self.name == ALL_SYMBOLS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParameterValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterValue {
    Numeric(f64),
    NumericList(Vec<f64>),
    Range {
        low: f64,
        high: Option<f64>,
        step: Option<f64>,
    },
    StringList(Vec<String>),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            // Literal form only; the zone comes from whoever builds the script.
            Value::TimeParameter(TimeParameter::Concrete(time)) => {
                write!(f, "{}", time.naive_local().format("%Y-%m-%d %H:%M:%S"))
            }
            Value::TimeParameter(TimeParameter::Special(keyword)) => {
                write!(f, "{}", keyword.as_str())
            }
            Value::TimeFrame(tf) if *tf == TimeFrame::DAILY => write!(f, "daily"),
            Value::TimeFrame(tf) => write!(f, "{}m", tf.0),
            Value::Offset(offset) => {
                write!(f, "{:+}{}", offset.magnitude, offset.unit.suffix())
            }
            Value::Symbol(symbol) => write!(f, "{}", symbol.name),
            Value::SymbolArray(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    match element {
                        Value::Symbol(symbol) if i > 0 && symbol.separator => write!(f, " | ")?,
                        _ if i > 0 => write!(f, ", ")?,
                        _ => {}
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::StringLiteral(s) => write!(f, "{:?}", s),
            Value::Parameters(parameters) => {
                write!(f, "{{")?;
                for (i, parameter) in parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", parameter)?;
                }
                write!(f, "}}")
            }
            Value::Parameter(parameter) => write!(f, "{}", parameter),
            Value::Variable(name) => write!(f, "${}", name),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        match &self.value {
            ParameterValue::Numeric(n) => write!(f, "{}", n),
            ParameterValue::NumericList(values) => write!(f, "{:?}", values),
            ParameterValue::Range { low, high, step } => {
                write!(f, "{}", low)?;
                if let Some(high) = high {
                    write!(f, " to {}", high)?;
                }
                if let Some(step) = step {
                    write!(f, " step {}", step)?;
                }
                Ok(())
            }
            ParameterValue::StringList(values) => write!(f, "{:?}", values),
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}
