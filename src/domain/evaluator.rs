//! Statement evaluator.
//!
//! Statements run strictly in source order from an owned queue. A call's
//! handler is awaited to completion before the next statement is taken, and
//! the first failure stops the run. Statements that already ran keep their
//! effects.

use crate::domain::contract::{ArgumentShape, ContractTable};
use crate::domain::environment::Environment;
use crate::domain::error::ScriptError;
use crate::domain::statement::Statement;
use crate::domain::sweep;
use crate::domain::value::Value;
use crate::ports::handler_port::HandlerTable;
use chrono_tz::Tz;
use std::collections::VecDeque;

/// Name of the command the engine handles itself.
pub const TIMEZONE_COMMAND: &str = "timezone";

/// Substitute every variable reference in `value` with its bound value.
pub fn resolve(value: &Value, environment: &Environment) -> Result<Value, ScriptError> {
    match value {
        Value::Variable(name) => environment.get(name).cloned(),
        Value::SymbolArray(elements) => elements
            .iter()
            .map(|element| resolve(element, environment))
            .collect::<Result<_, _>>()
            .map(Value::SymbolArray),
        other => Ok(other.clone()),
    }
}

/// Borrowed view of the engine state one run may touch.
pub struct Evaluator<'e> {
    pub environment: &'e mut Environment,
    pub handlers: &'e HandlerTable,
    pub contracts: &'e ContractTable,
    pub timezone: &'e mut Option<Tz>,
    pub max_sweep_runs: usize,
}

impl Evaluator<'_> {
    #[tracing::instrument(level = "debug", skip_all, fields(statements = statements.len()))]
    pub async fn run(&mut self, statements: Vec<Statement>) -> Result<(), ScriptError> {
        let mut queue: VecDeque<Statement> = statements.into();
        while let Some(statement) = queue.pop_front() {
            if let Err(err) = self.execute(statement).await {
                tracing::warn!(error = %err, remaining = queue.len(), "statement failed");
                return Err(err);
            }
        }
        Ok(())
    }

    async fn execute(&mut self, statement: Statement) -> Result<(), ScriptError> {
        match statement {
            Statement::Assignment { variable, value } => {
                let value = resolve(&value, self.environment)?;
                tracing::debug!(variable = %variable, kind = value.kind(), "assign");
                self.environment.set(variable, value);
                Ok(())
            }
            Statement::Call { command, arguments } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| resolve(argument, self.environment))
                    .collect::<Result<Vec<_>, _>>()?;
                self.validate(&command, &arguments)?;
                if command == TIMEZONE_COMMAND {
                    self.set_timezone(&arguments)?;
                    if !self.handlers.contains(TIMEZONE_COMMAND) {
                        return Ok(());
                    }
                }
                self.dispatch(command, arguments).await
            }
        }
    }

    fn validate(&self, command: &str, arguments: &[Value]) -> Result<(), ScriptError> {
        self.contracts.validate(command, arguments)?;
        let parameters = self
            .contracts
            .get(command)
            .and_then(|contract| contract.argument(ArgumentShape::Parameters, arguments));
        if let Some(Value::Parameters(parameters)) = parameters {
            sweep::check_limit(parameters, self.max_sweep_runs)?;
        }
        Ok(())
    }

    fn set_timezone(&mut self, arguments: &[Value]) -> Result<(), ScriptError> {
        // Only reached without the built-in contract, which checks this first.
        let Some(Value::StringLiteral(name)) = arguments.first() else {
            return Err(ScriptError::TypeMismatch {
                command: TIMEZONE_COMMAND.to_string(),
                index: 1,
                expected: "a string".to_string(),
                found: arguments.first().map_or("nothing", Value::kind).to_string(),
            });
        };
        let timezone: Tz = name.parse().map_err(|_| ScriptError::Range {
            command: TIMEZONE_COMMAND.to_string(),
            reason: format!("unknown timezone '{}'", name),
        })?;
        tracing::debug!(timezone = %timezone.name(), "timezone set");
        *self.timezone = Some(timezone);
        Ok(())
    }

    async fn dispatch(&self, command: String, arguments: Vec<Value>) -> Result<(), ScriptError> {
        let handler = self
            .handlers
            .get(&command)
            .ok_or_else(|| ScriptError::UnknownCommand {
                name: command.clone(),
            })?;
        tracing::debug!(command = %command, arguments = arguments.len(), "dispatch");
        handler
            .call(arguments)
            .await
            .map_err(|source| ScriptError::Handler { command, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::{Symbol, TimeFrame};
    use crate::ports::handler_port::HandlerError;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

    fn recording(table: &mut HandlerTable, command: &str, log: &Log) {
        let log = Arc::clone(log);
        let name = command.to_string();
        table.register_fn(command, move |arguments| {
            let log = Arc::clone(&log);
            let name = name.clone();
            async move {
                log.lock().unwrap().push((name, arguments));
                Ok(())
            }
        });
    }

    struct Fixture {
        environment: Environment,
        handlers: HandlerTable,
        contracts: ContractTable,
        timezone: Option<Tz>,
    }

    impl Fixture {
        fn new(handlers: HandlerTable) -> Self {
            Self {
                environment: Environment::new(),
                handlers,
                contracts: ContractTable::standard(),
                timezone: None,
            }
        }

        async fn run(&mut self, statements: Vec<Statement>) -> Result<(), ScriptError> {
            Evaluator {
                environment: &mut self.environment,
                handlers: &self.handlers,
                contracts: &self.contracts,
                timezone: &mut self.timezone,
                max_sweep_runs: 100,
            }
            .run(statements)
            .await
        }
    }

    fn call(command: &str, arguments: Vec<Value>) -> Statement {
        Statement::Call {
            command: command.into(),
            arguments,
        }
    }

    fn assign(variable: &str, value: Value) -> Statement {
        Statement::Assignment {
            variable: variable.into(),
            value,
        }
    }

    fn es() -> Value {
        Value::Symbol(Symbol::new("ES"))
    }

    #[test]
    fn resolve_substitutes_variables() {
        let mut env = Environment::new();
        env.set("s", es());
        let resolved = resolve(&Value::SymbolArray(vec![Value::Variable("s".into())]), &env).unwrap();
        assert_eq!(resolved, Value::SymbolArray(vec![es()]));
        assert!(matches!(
            resolve(&Value::Variable("missing".into()), &env),
            Err(ScriptError::UnknownVariable { .. })
        ));
    }

    #[tokio::test]
    async fn variable_resolved_before_dispatch() {
        let log: Log = Arc::default();
        let mut handlers = HandlerTable::new();
        recording(&mut handlers, "plot", &log);
        let mut fixture = Fixture::new(handlers);

        fixture
            .run(vec![
                assign("t", Value::TimeFrame(TimeFrame(30))),
                call("plot", vec![es(), Value::Variable("t".into())]),
            ])
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[0].1[1], Value::TimeFrame(TimeFrame(30)));
    }

    #[tokio::test]
    async fn assignment_of_variable_copies_value() {
        let mut fixture = Fixture::new(HandlerTable::new());
        fixture
            .run(vec![
                assign("a", Value::Numeric(1.0)),
                assign("b", Value::Variable("a".into())),
                assign("a", Value::Numeric(2.0)),
            ])
            .await
            .unwrap();
        assert_eq!(fixture.environment.get("b").unwrap(), &Value::Numeric(1.0));
    }

    #[tokio::test]
    async fn unknown_variable_stops_run_without_rollback() {
        let log: Log = Arc::default();
        let mut handlers = HandlerTable::new();
        recording(&mut handlers, "plot", &log);
        let mut fixture = Fixture::new(handlers);

        let err = fixture
            .run(vec![
                assign("a", Value::Numeric(1.0)),
                call("plot", vec![Value::Variable("x".into())]),
                assign("b", Value::Numeric(2.0)),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, ScriptError::UnknownVariable { ref name } if name == "x"));
        assert!(fixture.environment.contains("a"));
        assert!(!fixture.environment.contains("b"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_command() {
        let mut fixture = Fixture::new(HandlerTable::new());
        let err = fixture.run(vec![call("history", vec![])]).await.unwrap_err();
        assert!(matches!(err, ScriptError::UnknownCommand { ref name } if name == "history"));
    }

    #[tokio::test]
    async fn handler_failure_aborts_remaining() {
        let log: Log = Arc::default();
        let mut handlers = HandlerTable::new();
        recording(&mut handlers, "plot", &log);
        handlers.register_fn("candle", |_| async { Err(HandlerError::failed("no data")) });
        let mut fixture = Fixture::new(handlers);

        let err = fixture
            .run(vec![
                call("plot", vec![es()]),
                call("candle", vec![es()]),
                call("plot", vec![es()]),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, ScriptError::Handler { ref command, .. } if command == "candle"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn validation_runs_before_dispatch() {
        let log: Log = Arc::default();
        let mut handlers = HandlerTable::new();
        recording(&mut handlers, "plot", &log);
        let mut fixture = Fixture::new(handlers);

        let err = fixture
            .run(vec![call("plot", vec![Value::Numeric(1.0)])])
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::TypeMismatch { .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn timezone_is_intrinsic() {
        let mut fixture = Fixture::new(HandlerTable::new());
        fixture
            .run(vec![call(
                "timezone",
                vec![Value::StringLiteral("America/Chicago".into())],
            )])
            .await
            .unwrap();
        assert_eq!(fixture.timezone, Some(chrono_tz::America::Chicago));
    }

    #[tokio::test]
    async fn invalid_timezone_is_range_error() {
        let mut fixture = Fixture::new(HandlerTable::new());
        let err = fixture
            .run(vec![call("timezone", vec![Value::StringLiteral("Nowhere/City".into())])])
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Range { .. }));
        assert_eq!(fixture.timezone, None);
    }

    #[tokio::test]
    async fn timezone_without_contract_still_needs_a_string() {
        let mut fixture = Fixture::new(HandlerTable::new());
        fixture.contracts = ContractTable::empty();

        let err = fixture
            .run(vec![call("timezone", vec![Value::Numeric(5.0)])])
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::TypeMismatch { ref found, .. } if found == "a number"));

        let err = fixture.run(vec![call("timezone", vec![])]).await.unwrap_err();
        assert!(matches!(err, ScriptError::TypeMismatch { ref found, .. } if found == "nothing"));
        assert_eq!(fixture.timezone, None);
    }

    #[tokio::test]
    async fn timezone_handler_is_awaited_when_registered() {
        let log: Log = Arc::default();
        let mut handlers = HandlerTable::new();
        recording(&mut handlers, "timezone", &log);
        let mut fixture = Fixture::new(handlers);
        fixture
            .run(vec![call("timezone", vec![Value::StringLiteral("UTC".into())])])
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
