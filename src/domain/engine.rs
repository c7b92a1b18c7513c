//! Script engine.
//!
//! One engine per session. It owns the grammar, the variable environment, the
//! handler and contract tables and the current timezone; nothing is shared
//! between engines.

use crate::domain::builder;
use crate::domain::config_validation::EngineConfig;
use crate::domain::contract::ContractTable;
use crate::domain::environment::Environment;
use crate::domain::error::ScriptError;
use crate::domain::evaluator::Evaluator;
use crate::domain::grammar::Grammar;
use crate::domain::session::SessionState;
use crate::domain::statement::Statement;
use crate::ports::handler_port::HandlerTable;
use chrono_tz::Tz;

#[derive(Debug)]
pub struct Engine {
    grammar: Grammar,
    environment: Environment,
    handlers: HandlerTable,
    contracts: ContractTable,
    timezone: Option<Tz>,
    max_sweep_runs: usize,
}

impl Engine {
    pub fn new(handlers: HandlerTable) -> Self {
        Self::with_config(handlers, &EngineConfig::default())
    }

    pub fn with_config(handlers: HandlerTable, config: &EngineConfig) -> Self {
        Self {
            grammar: Grammar::new(),
            environment: Environment::new(),
            handlers,
            contracts: ContractTable::standard(),
            timezone: config.timezone,
            max_sweep_runs: config.max_sweep_runs,
        }
    }

    /// Replace the built-in contracts.
    pub fn with_contracts(mut self, contracts: ContractTable) -> Self {
        self.contracts = contracts;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerTable {
        &mut self.handlers
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    /// Parse and build `source` using the current timezone.
    pub fn parse(&self, source: &str) -> Result<Vec<Statement>, ScriptError> {
        let tree = self.grammar.parse(source)?;
        Ok(builder::build(&tree, self.timezone)?)
    }

    pub async fn run(&mut self, statements: Vec<Statement>) -> Result<(), ScriptError> {
        Evaluator {
            environment: &mut self.environment,
            handlers: &self.handlers,
            contracts: &self.contracts,
            timezone: &mut self.timezone,
            max_sweep_runs: self.max_sweep_runs,
        }
        .run(statements)
        .await
    }

    /// Parse, build and run `source`. Nothing runs if it does not parse.
    pub async fn execute(&mut self, source: &str) -> Result<(), ScriptError> {
        let statements = self.parse(source)?;
        self.run(statements).await
    }

    pub fn snapshot(&self, script: &str) -> Result<SessionState, ScriptError> {
        Ok(SessionState {
            last_script_text: script.to_string(),
            serialized_variables: self.environment.serialize()?,
            timezone: self.timezone.map(|tz| tz.name().to_string()),
        })
    }

    /// Load variables and timezone from `state`, returning the last script text.
    pub fn restore(&mut self, state: &SessionState) -> Result<String, ScriptError> {
        let environment = Environment::deserialize(&state.serialized_variables)?;
        let timezone = match &state.timezone {
            None => self.timezone,
            Some(name) => Some(name.parse::<Tz>().map_err(|_| ScriptError::Serialization {
                reason: format!("unknown timezone '{}' in session", name),
            })?),
        };
        self.environment = environment;
        self.timezone = timezone;
        tracing::debug!(variables = self.environment.len(), "session restored");
        Ok(state.last_script_text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::{TimeFrame, TimeParameter, Value};

    #[tokio::test]
    async fn timezone_applies_to_later_scripts() {
        let mut engine = Engine::new(HandlerTable::new());
        engine
            .execute("timezone \"Asia/Tokyo\"\n$d = 2024-01-01")
            .await
            .unwrap();
        let Value::TimeParameter(TimeParameter::Concrete(first)) =
            engine.environment().get("d").unwrap().clone()
        else {
            panic!("expected concrete time");
        };
        // Built before the timezone statement ran.
        assert_eq!(first.timezone(), Tz::UTC);

        engine.execute("$d = 2024-01-01").await.unwrap();
        let Value::TimeParameter(TimeParameter::Concrete(second)) =
            engine.environment().get("d").unwrap().clone()
        else {
            panic!("expected concrete time");
        };
        assert_eq!(second.timezone(), chrono_tz::Asia::Tokyo);
    }

    #[tokio::test]
    async fn syntax_error_runs_nothing() {
        let mut engine = Engine::new(HandlerTable::new());
        let err = engine.execute("$a = 5m\n$b = ?").await.unwrap_err();
        assert!(matches!(err, ScriptError::Syntax(_)));
        assert!(engine.environment().is_empty());
    }

    #[tokio::test]
    async fn snapshot_and_restore() {
        let mut engine = Engine::new(HandlerTable::new());
        engine
            .execute("timezone \"Europe/Paris\"\n$t = 15m")
            .await
            .unwrap();
        let state = engine.snapshot("$t = 15m").unwrap();
        assert_eq!(state.timezone.as_deref(), Some("Europe/Paris"));

        let mut fresh = Engine::new(HandlerTable::new());
        let script = fresh.restore(&state).unwrap();
        assert_eq!(script, "$t = 15m");
        assert_eq!(fresh.environment().get("t").unwrap(), &Value::TimeFrame(TimeFrame(15)));
        assert_eq!(fresh.timezone(), Some(chrono_tz::Europe::Paris));
    }

    #[test]
    fn restore_rejects_bad_timezone() {
        let mut engine = Engine::new(HandlerTable::new());
        let state = SessionState {
            last_script_text: String::new(),
            serialized_variables: "{}".into(),
            timezone: Some("Atlantis/Capital".into()),
        };
        assert!(matches!(
            engine.restore(&state),
            Err(ScriptError::Serialization { .. })
        ));
    }

    #[tokio::test]
    async fn sweep_limit_from_config() {
        let config = EngineConfig {
            max_sweep_runs: 3,
            ..EngineConfig::default()
        };
        let mut handlers = HandlerTable::new();
        handlers.register_fn("backtest", |_| async { Ok(()) });
        let mut engine = Engine::with_config(handlers, &config);
        engine
            .execute("backtest \"sma\", ES, first, last, daily, {fast: 1 to 3}")
            .await
            .unwrap();
        let err = engine
            .execute("backtest \"sma\", ES, first, last, daily, {fast: 1 to 4}")
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Range { .. }));
    }
}
