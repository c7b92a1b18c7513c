#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use unquantified::domain::engine::Engine;
use unquantified::domain::error::ScriptError;
use unquantified::domain::session::SessionState;
use unquantified::domain::value::Value;
use unquantified::ports::handler_port::{CallHandler, HandlerError, HandlerFuture, HandlerTable};
use unquantified::ports::session_port::SessionPort;

pub type CallLog = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

/// Records every call it receives into a shared log, optionally after a delay.
pub struct RecordingHandler {
    pub command: String,
    pub log: CallLog,
    pub delay: Option<Duration>,
}

impl CallHandler for RecordingHandler {
    fn call(&self, arguments: Vec<Value>) -> HandlerFuture<'_> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.log
                .lock()
                .unwrap()
                .push((self.command.clone(), arguments));
            Ok(())
        })
    }
}

pub struct FailingHandler {
    pub reason: String,
}

impl CallHandler for FailingHandler {
    fn call(&self, _arguments: Vec<Value>) -> HandlerFuture<'_> {
        Box::pin(async move { Err(HandlerError::failed(self.reason.clone())) })
    }
}

/// Handler table recording the given commands into one log.
pub fn recording_handlers(commands: &[&str]) -> (HandlerTable, CallLog) {
    let log: CallLog = Arc::default();
    let mut table = HandlerTable::new();
    for command in commands {
        table.register(
            *command,
            RecordingHandler {
                command: command.to_string(),
                log: Arc::clone(&log),
                delay: None,
            },
        );
    }
    (table, log)
}

/// Engine with recording handlers for the built-in data commands.
pub fn recording_engine() -> (Engine, CallLog) {
    let (handlers, log) = recording_handlers(&["candle", "plot", "correlation", "backtest"]);
    (Engine::new(handlers), log)
}

pub fn calls(log: &CallLog) -> Vec<(String, Vec<Value>)> {
    log.lock().unwrap().clone()
}

#[derive(Default)]
pub struct MemorySessionStore {
    pub state: Mutex<Option<SessionState>>,
}

impl SessionPort for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionState>, ScriptError> {
        Ok(self.state.lock().unwrap().clone())
    }

    fn save(&self, state: &SessionState) -> Result<(), ScriptError> {
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}
