//! Handlers that emit backend requests as JSON lines.
//!
//! Each call writes one line `{"command": ..., "request": ...}` to a shared
//! writer. Used by the `unq` front end in place of a network backend.

use crate::domain::contract::{BACKTEST, CANDLE, CORRELATION, CommandContract, PLOT};
use crate::domain::request::{BacktestRequest, CorrelationRequest, HistoryRequest};
use crate::domain::value::Value;
use crate::ports::handler_port::{CallHandler, HandlerError, HandlerFuture, HandlerTable};
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    History,
    Correlation,
    Backtest,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    command: &'a str,
    request: T,
}

pub struct JsonRequestHandler<W> {
    contract: CommandContract,
    kind: RequestKind,
    out: Arc<Mutex<W>>,
}

impl<W: Write + Send> JsonRequestHandler<W> {
    pub fn new(contract: CommandContract, kind: RequestKind, out: Arc<Mutex<W>>) -> Self {
        Self {
            contract,
            kind,
            out,
        }
    }

    fn emit(&self, arguments: &[Value]) -> Result<(), HandlerError> {
        let command = self.contract.name;
        let line = match self.kind {
            RequestKind::History => serde_json::to_string(&Envelope {
                command,
                request: HistoryRequest::from_arguments(&self.contract, arguments)
                    .map_err(|e| HandlerError::failed(e.to_string()))?,
            })?,
            RequestKind::Correlation => serde_json::to_string(&Envelope {
                command,
                request: CorrelationRequest::from_arguments(&self.contract, arguments)
                    .map_err(|e| HandlerError::failed(e.to_string()))?,
            })?,
            RequestKind::Backtest => serde_json::to_string(&Envelope {
                command,
                request: BacktestRequest::from_arguments(&self.contract, arguments)
                    .map_err(|e| HandlerError::failed(e.to_string()))?,
            })?,
        };
        let mut out = self
            .out
            .lock()
            .map_err(|_| HandlerError::failed("output writer poisoned"))?;
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> CallHandler for JsonRequestHandler<W> {
    fn call(&self, arguments: Vec<Value>) -> HandlerFuture<'_> {
        Box::pin(async move { self.emit(&arguments) })
    }
}

/// Register JSON handlers for the built-in data commands.
pub fn register_json_handlers<W>(table: &mut HandlerTable, out: Arc<Mutex<W>>)
where
    W: Write + Send + 'static,
{
    let handlers = [
        (CANDLE, RequestKind::History),
        (PLOT, RequestKind::History),
        (CORRELATION, RequestKind::Correlation),
        (BACKTEST, RequestKind::Backtest),
    ];
    for (contract, kind) in handlers {
        let name = contract.name;
        table.register(name, JsonRequestHandler::new(contract, kind, Arc::clone(&out)));
    }
}
