//! Call handler port.
//!
//! Commands are dispatched to externally supplied handlers. A handler receives
//! the resolved arguments of one call and settles once its side effects are
//! done; the evaluator awaits it before starting the next statement.

use crate::domain::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

pub trait CallHandler: Send + Sync {
    fn call(&self, arguments: Vec<Value>) -> HandlerFuture<'_>;
}

struct FnHandler<F>(F);

impl<F, Fut> CallHandler for FnHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn call(&self, arguments: Vec<Value>) -> HandlerFuture<'_> {
        Box::pin((self.0)(arguments))
    }
}

/// Command name to handler mapping, owned by one engine.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Box<dyn CallHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `command`, replacing any existing one.
    pub fn register(&mut self, command: impl Into<String>, handler: impl CallHandler + 'static) {
        self.handlers.insert(command.into(), Box::new(handler));
    }

    pub fn register_fn<F, Fut>(&mut self, command: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(command, FnHandler(handler));
    }

    pub fn get(&self, command: &str) -> Option<&dyn CallHandler> {
        self.handlers.get(command).map(|handler| handler.as_ref())
    }

    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("commands", &self.commands())
            .finish()
    }
}
