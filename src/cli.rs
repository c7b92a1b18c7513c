//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::file_session_adapter::FileSessionAdapter;
use crate::adapters::json_request_handler::register_json_handlers;
use crate::domain::config_validation::{build_engine_config, EngineConfig};
use crate::domain::engine::Engine;
use crate::domain::error::ScriptError;
use crate::ports::handler_port::HandlerTable;
use crate::ports::session_port::SessionPort;

#[derive(Parser, Debug)]
#[command(name = "unq", about = "Financial query scripting engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a script, printing one backend request per call
    Run {
        script: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Parse a script and print its statements, in script syntax, without running it
    Check { script: PathBuf },
    /// Read statements from stdin and run each as it completes; a line with an
    /// open `[` or `{` continues onto the next
    Repl {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();
    match cli.command {
        Command::Run { script, config } => run_script(&script, config.as_ref()),
        Command::Check { script } => run_check(&script),
        Command::Repl { config } => run_repl(config.as_ref()),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when called more than once.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .with(filter)
        .try_init();
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = ScriptError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn load_engine_config(path: Option<&PathBuf>) -> Result<EngineConfig, ExitCode> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let adapter = load_config(path)?;
    build_engine_config(&adapter).map_err(|e| report(&e, None))
}

fn read_script(path: &PathBuf) -> Result<String, ExitCode> {
    fs::read_to_string(path).map_err(|e| {
        eprintln!("error: cannot read {}: {e}", path.display());
        ExitCode::from(&ScriptError::Io(e))
    })
}

/// Print `err` to stderr, with source context for syntax errors.
fn report(err: &ScriptError, source: Option<&str>) -> ExitCode {
    match (err, source) {
        (ScriptError::Syntax(e), Some(source)) => {
            eprintln!("error: {}", e.display_with_context(source))
        }
        _ => eprintln!("error: {err}"),
    }
    err.into()
}

fn runtime() -> Result<tokio::runtime::Runtime, ExitCode> {
    tokio::runtime::Runtime::new().map_err(|e| report(&ScriptError::Io(e), None))
}

fn json_engine(config: &EngineConfig) -> Engine {
    let mut handlers = HandlerTable::new();
    register_json_handlers(&mut handlers, Arc::new(Mutex::new(io::stdout())));
    Engine::with_config(handlers, config)
}

/// Restore the configured session into `engine`, if any.
fn restore_session(engine: &mut Engine, config: &EngineConfig) -> Result<Option<FileSessionAdapter>, ExitCode> {
    let Some(path) = &config.session_path else {
        return Ok(None);
    };
    let store = FileSessionAdapter::new(path);
    if config.restore_session {
        match store.load() {
            Ok(Some(state)) => {
                engine.restore(&state).map_err(|e| report(&e, None))?;
            }
            Ok(None) => {}
            Err(e) => return Err(report(&e, None)),
        }
    }
    Ok(Some(store))
}

fn save_session(store: Option<&FileSessionAdapter>, engine: &Engine, script: &str) -> Result<(), ExitCode> {
    let Some(store) = store else {
        return Ok(());
    };
    engine
        .snapshot(script)
        .and_then(|state| store.save(&state))
        .map_err(|e| report(&e, None))
}

fn run_script(script_path: &PathBuf, config_path: Option<&PathBuf>) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let source = match read_script(script_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    let mut engine = json_engine(&config);
    let store = match restore_session(&mut engine, &config) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let result = rt.block_on(engine.execute(&source));

    // Statements that ran keep their effects, so the session is saved either way.
    if let Err(code) = save_session(store.as_ref(), &engine, &source) {
        return code;
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e, Some(&source)),
    }
}

fn run_check(script_path: &PathBuf) -> ExitCode {
    let source = match read_script(script_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let engine = Engine::new(HandlerTable::new());
    match engine.parse(&source) {
        Ok(statements) => {
            for statement in &statements {
                println!("{}", statement);
            }
            let timezone = engine.timezone().unwrap_or(chrono_tz::Tz::UTC);
            eprintln!("{} statement(s) OK, dates in {}", statements.len(), timezone.name());
            ExitCode::SUCCESS
        }
        Err(e) => report(&e, Some(&source)),
    }
}

fn run_repl(config_path: Option<&PathBuf>) -> ExitCode {
    repl(io::stdin().lock(), config_path)
}

/// Bracket and brace nesting left open at the end of `text`, ignoring quoted strings.
pub fn open_brackets(text: &str) -> i64 {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match (in_string, ch) {
            (true, '\\') => {
                chars.next();
            }
            (true, '"') | (true, '\n') => in_string = false,
            (false, '"') => in_string = true,
            (false, '[') | (false, '{') => depth += 1,
            (false, ']') | (false, '}') => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Run statements read from `input` against one engine, saving the session at the end.
pub fn repl<R: BufRead>(input: R, config_path: Option<&PathBuf>) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    let mut engine = json_engine(&config);
    let store = match restore_session(&mut engine, &config) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let mut history: Vec<String> = Vec::new();
    let mut pending = String::new();
    let mut lines = input.lines();
    loop {
        let line = match lines.next() {
            Some(Ok(l)) => Some(l),
            Some(Err(e)) => return report(&ScriptError::Io(e), None),
            None => None,
        };
        let at_end = line.is_none();
        if let Some(line) = line {
            if pending.is_empty() && line.trim().is_empty() {
                continue;
            }
            if !pending.is_empty() {
                pending.push('\n');
            }
            pending.push_str(&line);
            if open_brackets(&pending) > 0 {
                continue;
            }
        }
        if !pending.is_empty() {
            let block = std::mem::take(&mut pending);
            match rt.block_on(engine.execute(&block)) {
                Ok(()) => history.push(block),
                Err(e) => {
                    report(&e, Some(&block));
                }
            }
        }
        if at_end {
            break;
        }
    }

    match save_session(store.as_ref(), &engine, &history.join("\n")) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
