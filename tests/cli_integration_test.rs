//! CLI integration tests.
//!
//! Tests cover:
//! - Config loading from INI files on disk (build_engine_config)
//! - `check` and `run` subcommands with real script files
//! - Session files written by `run` and restored by the next `run`

use std::io::{Cursor, Write};
use std::path::Path;
use std::process::ExitCode;
use tempfile::TempDir;
use unquantified::adapters::file_config_adapter::FileConfigAdapter;
use unquantified::adapters::file_session_adapter::FileSessionAdapter;
use unquantified::cli::{self, Cli, Command};
use unquantified::domain::config_validation::build_engine_config;
use unquantified::domain::engine::Engine;
use unquantified::domain::error::ScriptError;
use unquantified::domain::statement::Statement;
use unquantified::domain::value::{TimeFrame, TimeParameter, Value};
use unquantified::ports::handler_port::HandlerTable;
use unquantified::ports::session_port::SessionPort;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ExitCode has no PartialEq; its Debug form carries the status.
fn same_code(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{:?}", actual) == format!("{:?}", expected)
}

fn session_ini(session: &Path) -> String {
    format!(
        "[engine]\ntimezone = America/Chicago\n\n[session]\npath = {}\n",
        session.display()
    )
}

mod config_loading {
    use super::*;

    #[test]
    fn load_config_from_file() {
        let file = write_temp_ini(
            "[engine]\ntimezone = Europe/London\nmax_sweep_runs = 50\n\n[session]\npath = /tmp/unq.json\nrestore = no\n",
        );
        let adapter = cli::load_config(&file.path().to_path_buf()).unwrap();
        let config = build_engine_config(&adapter).unwrap();
        assert_eq!(config.timezone, Some(chrono_tz::Europe::London));
        assert_eq!(config.max_sweep_runs, 50);
        assert_eq!(
            config.session_path.as_deref(),
            Some(Path::new("/tmp/unq.json"))
        );
        assert!(!config.restore_session);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let adapter = FileConfigAdapter::from_string("").unwrap();
        let config = build_engine_config(&adapter).unwrap();
        assert_eq!(config.timezone, None);
        assert!(config.session_path.is_none());
        assert!(config.restore_session);
    }

    #[test]
    fn unknown_timezone_rejected() {
        let adapter = FileConfigAdapter::from_string("[engine]\ntimezone = Mars/Olympus\n").unwrap();
        let err = build_engine_config(&adapter).unwrap_err();
        assert!(matches!(err, ScriptError::ConfigInvalid { key, .. } if key == "timezone"));
    }

    #[test]
    fn missing_config_file_fails() {
        let dir = TempDir::new().unwrap();
        let code = cli::load_config(&dir.path().join("absent.ini")).unwrap_err();
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn configured_timezone_applies_to_dates() {
        let adapter = FileConfigAdapter::from_string("[engine]\ntimezone = Asia/Tokyo\n").unwrap();
        let config = build_engine_config(&adapter).unwrap();
        let engine = Engine::with_config(HandlerTable::new(), &config);
        let statements = engine.parse("candle ES, 2024-03-01").unwrap();
        let Statement::Call { arguments, .. } = &statements[0] else {
            panic!("expected call");
        };
        let Value::TimeParameter(TimeParameter::Concrete(time)) = &arguments[1] else {
            panic!("expected concrete time");
        };
        assert_eq!(time.timezone(), chrono_tz::Asia::Tokyo);
    }
}

mod check_command {
    use super::*;

    #[test]
    fn valid_script_succeeds() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "ok.unq", "$t = 5m\nplot ES, first, last, $t\n");
        let code = cli::run(Cli {
            command: Command::Check { script },
        });
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn syntax_error_exit_code() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "bad.unq", "plot ES,\n");
        let code = cli::run(Cli {
            command: Command::Check { script },
        });
        assert!(same_code(code, ExitCode::from(3)));
    }

    #[test]
    fn missing_script_exit_code() {
        let dir = TempDir::new().unwrap();
        let code = cli::run(Cli {
            command: Command::Check {
                script: dir.path().join("absent.unq"),
            },
        });
        assert!(same_code(code, ExitCode::from(1)));
    }
}

mod run_command {
    use super::*;

    #[test]
    fn run_without_config() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "s.unq", "candle ES, -1w, now\n");
        let code = cli::run(Cli {
            command: Command::Run {
                script,
                config: None,
            },
        });
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn validation_failure_exit_code() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "s.unq", "plot ES, first, last, 2000m\n");
        let code = cli::run(Cli {
            command: Command::Run {
                script,
                config: None,
            },
        });
        assert!(same_code(code, ExitCode::from(4)));
    }

    #[test]
    fn run_saves_session() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("state/session.json");
        let config = write_file(dir.path(), "unq.ini", &session_ini(&session));
        let script = write_file(dir.path(), "s.unq", "$tf = 15m\nplot ES, first, last, $tf\n");

        let code = cli::run(Cli {
            command: Command::Run {
                script,
                config: Some(config),
            },
        });
        assert!(same_code(code, ExitCode::SUCCESS));

        let state = FileSessionAdapter::new(&session).load().unwrap().unwrap();
        assert!(state.last_script_text.starts_with("$tf = 15m"));
        let mut engine = Engine::new(HandlerTable::new());
        engine.restore(&state).unwrap();
        assert_eq!(
            engine.environment().get("tf").unwrap(),
            &Value::TimeFrame(TimeFrame(15))
        );
    }

    #[test]
    fn next_run_sees_restored_variables() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("session.json");
        let config = write_file(dir.path(), "unq.ini", &session_ini(&session));
        let first = write_file(dir.path(), "first.unq", "$syms = [ES, NQ]\n");
        let second = write_file(dir.path(), "second.unq", "correlation $syms\n");

        let code = cli::run(Cli {
            command: Command::Run {
                script: first,
                config: Some(config.clone()),
            },
        });
        assert!(same_code(code, ExitCode::SUCCESS));

        let code = cli::run(Cli {
            command: Command::Run {
                script: second,
                config: Some(config),
            },
        });
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn failed_run_still_saves_earlier_assignments() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("session.json");
        let config = write_file(dir.path(), "unq.ini", &session_ini(&session));
        let script = write_file(dir.path(), "s.unq", "$a = 1h\nnosuch ES\n");

        let code = cli::run(Cli {
            command: Command::Run {
                script,
                config: Some(config),
            },
        });
        assert!(same_code(code, ExitCode::from(4)));

        let state = FileSessionAdapter::new(&session).load().unwrap().unwrap();
        assert!(state.serialized_variables.contains("\"a\""));
    }
}

mod repl_command {
    use super::*;
    use unquantified::domain::value::ParameterValue;

    #[test]
    fn open_brackets_counts_nesting() {
        assert_eq!(cli::open_brackets("plot ES"), 0);
        assert_eq!(cli::open_brackets("$p = {"), 1);
        assert_eq!(cli::open_brackets("$p = {\n  slow: [50,"), 2);
        assert_eq!(cli::open_brackets("$p = {\n  slow: [50, 100]\n}"), 0);
        assert_eq!(cli::open_brackets("backtest \"[{\", ES"), 0);
        assert_eq!(cli::open_brackets("x \"a\\\"[\""), 0);
    }

    #[test]
    fn multiline_block_runs_as_one_statement() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("session.json");
        let config = write_file(dir.path(), "unq.ini", &session_ini(&session));
        let input = "$p = {\n  fast: 5 to 20 step 5,\n  slow: [50,\n    100]\n}\n\nbacktest \"sma\", ES, first, last, daily, $p\n";

        let code = cli::repl(Cursor::new(input), Some(&config));
        assert!(same_code(code, ExitCode::SUCCESS));

        let state = FileSessionAdapter::new(&session).load().unwrap().unwrap();
        let mut engine = Engine::new(HandlerTable::new());
        engine.restore(&state).unwrap();
        let Value::Parameters(parameters) = engine.environment().get("p").unwrap() else {
            panic!("expected parameter block");
        };
        assert_eq!(
            parameters[1].value,
            ParameterValue::NumericList(vec![50.0, 100.0])
        );
        assert!(state.last_script_text.ends_with("$p"));
    }

    #[test]
    fn failing_lines_do_not_stop_the_session() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("session.json");
        let config = write_file(dir.path(), "unq.ini", &session_ini(&session));
        let input = "plot ES, ?\n$a = 5m\nnosuch 1\n$b = [ES,\n";

        let code = cli::repl(Cursor::new(input), Some(&config));
        assert!(same_code(code, ExitCode::SUCCESS));

        let state = FileSessionAdapter::new(&session).load().unwrap().unwrap();
        assert_eq!(state.last_script_text, "$a = 5m");
    }
}
