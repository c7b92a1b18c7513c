//! Session persistence through the engine: snapshot, store, restore.

mod common;

use common::*;
use tempfile::TempDir;
use unquantified::adapters::file_session_adapter::FileSessionAdapter;
use unquantified::domain::engine::Engine;
use unquantified::domain::error::ScriptError;
use unquantified::domain::session::SessionState;
use unquantified::domain::value::{Offset, OffsetUnit, Symbol, TimeFrame, Value};
use unquantified::ports::handler_port::HandlerTable;
use unquantified::ports::session_port::SessionPort;

async fn engine_with_state(script: &str) -> Engine {
    let mut engine = Engine::new(HandlerTable::new());
    engine.execute(script).await.unwrap();
    engine
}

mod memory_store {
    use super::*;

    #[tokio::test]
    async fn snapshot_and_restore() {
        let script = "timezone \"Europe/Berlin\"\n$tf = 2h\n$back = -3mo\n$sym = NQ";
        let engine = engine_with_state(script).await;
        let store = MemorySessionStore::default();
        store.save(&engine.snapshot(script).unwrap()).unwrap();

        let mut fresh = Engine::new(HandlerTable::new());
        let state = store.load().unwrap().unwrap();
        let text = fresh.restore(&state).unwrap();

        assert_eq!(text, script);
        assert_eq!(fresh.timezone(), Some(chrono_tz::Europe::Berlin));
        assert_eq!(fresh.environment(), engine.environment());
        assert_eq!(
            fresh.environment().get("tf").unwrap(),
            &Value::TimeFrame(TimeFrame(120))
        );
        assert_eq!(
            fresh.environment().get("back").unwrap(),
            &Value::Offset(Offset::new(-3, OffsetUnit::Month))
        );
        assert_eq!(
            fresh.environment().get("sym").unwrap(),
            &Value::Symbol(Symbol::new("NQ"))
        );
    }

    #[tokio::test]
    async fn huge_numeric_never_reaches_the_snapshot() {
        let mut engine = Engine::new(HandlerTable::new());
        engine.execute("$x = 1.5").await.unwrap();
        let script = format!("$x = 1{}", "0".repeat(400));
        let err = engine.execute(&script).await.unwrap_err();
        assert!(matches!(err, ScriptError::Syntax(ref e) if e.position == 5));

        let state = engine.snapshot(&script).unwrap();
        assert!(!state.serialized_variables.contains("null"));
        let mut fresh = Engine::new(HandlerTable::new());
        fresh.restore(&state).unwrap();
        assert_eq!(fresh.environment(), engine.environment());
        assert_eq!(fresh.environment().get("x").unwrap(), &Value::Numeric(1.5));
    }

    #[test]
    fn empty_store_loads_nothing() {
        let store = MemorySessionStore::default();
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn restored_variables_usable_in_calls() {
        let engine = engine_with_state("$s = [ES | GC]").await;
        let state = engine.snapshot("$s = [ES | GC]").unwrap();

        let (mut fresh, log) = recording_engine();
        fresh.restore(&state).unwrap();
        fresh.execute("correlation $s").await.unwrap();
        assert_eq!(calls(&log).len(), 1);
    }

    #[test]
    fn corrupt_variables_rejected() {
        let mut engine = Engine::new(HandlerTable::new());
        let state = SessionState {
            last_script_text: String::new(),
            serialized_variables: "{\"x\": 3}".to_string(),
            timezone: None,
        };
        assert!(matches!(
            engine.restore(&state),
            Err(ScriptError::Serialization { .. })
        ));
        assert!(engine.environment().is_empty());
    }

    #[test]
    fn unknown_timezone_rejected() {
        let mut engine = Engine::new(HandlerTable::new());
        let state = SessionState {
            last_script_text: String::new(),
            serialized_variables: "{}".to_string(),
            timezone: Some("Nowhere/City".to_string()),
        };
        assert!(matches!(
            engine.restore(&state),
            Err(ScriptError::Serialization { .. })
        ));
    }
}

mod file_store {
    use super::*;

    #[tokio::test]
    async fn engine_state_survives_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let adapter = FileSessionAdapter::new(dir.path().join("session.json"));
        let script = "$from = 2024-02-29\n$every = daily";
        let engine = engine_with_state(script).await;
        adapter.save(&engine.snapshot(script).unwrap()).unwrap();

        let mut fresh = Engine::new(HandlerTable::new());
        let text = fresh.restore(&adapter.load().unwrap().unwrap()).unwrap();
        assert_eq!(text, script);
        assert_eq!(fresh.environment(), engine.environment());
    }

    #[tokio::test]
    async fn later_save_replaces_earlier() {
        let dir = TempDir::new().unwrap();
        let adapter = FileSessionAdapter::new(dir.path().join("session.json"));
        let first = engine_with_state("$a = 1m").await;
        adapter.save(&first.snapshot("$a = 1m").unwrap()).unwrap();
        let second = engine_with_state("$b = 2m").await;
        adapter.save(&second.snapshot("$b = 2m").unwrap()).unwrap();

        let mut fresh = Engine::new(HandlerTable::new());
        fresh.restore(&adapter.load().unwrap().unwrap()).unwrap();
        assert!(!fresh.environment().contains("a"));
        assert!(fresh.environment().contains("b"));
    }
}
