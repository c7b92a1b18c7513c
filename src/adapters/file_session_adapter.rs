//! JSON file session store.
//!
//! The file holds a JSON object; the session lives under [`STORAGE_KEY`] and
//! any other keys in the file are preserved on save.

use crate::domain::error::ScriptError;
use crate::domain::session::{STORAGE_KEY, SessionState};
use crate::ports::session_port::SessionPort;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct FileSessionAdapter {
    path: PathBuf,
}

impl FileSessionAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_store(&self) -> Result<Option<Map<String, Value>>, ScriptError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(ScriptError::Serialization {
                reason: format!("{} does not contain a JSON object", self.path.display()),
            }),
        }
    }
}

impl SessionPort for FileSessionAdapter {
    fn load(&self) -> Result<Option<SessionState>, ScriptError> {
        let Some(mut store) = self.read_store()? else {
            return Ok(None);
        };
        match store.remove(STORAGE_KEY) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &SessionState) -> Result<(), ScriptError> {
        let mut store = self.read_store()?.unwrap_or_default();
        store.insert(STORAGE_KEY.to_string(), serde_json::to_value(state)?);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(store))?)?;
        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }
}
