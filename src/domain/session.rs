//! Persisted session state.
//!
//! A session is the last script the user ran plus a snapshot of the variable
//! environment, stored under [`STORAGE_KEY`].

use serde::{Deserialize, Serialize};

pub const STORAGE_KEY: &str = "unquantified.session";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub last_script_text: String,
    /// Output of `Environment::serialize`.
    pub serialized_variables: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}
