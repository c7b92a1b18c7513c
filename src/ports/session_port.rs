//! Session persistence port.

use crate::domain::error::ScriptError;
use crate::domain::session::SessionState;

pub trait SessionPort {
    /// The stored session, or `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<SessionState>, ScriptError>;
    fn save(&self, state: &SessionState) -> Result<(), ScriptError>;
}
