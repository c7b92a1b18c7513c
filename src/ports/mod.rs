//! Port traits at the engine's I/O seams.

pub mod config_port;
pub mod handler_port;
pub mod session_port;
