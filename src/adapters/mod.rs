//! Concrete adapter implementations for ports.

pub mod file_config_adapter;
pub mod file_session_adapter;
pub mod json_request_handler;
