//! Configuration access port.
//!
//! Lookups never fail: a missing or malformed value yields the caller's default,
//! and [`crate::domain::config_validation`] decides what is acceptable.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
