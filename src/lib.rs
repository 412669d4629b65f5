//! marksync: keeps several local bookmark stores and one remote account in sync.
//!
//! This library crate exposes all modules for use by the daemon binary and the
//! integration tests.

pub mod database;
pub mod managers;
pub mod platform;
pub mod services;
pub mod types;
