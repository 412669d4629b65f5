// marksync shared type definitions
// Each submodule defines types used across the crate.

pub mod bookmark;
pub mod credential;
pub mod errors;
pub mod href;
pub mod serial;
pub mod settings;
pub mod sync;
