//! Configuration model for Weft
//!
//! Parses YAML/JSON workflow and application configs, expands `${…}` secret
//! tokens, and validates the declared module graph before the engine builds.

pub mod duration;
pub mod expand;
pub mod loader;
pub mod secrets;
pub mod types;
pub mod validate;

pub use duration::*;
pub use expand::*;
pub use loader::*;
pub use secrets::*;
pub use types::*;
pub use validate::*;
