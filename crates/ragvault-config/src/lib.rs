//! # ragvault Config
//!
//! TOML configuration for the ragvault retrieval engine: schema with
//! defaults for every field, a loader with `${VAR}` and `~` expansion, and a
//! validator that separates hard errors from warnings.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
