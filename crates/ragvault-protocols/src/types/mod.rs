//! Common types used across the ragvault workspace.

mod chunk;
mod common;
mod query;

pub use chunk::*;
pub use common::*;
pub use query::*;
