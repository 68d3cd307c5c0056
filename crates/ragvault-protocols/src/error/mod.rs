//! Error types for the retrieval core.

mod store;
mod embedding;
mod retrieval;
mod stale;

pub use store::*;
pub use embedding::*;
pub use retrieval::*;
pub use stale::*;
