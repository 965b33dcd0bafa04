pub mod chain;
pub mod config;
pub mod error;
pub mod generate;
pub mod graph;
pub mod input;
pub mod join;
pub mod output;
pub mod schema;
pub mod solver;
pub mod state;

// Re-export key types for convenience
pub use error::{MirageError, Result};
pub use generate::{prepare, DataGenerator};
pub use schema::Catalog;
