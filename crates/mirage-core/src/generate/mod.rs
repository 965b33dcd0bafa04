//! Data generation: parameter instantiation, join modelling and the
//! batch-by-batch driver.

pub mod batch;
pub mod engine;
pub mod fk;
pub mod model;
pub mod prepare;

pub use batch::BatchData;
pub use engine::{DataGenerator, TableSummary};
pub use fk::{FkColumnPlan, FkGenerator};
pub use model::{ConstructCpModel, CpSolution};
pub use prepare::{parameter_values, prepare, ColumnSummary, PrepareReport};
