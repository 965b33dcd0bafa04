pub mod dag;
pub mod fk_groups;
pub mod topo;
pub mod visualize;

pub use dag::DependencyGraph;
pub use fk_groups::fk_groups;
pub use topo::generation_order;
pub use visualize::{visualize, GraphFormat};
