pub mod distribution;
pub mod render;
pub mod types;

pub use distribution::{Distribution, Placement, PlacementRequest, Segment};
pub use types::{Catalog, Column, ColumnType, ForeignKey, Table};
