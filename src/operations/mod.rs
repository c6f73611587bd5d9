//! Operations over whole geometry trees.

pub mod foreach_real_geometry;
pub mod join_geometries;
pub mod realize_instances;

pub use foreach_real_geometry::{ForeachOptions, foreach_real_geometry};
pub use join_geometries::{JoinOptions, join_geometries};
pub use realize_instances::{RealizeError, RealizeInstancesOptions, RealizeInstancesResult, realize_instances};
