//! Geometry instancing: shared geometry placed many times by reference and transform, and the
//! operations that join, realize and edit nested instance trees.

pub mod attributes;
pub mod constants;
pub mod core;
pub mod geometry;
pub mod instances;
pub mod operations;
pub mod scene;

pub use geometry::{ComponentType, GeometryComponent, GeometrySet};
pub use instances::{InstanceReference, Instances, ReferenceKind};
pub use scene::{SceneData, SceneError};
