/// Minimum number of extracted geometries handed to one rayon task by `foreach_real_geometry`.
pub const FOREACH_GRAIN_SIZE: usize = 8;
/// Minimum number of realize tasks per rayon job.
pub const REALIZE_GRAIN_SIZE: usize = 100;
/// Minimum number of attributes per rayon job when filling joined attributes.
pub const ATTRIBUTE_GRAIN_SIZE: usize = 10;

pub const ID_ATTRIBUTE: &str = "id";
pub const POSITION_ATTRIBUTE: &str = "position";
pub const RADIUS_ATTRIBUTE: &str = "radius";
pub const HANDLE_LEFT_ATTRIBUTE: &str = "handle_left";
pub const HANDLE_RIGHT_ATTRIBUTE: &str = "handle_right";

/// Bookkeeping names never propagated by joins.
pub const REFERENCE_INDEX_ATTRIBUTE: &str = ".reference_index";
pub const INSTANCE_TRANSFORM_ATTRIBUTE: &str = "instance_transform";

/// Attributes whose name starts with this are anonymous (temporary) attributes.
pub const ANONYMOUS_ATTRIBUTE_PREFIX: &str = ".a_";

/// Default radius of realized points that had none.
pub const DEFAULT_POINT_RADIUS: f32 = 0.01;
/// Default radius of realized curves that had none.
pub const DEFAULT_CURVE_RADIUS: f32 = 1.0;
