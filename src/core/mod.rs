pub mod hash;
pub mod transform;
