use cgmath::Matrix4;

/// One named voxel grid. The voxel layout is opaque here.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeGrid {
    pub name: String,
    pub transform: Matrix4<f32>,
    pub voxels: Vec<f32>,
}

/// A set of voxel grids.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume {
    grids: Vec<VolumeGrid>,
}

impl Volume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grids(&self) -> &[VolumeGrid] {
        &self.grids
    }

    pub fn add_grid(&mut self, grid: VolumeGrid) {
        self.grids.push(grid);
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Moves every grid; voxel data stays untouched.
    pub fn transform(&mut self, matrix: &Matrix4<f32>) {
        for grid in &mut self.grids {
            grid.transform = *matrix * grid.transform;
        }
    }
}
