//! Sparse point clouds.

/// A point of a sparse point cloud, e.g., from structure-from-motion.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    /// Normalized
    pub color_rgb: [f64; 3],
    pub position: [f64; 3],
}

pub type Points = Vec<Point>;
