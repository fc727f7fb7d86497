//! Rasterization kernels.
//!
//! Each kernel takes `Arguments` and `Inputs`, and returns `Outputs`.
//! The implementations here run on the host with `rayon`.

pub mod composite;
pub mod composite_backward;
pub mod key;
pub mod project;
pub mod project_backward;
pub mod range;
pub mod scan;
pub mod sort;

pub use super::*;
pub use key::DuplicatedEntry;
pub use project::ProjectedGaussian;
pub use rayon::prelude::*;

pub use nalgebra::{Matrix2, Matrix2x3, Matrix3, Matrix4, Point3, Vector3, Vector4};

use nalgebra::{Quaternion, UnitQuaternion};

/// Converting a column-major `4 x 4` transform, i.e., `M[col][row]`.
#[inline]
pub(crate) fn matrix4_from_columns(columns: &[[f32; 4]; 4]) -> Matrix4<f32> {
    Matrix4::from_fn(|row, col| columns[col][row])
}

/// Converting a quaternion `[x, y, z, w]` to a rotation matrix.
///
/// The quaternion is normalized.
#[inline]
pub(crate) fn rotation_matrix(q: &[f32; 4]) -> Matrix3<f32> {
    let [x, y, z, w] = *q;
    UnitQuaternion::new_normalize(Quaternion::new(w, x, y, z))
        .to_rotation_matrix()
        .into_inner()
}
