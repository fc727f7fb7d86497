/// A view in 3D space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct View {
    /// The horizontal field of view in radians.
    pub field_of_view_x: f64,
    /// The vertical field of view in radians.
    pub field_of_view_y: f64,
    /// Image height.
    pub image_height: u32,
    /// Image width.
    pub image_width: u32,
    /// Perspective transformation from view space to clip space.
    ///
    /// It is in **column-major order**, i.e., `M[col][row]`.
    ///
    /// It can be built with [`View::projection`].
    pub projection_transform: [[f64; 4]; 4],
    /// View ID.
    pub view_id: u32,
    /// Position in world space.
    pub view_position: [f64; 3],
    /// Affine transformation from world space to view space.
    ///
    /// It is in **column-major order**, i.e., `M[col][row]`.
    ///
    /// # Format
    ///
    /// ```plaintext
    /// [R_v   | T_v]
    /// [...   | ...]
    /// [0 0 0 | 1  ]
    /// ```
    pub view_transform: [[f64; 4]; 4],
}

/// Linear transformations.
impl View {
    /// Returns the affine transformation matrix.
    ///
    /// It is in **column-major order**, i.e., `M[col][row]`.
    #[inline]
    pub const fn transform(
        rotation: &[[f64; 3]; 3],
        translation: &[f64; 3],
    ) -> [[f64; 4]; 4] {
        let r = rotation;
        let t = translation;
        [
            [r[0][0], r[0][1], r[0][2], 0.0],
            [r[1][0], r[1][1], r[1][2], 0.0],
            [r[2][0], r[2][1], r[2][2], 0.0],
            [t[0], t[1], t[2], 1.0],
        ]
    }

    /// Returns the symmetric perspective projection matrix.
    ///
    /// It is in **column-major order**, i.e., `M[col][row]`.
    ///
    /// # Format
    ///
    /// ```plaintext
    /// [1 / tan(Fov_x / 2) | 0                  | 0           | 0               ]
    /// [0                  | 1 / tan(Fov_y / 2) | 0           | 0               ]
    /// [0                  | 0                  | f / (f - n) | -f * n / (f - n)]
    /// [0                  | 0                  | 1           | 0               ]
    /// ```
    pub fn projection(
        depth_near: f64,
        depth_far: f64,
        field_of_view_x: f64,
        field_of_view_y: f64,
    ) -> [[f64; 4]; 4] {
        let x = 1.0 / (field_of_view_x / 2.0).tan();
        let y = 1.0 / (field_of_view_y / 2.0).tan();
        let z = depth_far / (depth_far - depth_near);
        let w = -depth_far * depth_near / (depth_far - depth_near);
        [
            [x, 0.0, 0.0, 0.0],
            [0.0, y, 0.0, 0.0],
            [0.0, 0.0, z, 1.0],
            [0.0, 0.0, w, 0.0],
        ]
    }

    /// Building a view from the camera pose and intrinsics.
    ///
    /// The view position is recovered from the inverse of the affine transform.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rotation: &[[f64; 3]; 3],
        translation: &[f64; 3],
        field_of_view_x: f64,
        field_of_view_y: f64,
        image_height: u32,
        image_width: u32,
        depth_near: f64,
        depth_far: f64,
    ) -> Self {
        // P_c = -R_v^T * T_v
        let r = rotation;
        let t = translation;
        let view_position = [0, 1, 2].map(|col| {
            -(r[col][0] * t[0] + r[col][1] * t[1] + r[col][2] * t[2])
        });

        Self {
            field_of_view_x,
            field_of_view_y,
            image_height,
            image_width,
            projection_transform: Self::projection(
                depth_near,
                depth_far,
                field_of_view_x,
                field_of_view_y,
            ),
            view_id: 0,
            view_position,
            view_transform: Self::transform(rotation, translation),
        }
    }
}

/// Dimension operations
impl View {
    /// Returns the aspect ratio (`width / height`).
    #[inline]
    pub const fn aspect_ratio(&self) -> f32 {
        self.image_width as f32 / self.image_height as f32
    }

    /// Resizing the view to the maximum side length of `to`.
    pub fn resize_max(
        &mut self,
        to: u32,
    ) -> &mut Self {
        let ratio = self.aspect_ratio();
        if ratio > 1.0 {
            self.image_width = to;
            self.image_height = (to as f32 / ratio).ceil() as u32;
        } else {
            self.image_width = (to as f32 * ratio).ceil() as u32;
            self.image_height = to;
        }
        self
    }
}
