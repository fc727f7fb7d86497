//! Real spherical harmonics for view-dependent colors.

use std::{f64::consts::PI, sync::LazyLock};

/// The count of spherical harmonics coefficients
pub const SH_COUNT_MAX: usize = (SH_DEGREE_MAX as usize + 1).pow(2);

/// The maximum degree of spherical harmonics
pub const SH_DEGREE_MAX: u32 = 3;

/// The real coefficients of orthonormalized spherical harmonics from degree 0 to 3
///
/// ## Examples
///
/// ```rust
/// use gausplat_rasterizer::spherical_harmonics::SH_COEF;
///
/// assert_eq!(SH_COEF.0[0], 0.28209479177387814);
/// assert_eq!(SH_COEF.1[1], 0.4886025119029199);
/// assert_eq!(SH_COEF.2[4], 0.5462742152960396);
/// assert_eq!(SH_COEF.3[3 + 2], 1.445305721320277);
/// ```
#[allow(clippy::type_complexity)]
pub static SH_COEF: LazyLock<([f64; 1], [f64; 3], [f64; 5], [f64; 7])> =
    LazyLock::new(|| {
        (
            [(1.0 / 4.0 / PI).sqrt()],
            [
                -(3.0 / 4.0 / PI).sqrt(),
                (3.0 / 4.0 / PI).sqrt(),
                -(3.0 / 4.0 / PI).sqrt(),
            ],
            [
                (15.0 / 4.0 / PI).sqrt(),
                -(15.0 / 4.0 / PI).sqrt(),
                (5.0 / 16.0 / PI).sqrt(),
                -(15.0 / 4.0 / PI).sqrt(),
                (15.0 / 16.0 / PI).sqrt(),
            ],
            [
                -(35.0 / 32.0 / PI).sqrt(),
                (105.0 / 4.0 / PI).sqrt(),
                -(21.0 / 32.0 / PI).sqrt(),
                (7.0 / 16.0 / PI).sqrt(),
                -(21.0 / 32.0 / PI).sqrt(),
                (105.0 / 16.0 / PI).sqrt(),
                -(35.0 / 32.0 / PI).sqrt(),
            ],
        )
    });

/// The count of coefficients used up to `degree`, i.e. `(degree + 1)^2`.
#[inline]
pub const fn sh_count(degree: u32) -> usize {
    (degree as usize + 1).pow(2)
}

/// Evaluating the basis functions up to `degree` at `direction`.
///
/// The entries beyond [`sh_count`] are zero.
pub fn basis(
    degree: u32,
    direction: &[f32; 3],
) -> [f32; SH_COUNT_MAX] {
    let c = &*SH_COEF;
    let [x, y, z] = *direction;
    let mut b = [0.0; SH_COUNT_MAX];

    b[0] = c.0[0] as f32;
    if degree == 0 {
        return b;
    }

    b[1] = c.1[0] as f32 * y;
    b[2] = c.1[1] as f32 * z;
    b[3] = c.1[2] as f32 * x;
    if degree == 1 {
        return b;
    }

    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, yz, xz) = (x * y, y * z, x * z);
    b[4] = c.2[0] as f32 * xy;
    b[5] = c.2[1] as f32 * yz;
    b[6] = c.2[2] as f32 * (2.0 * zz - xx - yy);
    b[7] = c.2[3] as f32 * xz;
    b[8] = c.2[4] as f32 * (xx - yy);
    if degree == 2 {
        return b;
    }

    b[9] = c.3[0] as f32 * y * (3.0 * xx - yy);
    b[10] = c.3[1] as f32 * xy * z;
    b[11] = c.3[2] as f32 * y * (4.0 * zz - xx - yy);
    b[12] = c.3[3] as f32 * z * (2.0 * zz - 3.0 * xx - 3.0 * yy);
    b[13] = c.3[4] as f32 * x * (4.0 * zz - xx - yy);
    b[14] = c.3[5] as f32 * z * (xx - yy);
    b[15] = c.3[6] as f32 * x * (xx - 3.0 * yy);
    b
}

/// The partial derivatives of [`basis`] with respect to `direction`.
pub fn basis_grad(
    degree: u32,
    direction: &[f32; 3],
) -> [[f32; 3]; SH_COUNT_MAX] {
    let c = &*SH_COEF;
    let [x, y, z] = *direction;
    let mut g = [[0.0; 3]; SH_COUNT_MAX];

    if degree == 0 {
        return g;
    }

    g[1] = [0.0, c.1[0] as f32, 0.0];
    g[2] = [0.0, 0.0, c.1[1] as f32];
    g[3] = [c.1[2] as f32, 0.0, 0.0];
    if degree == 1 {
        return g;
    }

    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, yz, xz) = (x * y, y * z, x * z);
    let scale = |k: f64, v: [f32; 3]| v.map(|v| k as f32 * v);
    g[4] = scale(c.2[0], [y, x, 0.0]);
    g[5] = scale(c.2[1], [0.0, z, y]);
    g[6] = scale(c.2[2], [-2.0 * x, -2.0 * y, 4.0 * z]);
    g[7] = scale(c.2[3], [z, 0.0, x]);
    g[8] = scale(c.2[4], [2.0 * x, -2.0 * y, 0.0]);
    if degree == 2 {
        return g;
    }

    g[9] = scale(c.3[0], [6.0 * xy, 3.0 * xx - 3.0 * yy, 0.0]);
    g[10] = scale(c.3[1], [yz, xz, xy]);
    g[11] = scale(c.3[2], [-2.0 * xy, 4.0 * zz - xx - 3.0 * yy, 8.0 * yz]);
    g[12] = scale(
        c.3[3],
        [-6.0 * xz, -6.0 * yz, 6.0 * zz - 3.0 * xx - 3.0 * yy],
    );
    g[13] = scale(c.3[4], [4.0 * zz - 3.0 * xx - yy, -2.0 * xy, 8.0 * xz]);
    g[14] = scale(c.3[5], [2.0 * xz, -2.0 * yz, xx - yy]);
    g[15] = scale(c.3[6], [3.0 * xx - 3.0 * yy, -6.0 * xy, 0.0]);
    g
}

/// Transforming colors from SH space to RGB space.
///
/// `colors_sh` holds at least [`sh_count`] rows of RGB coefficients.
/// The `0.5` offset and clamping are left to the caller.
pub fn to_rgb(
    degree: u32,
    direction: &[f32; 3],
    colors_sh: &[[f32; 3]],
) -> [f32; 3] {
    let b = basis(degree, direction);
    colors_sh[..sh_count(degree)]
        .iter()
        .zip(b)
        .fold([0.0; 3], |mut rgb, (coef, b)| {
            rgb[0] += b * coef[0];
            rgb[1] += b * coef[1];
            rgb[2] += b * coef[2];
            rgb
        })
}

/// The backward pass of [`to_rgb`].
///
/// The coefficient gradients are accumulated into `colors_sh_grad`,
/// and the gradient with respect to `direction` is returned.
pub fn to_rgb_backward(
    degree: u32,
    direction: &[f32; 3],
    colors_sh: &[[f32; 3]],
    color_rgb_grad: &[f32; 3],
    colors_sh_grad: &mut [[f32; 3]],
) -> [f32; 3] {
    let count = sh_count(degree);
    let b = basis(degree, direction);
    let b_grad = basis_grad(degree, direction);

    let mut direction_grad = [0.0; 3];
    for k in 0..count {
        let coef = &colors_sh[k];
        colors_sh_grad[k][0] += b[k] * color_rgb_grad[0];
        colors_sh_grad[k][1] += b[k] * color_rgb_grad[1];
        colors_sh_grad[k][2] += b[k] * color_rgb_grad[2];

        // dL/db_k
        let g = coef[0] * color_rgb_grad[0]
            + coef[1] * color_rgb_grad[1]
            + coef[2] * color_rgb_grad[2];
        direction_grad[0] += g * b_grad[k][0];
        direction_grad[1] += g * b_grad[k][1];
        direction_grad[2] += g * b_grad[k][2];
    }
    direction_grad
}
