pub use super::*;

/// The Gaussian set to render.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderInput {
    /// `[P, M * 3]`
    pub colors_sh: Vec<f32>,
    /// `[P]`
    pub opacities: Vec<f32>,
    /// `[P, 3]`
    pub positions: Vec<[f32; 3]>,
    /// `[P, 4]`, in the order `[x, y, z, w]`.
    pub rotations: Vec<[f32; 4]>,
    /// `[P, 3]`
    pub scalings: Vec<[f32; 3]>,
}

#[derive(Clone, Debug)]
pub struct RenderOutput {
    /// `[I_y, I_x]`, `1 - T`
    pub alphas_2d: Vec<f32>,
    /// `[I_y, I_x, 3]`
    pub colors_rgb_2d: Vec<[f32; 3]>,
    /// `[P]`
    pub depths: Vec<f32>,
    /// `[P, 2]`
    pub positions_2d: Vec<[f32; 2]>,
    /// `[P]`
    pub radii: Vec<u32>,
    pub state: backward::RenderInput,
    /// `[P]`
    pub visibilities: Vec<bool>,
}

impl RenderInput {
    /// `P`
    #[inline]
    pub fn point_count(&self) -> usize {
        self.positions.len()
    }

    /// `M`
    #[inline]
    pub fn colors_sh_count(&self) -> usize {
        match self.point_count() {
            0 => 0,
            point_count => self.colors_sh.len() / point_count / 3,
        }
    }

    /// Checking the shapes of the attributes.
    pub fn validate(
        &self,
        colors_sh_degree_max: u32,
    ) -> Result<&Self, Error> {
        let point_count = self.point_count();

        if point_count as u64 > u32::MAX as u64 {
            return Err(Error::CapacityOverflow(
                "point count".into(),
                point_count as u64,
                u32::MAX as u64,
            ));
        }

        let counts = [
            ("opacities", self.opacities.len()),
            ("rotations", self.rotations.len()),
            ("scalings", self.scalings.len()),
        ];
        for (name, count) in counts {
            if count != point_count {
                return Err(Error::Validation(
                    format!("the count of {name} ({count})"),
                    format!("equal to the count of positions ({point_count})"),
                ));
            }
        }

        if point_count == 0 {
            return Ok(self);
        }

        let colors_sh_count = self.colors_sh_count();
        if self.colors_sh.len() != point_count * colors_sh_count * 3 {
            return Err(Error::Validation(
                format!("the length of colors_sh ({})", self.colors_sh.len()),
                format!("a multiple of {}", point_count * 3),
            ));
        }
        let colors_sh_count_min = sh_count(colors_sh_degree_max);
        if colors_sh_count < colors_sh_count_min {
            return Err(Error::Validation(
                format!("the count of SH coefficients ({colors_sh_count})"),
                format!("at least {colors_sh_count_min}"),
            ));
        }

        Ok(self)
    }
}
