pub mod gaussian_3d;
pub mod point;
