//! Math utilities and types
//!
//! Provides the fundamental math types used by the spatial index and the
//! culling camera.

pub use nalgebra::{Vector3, Vector4, Matrix4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Check whether a positive value is an exact power of two (including
    /// fractional powers such as 0.5 or 0.25)
    pub fn is_power_of_two(value: f32) -> bool {
        if !value.is_finite() || value <= 0.0 {
            return false;
        }
        let exponent = value.log2().round();
        (exponent.exp2() - value).abs() <= value * f32::EPSILON
    }

    /// Smallest power of two that is greater than or equal to `value`
    ///
    /// Returns `None` for NaN, infinite or non-positive input.
    pub fn next_power_of_two(value: f32) -> Option<f32> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        let candidate = value.log2().round().exp2();
        if candidate >= value {
            Some(candidate)
        } else {
            Some(value.log2().ceil().exp2())
        }
    }

    /// Largest absolute component of a vector
    pub fn max_abs_component(v: &Vec3) -> f32 {
        v.x.abs().max(v.y.abs()).max(v.z.abs())
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a perspective projection matrix
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Create the intermediate coordinate system transformation for Vulkan
    fn vulkan_coordinate_transform() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // P matrix from Johannes Unterguggenberger's guide:
        // https://johannesugb.github.io/gpu-programming/setting-up-a-proper-vulkan-projection-matrix/
        // Depth maps to [0, 1], perspective divide by view-space z.
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;

        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn vulkan_coordinate_transform() -> Mat4 {
        // X matrix from the same guide: flips Y and Z so view space becomes
        // Vulkan's Y-down, Z-forward convention.
        Mat4::new(
            1.0,  0.0,  0.0, 0.0,
            0.0, -1.0,  0.0, 0.0,
            0.0,  0.0, -1.0, 0.0,
            0.0,  0.0,  0.0, 1.0,
        )
    }
}
