//! Culling camera
//!
//! Provides the frustum and the optional plane mask a culling pass tests
//! against. Matrices follow the P × X × V chain (projection, Vulkan axis
//! flip, view) so the extracted frustum matches what the renderer draws.

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::scene::{ClipMask, Frustum};

/// Identifies the camera a render item was culled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u32);

/// Camera used for frustum culling
///
/// A perspective camera by default. Shadow-map or region cameras can supply
/// their frustum directly with [`Camera::from_frustum`].
#[derive(Debug, Clone)]
pub struct Camera {
    /// Identifier pushed along with every queued object
    pub id: CameraId,

    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Field of view angle in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,

    clip_mask: Option<ClipMask>,
    frustum_override: Option<Frustum>,
}

impl Camera {
    /// Create a perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `id` - Identifier attached to queued items
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height)
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(id: CameraId, position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            id,
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
            clip_mask: None,
            frustum_override: None,
        }
    }

    /// Camera defined only by its frustum
    pub fn from_frustum(id: CameraId, frustum: Frustum) -> Self {
        let mut camera = Self::perspective(id, Vec3::zeros(), 90.0, 1.0, 0.1, 1000.0);
        camera.frustum_override = Some(frustum);
        camera
    }

    /// Point the camera at `target` with the given up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera {:?} look_at updated - target: {:?}, up: {:?}", self.id, target, up);
    }

    /// Restrict culling to a subset of frustum planes
    pub fn set_clip_mask(&mut self, mask: Option<ClipMask>) {
        self.clip_mask = mask;
    }

    /// Planes to test, `None` meaning all six
    pub fn clip_mask(&self) -> Option<ClipMask> {
        self.clip_mask
    }

    /// World-to-camera transform
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// Perspective projection
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov, self.aspect, self.near, self.far)
    }

    /// Combined P × X × V matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * Mat4::vulkan_coordinate_transform() * self.view_matrix()
    }

    /// Current view frustum
    pub fn frustum(&self) -> Frustum {
        self.frustum_override
            .clone()
            .unwrap_or_else(|| Frustum::from_matrix(&self.view_projection_matrix()))
    }
}
