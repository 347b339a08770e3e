//! Bounding volumes and frustum classification
//!
//! Axis-aligned boxes, planes and view frustums, plus the three-way clip
//! classification the culling walk is built on.

use crate::foundation::math::{utils::max_abs_component, Mat4, Vec3, Vec4};
use bitflags::bitflags;

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Create an inverted box that any `extend` call will overwrite
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// True when both corners are finite and `min <= max` on every axis
    ///
    /// A zero-extent box (a point) is valid; NaN or inverted boxes are not.
    pub fn is_valid(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|v| v.is_finite())
            && self.min.x <= self.max.x
            && self.min.y <= self.max.y
            && self.min.z <= self.max.z
    }

    /// Grow this box to cover another
    pub fn extend(&mut self, other: &AABB) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Union of two boxes
    pub fn merged(&self, other: &AABB) -> AABB {
        let mut merged = *self;
        merged.extend(other);
        merged
    }

    /// Copy of this box grown by `margin` on every side
    pub fn expanded(&self, margin: f32) -> AABB {
        let margin = Vec3::repeat(margin);
        AABB::new(self.min - margin, self.max + margin)
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB fully contains another
    pub fn contains_aabb(&self, other: &AABB) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Largest absolute coordinate over both corners
    pub fn farthest_coordinate(&self) -> f32 {
        max_abs_component(&self.min).max(max_abs_component(&self.max))
    }

    /// Classify this box against every plane of a frustum
    pub fn classify(&self, frustum: &Frustum) -> ClipState {
        frustum.classify_aabb(self)
    }

    /// Classify this box against the subset of frustum planes in `mask`
    pub fn classify_masked(&self, frustum: &Frustum, mask: ClipMask) -> ClipState {
        frustum.classify_aabb_masked(self, mask)
    }
}

/// Result of testing a bounding volume against a frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipState {
    /// Entirely outside at least one plane: cull it
    Outside,
    /// Entirely inside every tested plane: descendants need no further test
    Inside,
    /// Straddles at least one plane: keep it, test children individually
    Intersecting,
}

impl ClipState {
    /// True unless the volume was rejected
    pub fn is_visible(self) -> bool {
        self != ClipState::Outside
    }
}

bitflags! {
    /// Subset of frustum planes a camera wants tested
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClipMask: u8 {
        /// Left plane
        const LEFT = 1 << 0;
        /// Right plane
        const RIGHT = 1 << 1;
        /// Bottom plane
        const BOTTOM = 1 << 2;
        /// Top plane
        const TOP = 1 << 3;
        /// Near plane
        const NEAR = 1 << 4;
        /// Far plane
        const FAR = 1 << 5;
        /// The four side planes, for cameras that skip depth clipping
        const SIDES = Self::LEFT.bits() | Self::RIGHT.bits() | Self::BOTTOM.bits() | Self::TOP.bits();
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six inward-facing planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for clip space `-w <= x, y <= w` and
    /// `0 <= z <= w` (the depth range produced by `Mat4Ext::perspective`).
    pub fn from_matrix(vp_matrix: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { vp_matrix.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Frustum whose planes bound an axis-aligned box
    ///
    /// Useful for orthographic shadow cameras and region queries.
    pub fn from_aabb(bounds: &AABB) -> Self {
        Self {
            planes: [
                Plane::new(Vec3::new(1.0, 0.0, 0.0), -bounds.min.x),
                Plane::new(Vec3::new(-1.0, 0.0, 0.0), bounds.max.x),
                Plane::new(Vec3::new(0.0, 1.0, 0.0), -bounds.min.y),
                Plane::new(Vec3::new(0.0, -1.0, 0.0), bounds.max.y),
                Plane::new(Vec3::new(0.0, 0.0, 1.0), -bounds.min.z),
                Plane::new(Vec3::new(0.0, 0.0, -1.0), bounds.max.z),
            ],
        }
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.classify_aabb(aabb).is_visible()
    }

    /// Classify an AABB against all six planes
    pub fn classify_aabb(&self, aabb: &AABB) -> ClipState {
        self.classify_aabb_masked(aabb, ClipMask::all())
    }

    /// Classify an AABB against the planes selected by `mask`
    ///
    /// For each plane the corner furthest along the normal decides whether the
    /// box is outside, and the opposite corner whether it straddles the plane.
    pub fn classify_aabb_masked(&self, aabb: &AABB, mask: ClipMask) -> ClipState {
        let mut state = ClipState::Inside;

        for (index, plane) in self.planes.iter().enumerate() {
            if !mask.contains(ClipMask::from_bits_truncate(1 << index)) {
                continue;
            }

            let mut positive = aabb.min;
            let mut negative = aabb.max;
            if plane.normal.x >= 0.0 { positive.x = aabb.max.x; negative.x = aabb.min.x; }
            if plane.normal.y >= 0.0 { positive.y = aabb.max.y; negative.y = aabb.min.y; }
            if plane.normal.z >= 0.0 { positive.z = aabb.max.z; negative.z = aabb.min.z; }

            if plane.distance_to_point(positive) < 0.0 {
                return ClipState::Outside;
            }
            if plane.distance_to_point(negative) < 0.0 {
                state = ClipState::Intersecting;
            }
        }

        state
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (should be normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Build a plane from `ax + by + cz + d = 0` coefficients, normalizing
    /// both the normal and the distance
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = Vec3::new(coefficients.x, coefficients.y, coefficients.z);
        let length = normal.magnitude();
        if length > 0.0 {
            Self { normal: normal / length, distance: coefficients.w / length }
        } else {
            Self { normal, distance: coefficients.w }
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}
