//! Scene objects as seen by the spatial index and the culler
//!
//! Only the state that placement and visibility depend on lives here: the
//! world-space bounds, visibility flags and what kind of thing the object is.
//! Transforms, meshes and materials belong to other subsystems and are
//! expected to push updated bounds in through [`SceneObject::set_world_bounds`].

use crate::scene::AABB;

/// How an object participates in visibility tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipMode {
    /// Tested against the frustum like everything else
    #[default]
    Dynamic,
    /// Never culled; treated as inside every frustum
    Never,
}

/// The kinds of object the culler knows how to dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum SceneObjectKind {
    /// A regular drawable mesh
    Mesh(Drawable),
    /// A terrain patch
    Terrain(Drawable),
    /// A light source registered for the lighting pass
    Light(LightSource),
}

/// Draw-order information for meshes and terrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drawable {
    /// Ordering key handed to the render queue (lower draws first)
    pub render_order: i32,
}

impl Drawable {
    /// Drawable with the given render order
    pub fn new(render_order: i32) -> Self {
        Self { render_order }
    }
}

/// Types of lights supported by the lighting pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    /// Directional light (like sunlight) with parallel rays
    Directional,
    /// Point light that radiates in all directions from a position
    Point,
    /// Spot light that creates a cone of light from a position
    Spot,
}

/// Light data the culler needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSource {
    /// The type of light
    pub light_type: LightType,
    /// Light intensity multiplier
    pub intensity: f32,
}

/// Contract between the octree and the objects it indexes
pub trait SpatialObject {
    /// World-space bounds, if the object has any
    fn world_bounding_volume(&self) -> Option<AABB>;

    /// Hidden objects are neither placed nor drawn
    fn is_hidden(&self) -> bool;

    /// When false the object skips spatial placement and lives at the root
    fn clip_test_enabled(&self) -> bool;

    /// Per-object visibility test mode
    fn clip_mode(&self) -> ClipMode;
}

/// A movable, variably-sized object in the scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    /// What the object is
    pub kind: SceneObjectKind,
    world_bounds: Option<AABB>,
    hidden: bool,
    attached: bool,
    clip_test_enabled: bool,
    clip_mode: ClipMode,
    cast_shadows: bool,
}

impl SceneObject {
    /// Create a visible, attached object of the given kind
    pub fn new(kind: SceneObjectKind, world_bounds: Option<AABB>) -> Self {
        Self {
            kind,
            world_bounds,
            hidden: false,
            attached: true,
            clip_test_enabled: true,
            clip_mode: ClipMode::Dynamic,
            cast_shadows: true,
        }
    }

    /// Mesh with the given bounds and render order
    pub fn mesh(world_bounds: AABB, render_order: i32) -> Self {
        Self::new(SceneObjectKind::Mesh(Drawable::new(render_order)), Some(world_bounds))
    }

    /// Terrain patch with the given bounds and render order
    pub fn terrain(world_bounds: AABB, render_order: i32) -> Self {
        Self::new(SceneObjectKind::Terrain(Drawable::new(render_order)), Some(world_bounds))
    }

    /// Point or spot light whose influence is bounded by `world_bounds`
    pub fn light(light: LightSource, world_bounds: AABB) -> Self {
        Self::new(SceneObjectKind::Light(light), Some(world_bounds))
    }

    /// Directional light: unbounded, kept at the root and never culled
    pub fn directional_light(intensity: f32) -> Self {
        let mut object = Self::new(
            SceneObjectKind::Light(LightSource { light_type: LightType::Directional, intensity }),
            None,
        );
        object.clip_test_enabled = false;
        object.clip_mode = ClipMode::Never;
        object
    }

    /// Builder-style clip mode override
    #[must_use]
    pub fn with_clip_mode(mut self, clip_mode: ClipMode) -> Self {
        self.clip_mode = clip_mode;
        self
    }

    /// Builder-style shadow casting flag
    #[must_use]
    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    /// World-space bounds
    pub fn world_bounds(&self) -> Option<AABB> {
        self.world_bounds
    }

    /// Replace the world-space bounds
    pub fn set_world_bounds(&mut self, bounds: Option<AABB>) {
        self.world_bounds = bounds;
    }

    /// Whether the object is hidden
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    /// Show or hide the object
    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// Whether the object is attached to the scene
    pub fn attached(&self) -> bool {
        self.attached
    }

    /// Attach or detach the object
    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    /// Opt in or out of spatial placement
    pub fn set_clip_test_enabled(&mut self, enabled: bool) {
        self.clip_test_enabled = enabled;
    }

    /// Change the per-object visibility test mode
    pub fn set_clip_mode(&mut self, clip_mode: ClipMode) {
        self.clip_mode = clip_mode;
    }

    /// Whether the object is drawn into shadow maps
    pub fn cast_shadows(&self) -> bool {
        self.cast_shadows
    }

    /// Toggle shadow casting
    pub fn set_cast_shadows(&mut self, cast_shadows: bool) {
        self.cast_shadows = cast_shadows;
    }

    /// Attached and not hidden: the object belongs in the octree
    pub fn is_placeable(&self) -> bool {
        self.attached && !self.hidden
    }
}

impl SpatialObject for SceneObject {
    fn world_bounding_volume(&self) -> Option<AABB> {
        self.world_bounds
    }

    fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn clip_test_enabled(&self) -> bool {
        self.clip_test_enabled
    }

    fn clip_mode(&self) -> ClipMode {
        self.clip_mode
    }
}
