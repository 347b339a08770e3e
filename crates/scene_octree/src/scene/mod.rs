//! Scene management
//!
//! Owns the scene objects and keeps the octree in step with them:
//!
//! ```text
//! object mutations → dirty set
//!      ↓ (once per frame)
//! flush_placements → Octree
//!      ↓ (per camera)
//! CullVisitor → RenderQueue
//! ```

mod bounds;
mod camera;
mod render_queue;
mod scene_manager;
mod scene_object;

pub use bounds::{ClipMask, ClipState, Frustum, Plane, AABB};
pub use camera::{Camera, CameraId};
pub use render_queue::{RenderBatch, RenderItem, RenderQueue};
pub use scene_manager::{FlushReport, SceneConfig, SceneError, SceneManager, SceneResult};
pub use scene_object::{ClipMode, Drawable, LightSource, LightType, SceneObject, SceneObjectKind, SpatialObject};
