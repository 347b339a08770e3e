//! # Scene Octree
//!
//! Spatial partitioning and visibility determination for a real-time 3D scene.
//!
//! ## Features
//!
//! - **Loose Octree**: one sparse grid per level, placement by object size,
//!   automatic growth for far-away objects and shrinking when emptied
//! - **Batched Placement**: object changes are collected in a dirty set and
//!   applied once per frame
//! - **Hierarchical Culling**: subtrees outside the frustum are skipped and
//!   subtrees fully inside it are accepted without further tests
//! - **Configuration**: octree and scene settings load from TOML or RON
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_octree::prelude::*;
//!
//! fn main() -> Result<(), SceneError> {
//!     let mut scene = SceneManager::new()?;
//!     let bounds = AABB::from_center_extents(Vec3::new(0.0, 0.0, -10.0), Vec3::new(1.0, 1.0, 1.0));
//!     let crate_mesh = scene.add_object(SceneObject::mesh(bounds, 0));
//!     scene.flush_placements();
//!
//!     let mut camera = Camera::perspective(CameraId(0), Vec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0, 0.1, 100.0);
//!     camera.look_at(Vec3::new(0.0, 0.0, -10.0), Vec3::new(0.0, 1.0, 0.0));
//!
//!     let mut queue = RenderQueue::new();
//!     scene.cull(&camera, &mut queue);
//!     assert!(queue.contains(crate_mesh));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod culling;
pub mod foundation;
pub mod scene;
pub mod spatial;

/// Common imports for scene users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, ConfigFormat},
        culling::{CullPass, CullStats, CullTarget, CullVisitor},
        foundation::{
            collections::{ObjectKey, ObjectMap},
            math::{Mat4, Vec3},
        },
        scene::{
            Camera, CameraId, ClipMask, ClipMode, ClipState, FlushReport, Frustum, LightSource, LightType,
            RenderQueue, SceneConfig, SceneError, SceneManager, SceneObject, SceneObjectKind, SpatialObject, AABB,
        },
        spatial::{NodeId, Octree, OctreeConfig, OctreeError, OctreeVisitor, SpatialProxy},
    };
}
