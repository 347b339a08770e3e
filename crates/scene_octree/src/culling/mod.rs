//! Frustum culling
//!
//! Walks the octree once per camera and fills a render queue with the objects
//! the camera can see.

mod cull_visitor;

pub use cull_visitor::{CullPass, CullStats, CullTarget, CullVisitor};
