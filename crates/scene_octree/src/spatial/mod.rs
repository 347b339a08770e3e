//! Spatial partitioning
//!
//! A loose octree laid out as one sparse grid per level. Objects are placed in
//! the coarsest level whose cells are large enough for them, the root grows
//! on demand to fit far-away objects, and every node keeps a conservative
//! loose box for culling plus a lazily computed tight box of its contents.

mod chunk;
mod node;
mod octree;

pub use chunk::{Octant, OctreeChunk};
pub use node::{NodeId, OctreeNode};
pub use octree::{Octree, OctreeConfig, OctreeStats, OctreeVisitor, SpatialProxy};

use thiserror::Error;

/// Deepest grid level the linear cell index can address
pub const MAX_LEVELS: usize = 21;

/// Octree sizing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OctreeError {
    /// A size was zero, negative, NaN or infinite
    #[error("{name} must be positive and finite, got {value}")]
    InvalidSize {
        /// Which setting was rejected
        name: &'static str,
        /// The rejected value
        value: f32,
    },

    /// A size was not a power of two
    #[error("{name} must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// Which setting was rejected
        name: &'static str,
        /// The rejected value
        value: f32,
    },

    /// Leaf cells would be larger than the root
    #[error("leaf size {leaf_size} exceeds root size {root_size}")]
    LeafLargerThanRoot {
        /// Requested root size
        root_size: f32,
        /// Requested leaf size
        leaf_size: f32,
    },

    /// Initial root is beyond the growth cap
    #[error("root size {root_size} exceeds maximum root size {max_root_size}")]
    RootLargerThanMax {
        /// Requested root size
        root_size: f32,
        /// Configured growth cap
        max_root_size: f32,
    },

    /// The tree would need more levels than a cell index can address
    #[error("octree would need {levels} levels, at most {MAX_LEVELS} are supported")]
    TooManyLevels {
        /// Levels required by max_root_size / leaf_size
        levels: usize,
    },
}

/// Result type for octree operations
pub type OctreeResult<T> = Result<T, OctreeError>;
