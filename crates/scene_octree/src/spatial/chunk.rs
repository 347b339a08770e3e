//! One level of the octree grid
//!
//! A chunk is a uniform grid of `dimension³` cells (`dimension = 2^level`)
//! covering the whole root cube. Cells are stored sparsely: a missing entry is
//! an empty cell, not an error. All parent/child navigation between levels is
//! pure index arithmetic on linear cell indices.

use crate::foundation::math::Vec3;
use crate::scene::AABB;
use crate::spatial::node::{NodeId, OctreeNode};
use std::collections::HashMap;

/// One of the eight children of a cell
///
/// Bit 0 selects +X, bit 1 selects +Y, bit 2 selects +Z:
/// - 0: -X, -Y, -Z
/// - 1: +X, -Y, -Z
/// - 2: -X, +Y, -Z
/// - 3: +X, +Y, -Z
/// - 4: -X, -Y, +Z
/// - 5: +X, -Y, +Z
/// - 6: -X, +Y, +Z
/// - 7: +X, +Y, +Z
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Octant(u8);

impl Octant {
    /// All octants in traversal order
    pub const ALL: [Octant; 8] = [
        Octant(0), Octant(1), Octant(2), Octant(3),
        Octant(4), Octant(5), Octant(6), Octant(7),
    ];

    /// Build an octant from the sign of each axis (`true` = positive half)
    pub fn from_signs(positive_x: bool, positive_y: bool, positive_z: bool) -> Self {
        Self(u8::from(positive_x) | (u8::from(positive_y) << 1) | (u8::from(positive_z) << 2))
    }

    /// Octant index in `0..8`
    pub fn bits(self) -> u8 {
        self.0
    }

    fn offsets(self) -> [u64; 3] {
        [
            u64::from(self.0 & 1),
            u64::from((self.0 >> 1) & 1),
            u64::from((self.0 >> 2) & 1),
        ]
    }
}

/// One level of the octree
#[derive(Debug)]
pub struct OctreeChunk {
    level: usize,
    dimension: u64,
    node_size: f32,
    root_size: f32,
    nodes: HashMap<u64, OctreeNode>,
}

impl OctreeChunk {
    /// Create the empty grid for `level` of a tree whose root cell is `root_size` wide
    pub fn new(level: usize, root_size: f32) -> Self {
        let dimension = 1u64 << level;
        Self {
            level,
            dimension,
            node_size: root_size / dimension as f32,
            root_size,
            nodes: HashMap::new(),
        }
    }

    /// Depth of this chunk (0 = root)
    pub fn level(&self) -> usize {
        self.level
    }

    /// Cells along each axis
    pub fn dimension(&self) -> u64 {
        self.dimension
    }

    /// World-space edge length of one cell
    pub fn node_size(&self) -> f32 {
        self.node_size
    }

    /// World-space edge length of the whole grid
    pub fn root_size(&self) -> f32 {
        self.root_size
    }

    /// Split a linear index into grid coordinates
    pub fn coordinates(&self, index: u64) -> [u64; 3] {
        let dim = self.dimension;
        [index % dim, index / dim % dim, index / dim / dim]
    }

    /// Combine grid coordinates into a linear index
    pub fn linear_index(&self, x: u64, y: u64, z: u64) -> u64 {
        let dim = self.dimension;
        x + y * dim + z * dim * dim
    }

    /// Index of the child cell in the next finer level
    pub fn child_index(&self, index: u64, octant: Octant) -> u64 {
        let [x, y, z] = self.coordinates(index);
        let [ox, oy, oz] = octant.offsets();
        let child_dim = self.dimension * 2;
        (x * 2 + ox) + (y * 2 + oy) * child_dim + (z * 2 + oz) * child_dim * child_dim
    }

    /// Index of the parent cell in the next coarser level
    pub fn parent_index(&self, index: u64) -> u64 {
        assert!(self.level > 0, "the root chunk has no parent level");
        let [x, y, z] = self.coordinates(index);
        let parent_dim = self.dimension / 2;
        (x >> 1) + (y >> 1) * parent_dim + (z >> 1) * parent_dim * parent_dim
    }

    /// Cell containing a world-space point, or `None` if the point lies
    /// outside the grid (or is NaN)
    pub fn index_for_point(&self, point: &Vec3) -> Option<u64> {
        let half = self.root_size * 0.5;
        let dim = self.dimension as f32;
        let mut cell = [0u64; 3];
        for (axis, coordinate) in point.iter().enumerate() {
            let scaled = ((coordinate + half) / self.node_size).floor();
            if !(scaled >= 0.0 && scaled < dim) {
                return None;
            }
            cell[axis] = scaled as u64;
        }
        Some(self.linear_index(cell[0], cell[1], cell[2]))
    }

    /// World-space extent of a cell
    pub fn cell_bounds(&self, index: u64) -> AABB {
        let [x, y, z] = self.coordinates(index);
        let half = self.root_size * 0.5;
        let min = Vec3::new(
            x as f32 * self.node_size - half,
            y as f32 * self.node_size - half,
            z as f32 * self.node_size - half,
        );
        AABB::new(min, min + Vec3::repeat(self.node_size))
    }

    /// Existing node for a cell
    pub fn node(&self, index: u64) -> Option<&OctreeNode> {
        self.nodes.get(&index)
    }

    /// Existing node for a cell, mutably
    pub fn node_mut(&mut self, index: u64) -> Option<&mut OctreeNode> {
        self.nodes.get_mut(&index)
    }

    /// Node for a cell, creating it if the cell was empty
    pub fn get_or_create_node(&mut self, index: u64) -> &mut OctreeNode {
        debug_assert!(index < self.dimension.pow(3), "cell index {index} out of range at level {}", self.level);
        let bounds = self.cell_bounds(index);
        let id = NodeId { level: self.level, index };
        self.nodes
            .entry(index)
            .or_insert_with(|| OctreeNode::new(id, bounds))
    }

    /// All materialized nodes, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes.values()
    }

    /// Number of materialized nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node has been materialized at this level
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes holding at least one object
    pub fn occupied_count(&self) -> usize {
        self.nodes.values().filter(|node| !node.is_empty()).count()
    }

    /// Number of objects held at this level
    pub fn member_count(&self) -> usize {
        self.nodes.values().map(|node| node.members().len()).sum()
    }
}
