//! Octree spatial partitioning structure
//!
//! A loose octree stored as one sparse grid per level. Objects are placed by
//! size and center: the coarsest grid level whose cells are at least four
//! times the object's half-extent receives it, in the cell containing its
//! center. Objects outside the root cube grow the tree (rebuilding every level
//! and re-inserting every object), up to a configured cap.

use crate::config::{Config, Deserialize, Serialize};
use crate::foundation::collections::ObjectKey;
use crate::foundation::math::utils;
use crate::scene::{ClipMode, SpatialObject, AABB};
use crate::spatial::chunk::{Octant, OctreeChunk};
use crate::spatial::node::{NodeId, OctreeNode, TightBox};
use crate::spatial::{OctreeError, OctreeResult, MAX_LEVELS};
use std::collections::HashMap;

/// Configuration for octree sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Initial edge length of the root cell (power of two)
    pub root_size: f32,

    /// Edge length of the finest cells (power of two, fixed for the tree's lifetime)
    pub leaf_size: f32,

    /// Largest root the tree may grow to; objects beyond it stay at the root
    pub max_root_size: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            root_size: 64.0,
            leaf_size: 1.0,
            max_root_size: 65536.0,
        }
    }
}

impl OctreeConfig {
    /// Check that the sizes describe a buildable tree
    pub fn validate(&self) -> OctreeResult<()> {
        for (name, value) in [
            ("root_size", self.root_size),
            ("leaf_size", self.leaf_size),
            ("max_root_size", self.max_root_size),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(OctreeError::InvalidSize { name, value });
            }
            if !utils::is_power_of_two(value) {
                return Err(OctreeError::NotPowerOfTwo { name, value });
            }
        }

        if self.leaf_size > self.root_size {
            return Err(OctreeError::LeafLargerThanRoot {
                root_size: self.root_size,
                leaf_size: self.leaf_size,
            });
        }
        if self.root_size > self.max_root_size {
            return Err(OctreeError::RootLargerThanMax {
                root_size: self.root_size,
                max_root_size: self.max_root_size,
            });
        }

        let levels = level_count(self.max_root_size, self.leaf_size);
        if levels > MAX_LEVELS {
            return Err(OctreeError::TooManyLevels { levels });
        }
        Ok(())
    }
}

impl Config for OctreeConfig {}

/// What the octree needs to know about an object to place it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialProxy {
    /// World-space bounds, if any
    pub bounds: Option<AABB>,
    /// False keeps the object at the root regardless of its bounds
    pub clip_test_enabled: bool,
}

impl SpatialProxy {
    /// Capture the placement-relevant state of an object
    ///
    /// Objects that are never culled stay at the root, where no node test can
    /// reject them.
    pub fn from_object<T: SpatialObject + ?Sized>(object: &T) -> Self {
        Self {
            bounds: object.world_bounding_volume(),
            clip_test_enabled: object.clip_test_enabled() && object.clip_mode() != ClipMode::Never,
        }
    }

    /// Regular object with the given bounds
    pub fn bounded(bounds: AABB) -> Self {
        Self { bounds: Some(bounds), clip_test_enabled: true }
    }

    /// Object that always lives at the root
    pub fn unclipped(bounds: Option<AABB>) -> Self {
        Self { bounds, clip_test_enabled: false }
    }

    /// Bounds, if present and well-formed
    pub fn valid_bounds(&self) -> Option<AABB> {
        self.bounds.filter(AABB::is_valid)
    }

    fn placement_bounds(&self) -> Option<AABB> {
        if self.clip_test_enabled {
            self.valid_bounds()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    node: NodeId,
    proxy: SpatialProxy,
}

enum Target {
    Node(NodeId),
    Grow(f32),
}

/// Hooks called by [`Octree::traverse`]
pub trait OctreeVisitor {
    /// Called before a node's children; return `false` to skip the subtree
    fn enter(&mut self, octree: &Octree, node: &OctreeNode) -> bool;

    /// Called after a node's children, only if `enter` returned `true`
    fn leave(&mut self, _octree: &Octree, _node: &OctreeNode) {}
}

struct ClosureVisitor<F>(F);

impl<F: FnMut(&OctreeNode) -> bool> OctreeVisitor for ClosureVisitor<F> {
    fn enter(&mut self, _octree: &Octree, node: &OctreeNode) -> bool {
        (self.0)(node)
    }
}

/// Snapshot of the tree's shape for debugging and visualization
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OctreeStats {
    /// Current root edge length
    pub root_size: f32,
    /// Materialized nodes per level, root first
    pub nodes_per_level: Vec<usize>,
    /// Nodes holding at least one object, per level
    pub occupied_per_level: Vec<usize>,
    /// Objects held at each level
    pub members_per_level: Vec<usize>,
    /// Objects currently placed
    pub object_count: usize,
    /// Full rebuilds since creation
    pub rebuild_count: u64,
}

/// Octree spatial partitioning structure
#[derive(Debug)]
pub struct Octree {
    levels: Vec<OctreeChunk>,
    root_size: f32,
    leaf_size: f32,
    max_root_size: f32,
    placements: HashMap<ObjectKey, Placement>,
    rebuild_count: u64,
}

fn level_count(root_size: f32, leaf_size: f32) -> usize {
    (root_size / leaf_size).log2().round() as usize + 1
}

impl Octree {
    /// Create an empty octree from a validated configuration
    pub fn new(config: &OctreeConfig) -> OctreeResult<Self> {
        config.validate()?;

        let mut octree = Self {
            levels: Vec::new(),
            root_size: config.root_size,
            leaf_size: config.leaf_size,
            max_root_size: config.max_root_size,
            placements: HashMap::new(),
            rebuild_count: 0,
        };
        octree.reset_levels(config.root_size);

        log::info!(
            "Octree initialized: root {}, leaf {}, max root {}, {} levels",
            octree.root_size,
            octree.leaf_size,
            octree.max_root_size,
            octree.levels.len()
        );
        Ok(octree)
    }

    /// Re-initialize with new root and leaf sizes, re-inserting every object
    pub fn initialize(&mut self, root_size: f32, leaf_size: f32) -> OctreeResult<()> {
        OctreeConfig {
            root_size,
            leaf_size,
            max_root_size: self.max_root_size,
        }
        .validate()?;

        log::info!("Octree re-initialized: root {root_size}, leaf {leaf_size}");
        self.leaf_size = leaf_size;
        let snapshot = self.snapshot();
        self.rebuild(root_size, snapshot);
        Ok(())
    }

    fn reset_levels(&mut self, root_size: f32) {
        self.root_size = root_size;
        self.levels = (0..level_count(root_size, self.leaf_size))
            .map(|level| OctreeChunk::new(level, root_size))
            .collect();
        self.levels[0].get_or_create_node(0);
    }

    /// Current root edge length
    pub fn root_size(&self) -> f32 {
        self.root_size
    }

    /// Finest cell edge length
    pub fn leaf_size(&self) -> f32 {
        self.leaf_size
    }

    /// Growth cap
    pub fn max_root_size(&self) -> f32 {
        self.max_root_size
    }

    /// Number of grid levels, root included
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Grid for one level
    pub fn chunk(&self, level: usize) -> Option<&OctreeChunk> {
        self.levels.get(level)
    }

    /// The root node, which always exists
    pub fn root(&self) -> &OctreeNode {
        self.node(NodeId::ROOT)
            .unwrap_or_else(|| unreachable!("octree root is created with the levels"))
    }

    /// Node by address, if materialized
    pub fn node(&self, id: NodeId) -> Option<&OctreeNode> {
        self.levels.get(id.level)?.node(id.index)
    }

    /// Node currently holding an object
    pub fn node_of(&self, key: ObjectKey) -> Option<NodeId> {
        self.placements.get(&key).map(|placement| placement.node)
    }

    /// Bounds the object was last placed with
    pub fn bounds_of(&self, key: ObjectKey) -> Option<AABB> {
        self.placements.get(&key).and_then(|placement| placement.proxy.valid_bounds())
    }

    /// Whether an object is placed in the tree
    pub fn contains(&self, key: ObjectKey) -> bool {
        self.placements.contains_key(&key)
    }

    /// Number of placed objects
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// True when no object is placed
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Remove every object and node, keeping the current root size
    pub fn clear(&mut self) {
        self.placements.clear();
        self.reset_levels(self.root_size);
    }

    /// Place an object implementing [`SpatialObject`]
    pub fn place_object<T: SpatialObject + ?Sized>(&mut self, key: ObjectKey, object: &T) -> NodeId {
        self.place_node(key, SpatialProxy::from_object(object))
    }

    /// Place or re-place an object, growing the tree if needed
    ///
    /// Never fails: objects without usable bounds, objects that opted out of
    /// clipping and objects beyond the growth cap are kept at the root.
    pub fn place_node(&mut self, key: ObjectKey, proxy: SpatialProxy) -> NodeId {
        let target = loop {
            match self.locate(&proxy) {
                Target::Node(id) => break id,
                Target::Grow(required) => {
                    let grown = utils::next_power_of_two(required)
                        .map_or(self.max_root_size, |size| size.min(self.max_root_size));
                    let grown = if grown > self.root_size {
                        grown
                    } else {
                        (self.root_size * 2.0).min(self.max_root_size)
                    };

                    if grown <= self.root_size {
                        log::warn!(
                            "Object {key:?} lies beyond the maximum root size {}, keeping it at the root",
                            self.max_root_size
                        );
                        break NodeId::ROOT;
                    }
                    self.resize(grown);
                }
            }
        };

        // Looked up after any growth: a rebuild re-places the object too.
        let previous = self.node_of(key);
        if previous != Some(target) {
            self.get_or_create_node_chain(target.level, target.index);
            if let Some(previous) = previous {
                self.detach(key, previous);
            }
            self.levels[target.level].get_or_create_node(target.index).add_member(key);
            log::trace!("Placed {key:?} at level {} index {} (was {previous:?})", target.level, target.index);
        }

        self.placements.insert(key, Placement { node: target, proxy });
        self.invalidate_ancestors(target);
        target
    }

    fn locate(&self, proxy: &SpatialProxy) -> Target {
        let Some(bounds) = proxy.placement_bounds() else {
            return Target::Node(NodeId::ROOT);
        };

        let size = self.object_size(&bounds);
        let level = self.select_level(size);
        match self.levels[level].index_for_point(&bounds.center()) {
            Some(index) => Target::Node(NodeId { level, index }),
            None => Target::Grow((2.0 * bounds.farthest_coordinate()).max(4.0 * size)),
        }
    }

    fn object_size(&self, bounds: &AABB) -> f32 {
        let size = utils::max_abs_component(&bounds.extents());
        if size.is_nan() {
            self.max_root_size
        } else {
            size.min(self.max_root_size)
        }
    }

    /// Coarsest level whose cells are at least four times `size`, or the root
    pub fn select_level(&self, size: f32) -> usize {
        let mut level = self.levels.len() - 1;
        while level > 0 && self.levels[level].node_size() < 4.0 * size {
            level -= 1;
        }
        level
    }

    /// Remove an object from the tree; returns whether it was placed
    pub fn remove_node(&mut self, key: ObjectKey) -> bool {
        let Some(placement) = self.placements.remove(&key) else {
            return false;
        };
        self.detach(key, placement.node);
        log::trace!("Removed {key:?} from level {} index {}", placement.node.level, placement.node.index);
        true
    }

    fn detach(&mut self, key: ObjectKey, id: NodeId) {
        if let Some(node) = self.levels.get_mut(id.level).and_then(|chunk| chunk.node_mut(id.index)) {
            node.remove_member(key);
        }
        self.invalidate_ancestors(id);
    }

    fn invalidate_ancestors(&self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            let Some(node) = self.node(id) else { break };
            node.invalidate_tight_box();
            current = self.parent_id(id);
        }
    }

    fn normalize_root_size(&self, size: f32) -> f32 {
        utils::next_power_of_two(size)
            .map_or(self.leaf_size, |size| size.clamp(self.leaf_size, self.max_root_size))
    }

    /// Change the root size, rebuilding the tree
    ///
    /// The size is rounded up to a power of two between the leaf size and the
    /// growth cap. Returns `false` (and does nothing) if that equals the
    /// current root size.
    pub fn resize(&mut self, new_size: f32) -> bool {
        let target = self.normalize_root_size(new_size);
        if target == self.root_size {
            return false;
        }
        log::debug!("Resizing octree root {} -> {target} ({} objects)", self.root_size, self.len());
        let snapshot = self.snapshot();
        self.rebuild(target, snapshot);
        true
    }

    /// Every placed object with the proxy it was placed with, ordered by key
    pub fn snapshot(&self) -> Vec<(ObjectKey, SpatialProxy)> {
        let mut snapshot: Vec<_> = self
            .placements
            .iter()
            .map(|(key, placement)| (*key, placement.proxy))
            .collect();
        snapshot.sort_by_key(|(key, _)| *key);
        snapshot
    }

    /// Discard every level and re-insert `snapshot` into a tree of `root_size`
    ///
    /// Objects that no longer fit may grow the tree again while re-inserting.
    pub fn rebuild(&mut self, root_size: f32, snapshot: Vec<(ObjectKey, SpatialProxy)>) {
        let root_size = self.normalize_root_size(root_size);
        self.rebuild_count += 1;
        self.placements.clear();
        self.reset_levels(root_size);

        for (key, proxy) in snapshot {
            self.place_node(key, proxy);
        }
        log::debug!(
            "Octree rebuilt: root {}, {} levels, {} objects",
            self.root_size,
            self.levels.len(),
            self.len()
        );
    }

    /// Root size needed to hold every bounded object
    fn required_root_size(&self) -> f32 {
        let reach = self
            .placements
            .values()
            .filter_map(|placement| placement.proxy.valid_bounds())
            .map(|bounds| 2.0 * bounds.farthest_coordinate())
            .fold(0.0, f32::max);
        self.normalize_root_size(reach)
    }

    /// Shrink the tree when nothing is placed below the root
    ///
    /// The new root is the smallest that still holds every bounded object,
    /// which is the leaf size for an empty scene. Returns whether a rebuild
    /// happened.
    pub fn prune(&mut self) -> bool {
        if self.placements.values().any(|placement| !placement.node.is_root()) {
            return false;
        }
        let target = self.required_root_size();
        if target >= self.root_size {
            return false;
        }
        log::debug!("Pruning octree root {} -> {target}", self.root_size);
        self.resize(target)
    }

    /// Grow the root if its contents reach beyond it
    ///
    /// Catches objects kept at the root because they opted out of clipping.
    /// Returns whether a rebuild happened.
    pub fn fit_to_contents(&mut self) -> bool {
        let Some(bounds) = self.node_box(NodeId::ROOT) else {
            return false;
        };
        let required = self.normalize_root_size(2.0 * bounds.farthest_coordinate());
        if required <= self.root_size {
            return false;
        }
        self.resize(required)
    }

    /// Materialize a node and every missing ancestor
    pub fn get_or_create_node_chain(&mut self, level: usize, index: u64) -> NodeId {
        assert!(level < self.levels.len(), "level {level} out of range");
        let requested = NodeId { level, index };
        let mut id = requested;
        loop {
            let existed = self.levels[id.level].node(id.index).is_some();
            self.levels[id.level].get_or_create_node(id.index);
            match self.parent_id(id) {
                Some(parent) if !existed => id = parent,
                _ => break,
            }
        }
        requested
    }

    fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        if id.level == 0 {
            return None;
        }
        Some(NodeId {
            level: id.level - 1,
            index: self.levels[id.level].parent_index(id.index),
        })
    }

    fn child_id(&self, id: NodeId, octant: Octant) -> Option<NodeId> {
        if id.level + 1 >= self.levels.len() {
            return None;
        }
        Some(NodeId {
            level: id.level + 1,
            index: self.levels[id.level].child_index(id.index, octant),
        })
    }

    /// Existing child of a node
    pub fn child(&self, id: NodeId, octant: Octant) -> Option<&OctreeNode> {
        self.node(self.child_id(id, octant)?)
    }

    /// Child of a node, created if missing; `None` at the leaf level
    pub fn get_or_create_child(&mut self, id: NodeId, octant: Octant) -> Option<NodeId> {
        let child = self.child_id(id, octant)?;
        Some(self.get_or_create_node_chain(child.level, child.index))
    }

    /// Existing parent of a node
    pub fn parent(&self, id: NodeId) -> Option<&OctreeNode> {
        self.node(self.parent_id(id)?)
    }

    /// Parent of a node, created if missing; `None` for the root
    pub fn get_or_create_parent(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent_id(id)?;
        Some(self.get_or_create_node_chain(parent.level, parent.index))
    }

    /// Existing children of a node in octant order
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &OctreeNode> + '_ {
        Octant::ALL.into_iter().filter_map(move |octant| self.child(id, octant))
    }

    /// Tight bounds of everything placed in a node's subtree
    ///
    /// Computed on demand and cached until membership below the node changes.
    /// `None` when nothing in the subtree has bounds.
    pub fn node_box(&self, id: NodeId) -> Option<AABB> {
        let node = self.node(id)?;
        match node.cached_tight_box() {
            TightBox::Bounds(bounds) => return Some(bounds),
            TightBox::Empty => return None,
            TightBox::Stale => {}
        }

        let member_bounds = node.members().iter().filter_map(|key| self.bounds_of(*key));
        let child_bounds = self.children(id).filter_map(|child| self.node_box(child.id()));
        let tight = member_bounds
            .chain(child_bounds)
            .reduce(|merged, bounds| merged.merged(&bounds));

        node.store_tight_box(tight);
        tight
    }

    /// Pre-order walk from the root in octant order
    pub fn traverse<V: OctreeVisitor + ?Sized>(&self, visitor: &mut V) {
        self.traverse_from(NodeId::ROOT, visitor);
    }

    /// Pre-order walk of the subtree below `id`
    pub fn traverse_from<V: OctreeVisitor + ?Sized>(&self, id: NodeId, visitor: &mut V) {
        let Some(node) = self.node(id) else { return };
        if !visitor.enter(self, node) {
            return;
        }
        for octant in Octant::ALL {
            if let Some(child) = self.child_id(id, octant) {
                self.traverse_from(child, visitor);
            }
        }
        visitor.leave(self, node);
    }

    /// Pre-order walk with a closure deciding whether to descend
    pub fn traverse_with(&self, enter: impl FnMut(&OctreeNode) -> bool) {
        self.traverse(&mut ClosureVisitor(enter));
    }

    /// Objects whose placed bounds intersect `region`
    pub fn query_aabb(&self, region: &AABB) -> Vec<ObjectKey> {
        let mut found = Vec::new();
        self.traverse_with(|node| {
            if !node.id().is_root() && !node.loose_box().intersects(region) {
                return false;
            }
            found.extend(
                node.members()
                    .iter()
                    .copied()
                    .filter(|key| self.bounds_of(*key).is_some_and(|bounds| bounds.intersects(region))),
            );
            true
        });
        found
    }

    /// Materialized nodes at one level, ordered by cell index (for visualization)
    pub fn nodes_at_level(&self, level: usize) -> Vec<&OctreeNode> {
        let Some(chunk) = self.levels.get(level) else {
            return Vec::new();
        };
        let mut nodes: Vec<_> = chunk.nodes().collect();
        nodes.sort_by_key(|node| node.id().index);
        nodes
    }

    /// Shape of the tree
    pub fn stats(&self) -> OctreeStats {
        OctreeStats {
            root_size: self.root_size,
            nodes_per_level: self.levels.iter().map(OctreeChunk::len).collect(),
            occupied_per_level: self.levels.iter().map(OctreeChunk::occupied_count).collect(),
            members_per_level: self.levels.iter().map(OctreeChunk::member_count).collect(),
            object_count: self.len(),
            rebuild_count: self.rebuild_count,
        }
    }
}
