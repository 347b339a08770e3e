//! Octree nodes
//!
//! A node is one materialized grid cell. It owns the keys of the objects
//! placed in it, its loose box (fixed at creation) and a cached tight box
//! that the octree invalidates whenever membership below the node changes.

use crate::foundation::collections::ObjectKey;
use crate::scene::AABB;
use std::cell::Cell;

/// Address of a node: grid level plus linear cell index within that level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    /// Depth (0 = root)
    pub level: usize,
    /// Linear cell index `x + y·dim + z·dim²`
    pub index: u64,
}

impl NodeId {
    /// The single root node
    pub const ROOT: NodeId = NodeId { level: 0, index: 0 };

    /// True for the root node
    pub fn is_root(self) -> bool {
        self.level == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TightBox {
    Stale,
    Empty,
    Bounds(AABB),
}

/// A materialized cell of the octree
#[derive(Debug)]
pub struct OctreeNode {
    id: NodeId,
    members: Vec<ObjectKey>,
    cell_box: AABB,
    loose_box: AABB,
    tight_box: Cell<TightBox>,
}

impl OctreeNode {
    /// Create an empty node for a cell
    ///
    /// The loose box is the cell grown by half its size on every side, which
    /// is enough to hold any object whose center lies in the cell and whose
    /// half-extent does not exceed a quarter of the cell size.
    pub fn new(id: NodeId, cell_box: AABB) -> Self {
        let node_size = cell_box.max.x - cell_box.min.x;
        Self {
            id,
            members: Vec::new(),
            cell_box,
            loose_box: cell_box.expanded(node_size * 0.5),
            tight_box: Cell::new(TightBox::Stale),
        }
    }

    /// Address of this node
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Depth of this node
    pub fn level(&self) -> usize {
        self.id.level
    }

    /// Objects placed directly in this node, in insertion order
    pub fn members(&self) -> &[ObjectKey] {
        &self.members
    }

    /// True when no object is placed directly in this node
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The grid cell this node covers
    pub fn cell_box(&self) -> AABB {
        self.cell_box
    }

    /// Conservative culling volume for this node and everything below it
    pub fn loose_box(&self) -> AABB {
        self.loose_box
    }

    pub(crate) fn add_member(&mut self, key: ObjectKey) {
        debug_assert!(!self.members.contains(&key), "object {key:?} placed twice in {:?}", self.id);
        self.members.push(key);
    }

    pub(crate) fn remove_member(&mut self, key: ObjectKey) -> bool {
        match self.members.iter().position(|member| *member == key) {
            Some(position) => {
                self.members.remove(position);
                true
            }
            None => false,
        }
    }

    pub(crate) fn cached_tight_box(&self) -> TightBox {
        self.tight_box.get()
    }

    pub(crate) fn store_tight_box(&self, bounds: Option<AABB>) {
        self.tight_box.set(bounds.map_or(TightBox::Empty, TightBox::Bounds));
    }

    pub(crate) fn invalidate_tight_box(&self) {
        self.tight_box.set(TightBox::Stale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::ObjectMap;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_loose_box_is_twice_the_cell() {
        let cell = AABB::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 4.0, 4.0));
        let node = OctreeNode::new(NodeId { level: 2, index: 42 }, cell);

        assert_relative_eq!(node.loose_box().min, Vec3::new(-2.0, -2.0, -2.0));
        assert_relative_eq!(node.loose_box().max, Vec3::new(6.0, 6.0, 6.0));
        assert_eq!(node.cached_tight_box(), TightBox::Stale);
    }

    #[test]
    fn test_members_keep_insertion_order() {
        let mut map: ObjectMap<()> = ObjectMap::with_key();
        let (a, b, c) = (map.insert(()), map.insert(()), map.insert(()));
        let mut node = OctreeNode::new(NodeId::ROOT, AABB::new(Vec3::zeros(), Vec3::repeat(1.0)));

        node.add_member(a);
        node.add_member(b);
        node.add_member(c);
        assert!(node.remove_member(b));
        assert!(!node.remove_member(b));
        assert_eq!(node.members(), &[a, c]);
    }

    #[test]
    fn test_tight_box_cache() {
        let node = OctreeNode::new(NodeId::ROOT, AABB::new(Vec3::zeros(), Vec3::repeat(8.0)));
        let bounds = AABB::new(Vec3::repeat(1.0), Vec3::repeat(2.0));

        node.store_tight_box(Some(bounds));
        assert_eq!(node.cached_tight_box(), TightBox::Bounds(bounds));
        node.store_tight_box(None);
        assert_eq!(node.cached_tight_box(), TightBox::Empty);
        node.invalidate_tight_box();
        assert_eq!(node.cached_tight_box(), TightBox::Stale);
    }
}
