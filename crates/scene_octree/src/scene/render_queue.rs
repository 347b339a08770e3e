//! Render queue filled by the culling pass
//!
//! Collects the objects that survived culling in traversal order. Sorting and
//! batching happen here, after the walk, so the culler only has to guarantee
//! that every visible object appears exactly once.

use crate::foundation::collections::ObjectKey;
use crate::scene::CameraId;
use std::collections::BTreeMap;

/// One visible drawable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderItem {
    /// Camera the object was culled for
    pub camera: CameraId,
    /// The visible object
    pub object: ObjectKey,
    /// Ordering key (lower draws first)
    pub render_order: i32,
}

/// A run of objects sharing the same render order
#[derive(Debug, Clone)]
pub struct RenderBatch {
    /// Render order shared by all objects in this batch
    pub render_order: i32,

    /// Objects in this batch, in traversal order
    pub objects: Vec<ObjectKey>,
}

impl RenderBatch {
    /// Create a new empty batch for a render order
    pub fn new(render_order: i32) -> Self {
        Self {
            render_order,
            objects: Vec::new(),
        }
    }

    /// Get the number of objects in this batch
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

/// Per-camera output of a culling pass
#[derive(Debug, Default)]
pub struct RenderQueue {
    items: Vec<RenderItem>,
    lights: Vec<ObjectKey>,
}

impl RenderQueue {
    /// Create an empty render queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a visible drawable
    pub fn push(&mut self, camera: CameraId, object: ObjectKey, render_order: i32) {
        self.items.push(RenderItem { camera, object, render_order });
    }

    /// Register a visible light for the lighting pass
    pub fn push_light(&mut self, light: ObjectKey) {
        self.lights.push(light);
    }

    /// Drawables in the order they were pushed
    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    /// Lights in the order they were pushed
    pub fn lights(&self) -> &[ObjectKey] {
        &self.lights
    }

    /// Check whether an object was queued as a drawable
    pub fn contains(&self, object: ObjectKey) -> bool {
        self.items.iter().any(|item| item.object == object)
    }

    /// Stable sort of the drawables by render order
    pub fn sort_by_render_order(&mut self) {
        self.items.sort_by_key(|item| item.render_order);
    }

    /// Group drawables by render order, ascending
    pub fn batches(&self) -> Vec<RenderBatch> {
        let mut batches: BTreeMap<i32, RenderBatch> = BTreeMap::new();
        for item in &self.items {
            batches
                .entry(item.render_order)
                .or_insert_with(|| RenderBatch::new(item.render_order))
                .objects
                .push(item.object);
        }
        batches.into_values().collect()
    }

    /// Number of queued drawables
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no drawable or light is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.lights.is_empty()
    }

    /// Drop everything, keeping the allocations for the next frame
    pub fn clear(&mut self) {
        self.items.clear();
        self.lights.clear();
    }
}
