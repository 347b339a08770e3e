//! Scene Manager - owns scene objects and batches their octree placement
//!
//! Mutating an object only records its key in a dirty set. Once per frame
//! [`SceneManager::flush_placements`] drains the set and re-places each
//! object, so an object moved several times in a frame is placed once.
//! Culling reads the octree as it was after the last flush.

use crate::config::{Config, Deserialize, Serialize};
use crate::culling::{CullPass, CullStats, CullVisitor};
use crate::foundation::collections::{ObjectKey, ObjectMap};
use crate::scene::{Camera, ClipMode, RenderQueue, SceneObject, AABB};
use crate::spatial::{Octree, OctreeConfig, OctreeError};
use std::collections::HashSet;
use thiserror::Error;

/// Scene Manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Octree sizing
    pub octree: OctreeConfig,

    /// Shrink the octree after a flush that leaves nothing below the root
    pub auto_prune: bool,

    /// Grow the root after a flush if its contents reach beyond it
    pub fit_root_after_flush: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            octree: OctreeConfig::default(),
            auto_prune: true,
            fit_root_after_flush: true,
        }
    }
}

impl Config for SceneConfig {}

/// Scene errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// The key does not name a live object
    #[error("Unknown scene object: {0:?}")]
    UnknownObject(ObjectKey),

    /// The octree configuration was rejected
    #[error("Octree error: {0}")]
    Octree(#[from] OctreeError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// What one flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Objects placed or re-placed
    pub placed: usize,
    /// Objects taken out of the octree
    pub removed: usize,
    /// Full octree rebuilds (growth, fitting and pruning)
    pub rebuilds: u64,
    /// Whether the flush ended with a prune
    pub pruned: bool,
}

/// Scene Manager - owns the objects, the octree and the dirty set
#[derive(Debug)]
pub struct SceneManager {
    config: SceneConfig,
    objects: ObjectMap<SceneObject>,
    octree: Octree,
    dirty: HashSet<ObjectKey>,
}

impl SceneManager {
    /// Create a new scene manager with default configuration
    pub fn new() -> SceneResult<Self> {
        Self::with_config(SceneConfig::default())
    }

    /// Create a scene manager with custom configuration
    pub fn with_config(config: SceneConfig) -> SceneResult<Self> {
        let octree = Octree::new(&config.octree)?;
        log::info!(
            "Scene manager created (auto_prune: {}, fit_root_after_flush: {})",
            config.auto_prune,
            config.fit_root_after_flush
        );
        Ok(Self {
            config,
            objects: ObjectMap::with_key(),
            octree,
            dirty: HashSet::new(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// The spatial index as of the last flush
    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// All live objects
    pub fn objects(&self) -> &ObjectMap<SceneObject> {
        &self.objects
    }

    /// Look up an object
    pub fn object(&self, key: ObjectKey) -> Option<&SceneObject> {
        self.objects.get(key)
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when the scene holds no object
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Add an object; it is placed on the next flush
    pub fn add_object(&mut self, object: SceneObject) -> ObjectKey {
        let key = self.objects.insert(object);
        self.dirty.insert(key);
        log::trace!("Added scene object {key:?}");
        key
    }

    /// Remove an object; it leaves the octree on the next flush
    pub fn remove_object(&mut self, key: ObjectKey) -> SceneResult<SceneObject> {
        let object = self.objects.remove(key).ok_or(SceneError::UnknownObject(key))?;
        self.dirty.insert(key);
        log::trace!("Removed scene object {key:?}");
        Ok(object)
    }

    /// Mutate an object and queue it for re-placement
    pub fn update_object(&mut self, key: ObjectKey, update: impl FnOnce(&mut SceneObject)) -> SceneResult<()> {
        let object = self.objects.get_mut(key).ok_or(SceneError::UnknownObject(key))?;
        update(object);
        self.dirty.insert(key);
        Ok(())
    }

    /// Replace an object's world bounds
    pub fn set_world_bounds(&mut self, key: ObjectKey, bounds: Option<AABB>) -> SceneResult<()> {
        self.update_object(key, |object| object.set_world_bounds(bounds))
    }

    /// Show or hide an object
    pub fn set_hidden(&mut self, key: ObjectKey, hidden: bool) -> SceneResult<()> {
        self.update_object(key, |object| object.set_hidden(hidden))
    }

    /// Attach or detach an object
    pub fn set_attached(&mut self, key: ObjectKey, attached: bool) -> SceneResult<()> {
        self.update_object(key, |object| object.set_attached(attached))
    }

    /// Opt an object in or out of spatial placement
    pub fn set_clip_test_enabled(&mut self, key: ObjectKey, enabled: bool) -> SceneResult<()> {
        self.update_object(key, |object| object.set_clip_test_enabled(enabled))
    }

    /// Change how an object is tested during culling
    ///
    /// Never-culled objects are kept at the root, so this re-places the object.
    pub fn set_clip_mode(&mut self, key: ObjectKey, clip_mode: ClipMode) -> SceneResult<()> {
        self.update_object(key, |object| object.set_clip_mode(clip_mode))
    }

    /// Queue an object for re-placement; marking twice is the same as once
    pub fn mark_dirty(&mut self, key: ObjectKey) -> SceneResult<()> {
        if !self.objects.contains_key(key) {
            return Err(SceneError::UnknownObject(key));
        }
        self.dirty.insert(key);
        Ok(())
    }

    /// Whether an object awaits re-placement
    pub fn is_dirty(&self, key: ObjectKey) -> bool {
        self.dirty.contains(&key)
    }

    /// Number of objects awaiting re-placement
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Drain the dirty set into the octree
    ///
    /// Attached, visible objects are (re)placed; hidden, detached and removed
    /// ones are taken out. The outcome does not depend on drain order.
    pub fn flush_placements(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        if self.dirty.is_empty() {
            return report;
        }

        let rebuilds_before = self.octree.stats().rebuild_count;
        let mut dirty: Vec<_> = self.dirty.drain().collect();
        dirty.sort();

        for key in dirty {
            match self.objects.get(key) {
                Some(object) if object.is_placeable() => {
                    self.octree.place_object(key, object);
                    report.placed += 1;
                }
                _ => {
                    if self.octree.remove_node(key) {
                        report.removed += 1;
                    }
                }
            }
        }

        if self.config.fit_root_after_flush {
            self.octree.fit_to_contents();
        }
        if self.config.auto_prune {
            report.pruned = self.octree.prune();
        }
        report.rebuilds = self.octree.stats().rebuild_count - rebuilds_before;

        log::debug!(
            "Flushed placements: {} placed, {} removed, {} rebuilds, root size {}",
            report.placed,
            report.removed,
            report.rebuilds,
            self.octree.root_size()
        );
        report
    }

    /// Cull the scene for a camera into `queue`
    pub fn cull(&self, camera: &Camera, queue: &mut RenderQueue) -> CullStats {
        if !self.dirty.is_empty() {
            log::trace!("Culling with {} unflushed objects", self.dirty.len());
        }
        let mut visitor = CullVisitor::new(camera, &self.objects, queue);
        visitor.visit_octree(&self.octree);
        visitor.stats()
    }

    /// Cull shadow casters for a light camera rendering on behalf of `primary_camera`
    pub fn cull_shadow_casters(&self, light_camera: &Camera, primary_camera: &Camera, queue: &mut RenderQueue) -> CullStats {
        let mut visitor = CullVisitor::new(light_camera, &self.objects, queue)
            .with_pass(CullPass::Shadow)
            .with_primary_camera(primary_camera);
        visitor.visit_octree(&self.octree);
        visitor.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use crate::foundation::math::Vec3;
    use crate::scene::{CameraId, Frustum};
    use crate::spatial::NodeId;
    use approx::assert_relative_eq;

    fn cube(center: Vec3, half: f32) -> AABB {
        AABB::from_center_extents(center, Vec3::repeat(half))
    }

    #[test]
    fn test_objects_are_placed_on_flush() {
        let mut scene = SceneManager::new().unwrap();
        let key = scene.add_object(SceneObject::mesh(cube(Vec3::new(3.0, 3.0, 3.0), 0.4), 0));

        assert!(scene.is_dirty(key));
        assert!(!scene.octree().contains(key));

        let report = scene.flush_placements();
        assert_eq!(report.placed, 1);
        assert!(!scene.is_dirty(key));
        assert!(scene.octree().contains(key));
    }

    #[test]
    fn test_mark_dirty_is_idempotent() {
        let mut scene = SceneManager::new().unwrap();
        let key = scene.add_object(SceneObject::mesh(cube(Vec3::zeros(), 1.0), 0));
        scene.flush_placements();

        scene.mark_dirty(key).unwrap();
        scene.mark_dirty(key).unwrap();
        scene.set_world_bounds(key, Some(cube(Vec3::new(10.0, 0.0, 0.0), 1.0))).unwrap();
        assert_eq!(scene.dirty_count(), 1);

        let report = scene.flush_placements();
        assert_eq!(report.placed, 1);
        let bounds = scene.octree().bounds_of(key).unwrap();
        assert_relative_eq!(bounds.center(), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_hidden_and_detached_objects_leave_the_octree() {
        let mut scene = SceneManager::new().unwrap();
        let key = scene.add_object(SceneObject::mesh(cube(Vec3::new(1.0, 2.0, 3.0), 0.5), 0));
        scene.flush_placements();

        scene.set_hidden(key, true).unwrap();
        assert_eq!(scene.flush_placements().removed, 1);
        assert!(!scene.octree().contains(key));

        scene.set_hidden(key, false).unwrap();
        scene.flush_placements();
        assert!(scene.octree().contains(key));

        scene.set_attached(key, false).unwrap();
        scene.flush_placements();
        assert!(!scene.octree().contains(key));
    }

    #[test]
    fn test_removed_objects_leave_the_octree_on_flush() {
        let mut scene = SceneManager::new().unwrap();
        let key = scene.add_object(SceneObject::mesh(cube(Vec3::new(4.0, 0.0, 0.0), 0.5), 0));
        scene.flush_placements();

        scene.remove_object(key).unwrap();
        assert!(scene.octree().contains(key));
        assert_eq!(scene.remove_object(key), Err(SceneError::UnknownObject(key)));
        assert_eq!(scene.set_hidden(key, true), Err(SceneError::UnknownObject(key)));
        assert_eq!(scene.mark_dirty(key), Err(SceneError::UnknownObject(key)));

        assert_eq!(scene.flush_placements().removed, 1);
        assert!(scene.octree().is_empty());
        assert!(scene.is_empty());
    }

    #[test]
    fn test_placement_independent_of_mutation_order() {
        let bounds = [
            cube(Vec3::new(100.0, 0.0, 0.0), 1.0),
            cube(Vec3::new(-3.0, 2.0, 1.0), 0.2),
            cube(Vec3::new(0.0, -40.0, 7.0), 5.0),
        ];

        let mut forward = SceneManager::new().unwrap();
        let forward_keys: Vec<_> = bounds
            .iter()
            .map(|b| forward.add_object(SceneObject::mesh(*b, 0)))
            .collect();
        forward.flush_placements();

        let mut reverse = SceneManager::new().unwrap();
        let reverse_keys: Vec<_> = bounds.iter().map(|b| reverse.add_object(SceneObject::mesh(*b, 0))).collect();
        for key in reverse_keys.iter().rev() {
            reverse.mark_dirty(*key).unwrap();
        }
        reverse.flush_placements();

        assert_relative_eq!(forward.octree().root_size(), reverse.octree().root_size());
        for (a, b) in forward_keys.iter().zip(&reverse_keys) {
            assert_eq!(forward.octree().node_of(*a), reverse.octree().node_of(*b));
        }
    }

    #[test]
    fn test_flush_grows_then_prunes() {
        let mut scene = SceneManager::new().unwrap();
        let key = scene.add_object(SceneObject::mesh(cube(Vec3::new(500.0, 0.0, 0.0), 1.0), 0));

        let report = scene.flush_placements();
        assert_eq!(report.rebuilds, 1);
        assert_relative_eq!(scene.octree().root_size(), 1024.0);

        scene.remove_object(key).unwrap();
        let report = scene.flush_placements();
        assert!(report.pruned);
        assert_relative_eq!(scene.octree().root_size(), 1.0);
    }

    #[test]
    fn test_unclipped_objects_stay_at_root() {
        let mut scene = SceneManager::new().unwrap();
        let sun = scene.add_object(SceneObject::directional_light(2.0));
        let mesh = scene.add_object(SceneObject::mesh(cube(Vec3::new(1.0, 1.0, 1.0), 0.25), 0));
        scene.flush_placements();

        assert_eq!(scene.octree().node_of(sun), Some(NodeId::ROOT));
        assert_ne!(scene.octree().node_of(mesh), Some(NodeId::ROOT));

        scene.set_clip_test_enabled(mesh, false).unwrap();
        scene.flush_placements();
        assert_eq!(scene.octree().node_of(mesh), Some(NodeId::ROOT));
    }

    #[test]
    fn test_clip_mode_change_replaces_object() {
        let mut scene = SceneManager::new().unwrap();
        let mesh = scene.add_object(SceneObject::mesh(cube(Vec3::new(20.0, 20.0, 20.0), 0.5), 0));
        scene.flush_placements();
        assert_ne!(scene.octree().node_of(mesh), Some(NodeId::ROOT));

        scene.set_clip_mode(mesh, ClipMode::Never).unwrap();
        assert!(scene.is_dirty(mesh));
        scene.flush_placements();
        assert_eq!(scene.octree().node_of(mesh), Some(NodeId::ROOT));

        let camera = Camera::from_frustum(CameraId(0), Frustum::from_aabb(&cube(Vec3::zeros(), 5.0)));
        let mut queue = RenderQueue::new();
        scene.cull(&camera, &mut queue);
        assert!(queue.contains(mesh));

        scene.set_clip_mode(mesh, ClipMode::Dynamic).unwrap();
        scene.flush_placements();
        assert_ne!(scene.octree().node_of(mesh), Some(NodeId::ROOT));
        let mut queue = RenderQueue::new();
        scene.cull(&camera, &mut queue);
        assert!(!queue.contains(mesh));
    }

    #[test]
    fn test_cull_and_shadow_cull() {
        let mut scene = SceneManager::new().unwrap();
        let caster = scene.add_object(SceneObject::mesh(cube(Vec3::new(1.0, 1.0, 1.0), 0.5), 2));
        let receiver = scene.add_object(
            SceneObject::terrain(cube(Vec3::new(-1.0, 0.0, 1.0), 0.5), 1).with_cast_shadows(false),
        );
        scene.flush_placements();

        let camera = Camera::from_frustum(CameraId(0), Frustum::from_aabb(&cube(Vec3::zeros(), 8.0)));
        let mut queue = RenderQueue::new();
        let stats = scene.cull(&camera, &mut queue);
        assert_eq!(stats.objects_visible, 2);
        queue.sort_by_render_order();
        assert_eq!(queue.items()[0].object, receiver);

        let light_camera = Camera::from_frustum(CameraId(1), Frustum::from_aabb(&cube(Vec3::zeros(), 4.0)));
        let mut shadow_queue = RenderQueue::new();
        scene.cull_shadow_casters(&light_camera, &camera, &mut shadow_queue);
        assert_eq!(shadow_queue.len(), 1);
        assert!(shadow_queue.contains(caster));
    }

    #[test]
    fn test_scene_config_from_toml() {
        let text = "auto_prune = false\n\n[octree]\nroot_size = 128.0\n";
        let config = SceneConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();

        assert!(!config.auto_prune);
        assert!(config.fit_root_after_flush);
        assert_relative_eq!(config.octree.root_size, 128.0);
        assert_relative_eq!(config.octree.leaf_size, 1.0);

        let scene = SceneManager::with_config(config).unwrap();
        assert_relative_eq!(scene.octree().root_size(), 128.0);
    }

    #[test]
    fn test_invalid_octree_config_is_rejected() {
        let config = SceneConfig {
            octree: OctreeConfig { root_size: 100.0, ..OctreeConfig::default() },
            ..SceneConfig::default()
        };
        assert!(matches!(
            SceneManager::with_config(config),
            Err(SceneError::Octree(OctreeError::NotPowerOfTwo { .. }))
        ));
    }
}
