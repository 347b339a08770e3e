//! Hierarchical frustum culling over the octree
//!
//! Node loose boxes are classified against the camera frustum. Subtrees
//! outside the frustum are skipped; once a node is found fully inside, nothing
//! below it is tested again and every object in the subtree is accepted.

use crate::foundation::collections::{ObjectKey, ObjectMap};
use crate::scene::{
    Camera, ClipMask, ClipMode, ClipState, Frustum, RenderQueue, SceneObject, SceneObjectKind, SpatialObject, AABB,
};
use crate::spatial::{Octree, OctreeNode, OctreeVisitor};

/// Which kind of image the cull feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullPass {
    /// Regular camera view
    #[default]
    Main,
    /// Shadow map; objects that do not cast shadows are skipped
    Shadow,
}

/// Counters gathered during one culling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CullStats {
    /// Octree nodes entered
    pub nodes_visited: usize,
    /// Nodes rejected together with their subtree
    pub nodes_culled: usize,
    /// Objects classified against the frustum
    pub objects_tested: usize,
    /// Objects accepted without a frustum test
    pub objects_accepted_without_test: usize,
    /// Objects pushed to the render queue
    pub objects_visible: usize,
}

/// What to cull
#[derive(Debug, Clone, Copy)]
pub enum CullTarget<'t> {
    /// Walk an octree from its root
    Octree(&'t Octree),
    /// Test an explicit list of objects one by one
    Objects(&'t [ObjectKey]),
}

/// Collects the objects visible to one camera into a render queue
pub struct CullVisitor<'a> {
    camera: &'a Camera,
    /// Carried for queue consumers (LOD, sorting); culling only uses `camera`
    primary_camera: &'a Camera,
    objects: &'a ObjectMap<SceneObject>,
    queue: &'a mut RenderQueue,
    frustum: Frustum,
    clip_mask: ClipMask,
    pass: CullPass,
    skip_clip_test: bool,
    skip_stack: Vec<bool>,
    stats: CullStats,
}

impl<'a> CullVisitor<'a> {
    /// Main-pass visitor for `camera`, which is also the primary camera
    pub fn new(camera: &'a Camera, objects: &'a ObjectMap<SceneObject>, queue: &'a mut RenderQueue) -> Self {
        Self {
            camera,
            primary_camera: camera,
            objects,
            queue,
            frustum: camera.frustum(),
            clip_mask: camera.clip_mask().unwrap_or(ClipMask::all()),
            pass: CullPass::Main,
            skip_clip_test: false,
            skip_stack: Vec::new(),
            stats: CullStats::default(),
        }
    }

    /// Select the pass kind
    #[must_use]
    pub fn with_pass(mut self, pass: CullPass) -> Self {
        self.pass = pass;
        self
    }

    /// Camera the frame is ultimately rendered from, for secondary passes
    #[must_use]
    pub fn with_primary_camera(mut self, primary_camera: &'a Camera) -> Self {
        self.primary_camera = primary_camera;
        self
    }

    /// Camera being culled for
    pub fn camera(&self) -> &Camera {
        self.camera
    }

    /// Camera the frame is rendered from
    pub fn primary_camera(&self) -> &Camera {
        self.primary_camera
    }

    /// Pass kind
    pub fn pass(&self) -> CullPass {
        self.pass
    }

    /// Counters so far
    pub fn stats(&self) -> CullStats {
        self.stats
    }

    /// Cull a target into the queue
    pub fn cull(&mut self, target: CullTarget<'_>) {
        match target {
            CullTarget::Octree(octree) => self.visit_octree(octree),
            CullTarget::Objects(keys) => self.visit_objects(keys.iter().copied()),
        }
    }

    /// Walk an octree from the root
    pub fn visit_octree(&mut self, octree: &Octree) {
        self.skip_clip_test = false;
        self.skip_stack.clear();
        octree.traverse(self);
        log::trace!("Cull {:?} for camera {:?}: {:?}", self.pass, self.camera.id, self.stats);
    }

    /// Test every listed object individually, ignoring any hierarchy
    pub fn visit_objects(&mut self, keys: impl IntoIterator<Item = ObjectKey>) {
        let skip = std::mem::replace(&mut self.skip_clip_test, false);
        for key in keys {
            self.visit_object(key);
        }
        self.skip_clip_test = skip;
    }

    /// Test one object and queue it if visible
    pub fn visit_object(&mut self, key: ObjectKey) {
        let Some(object) = self.objects.get(key) else {
            return;
        };
        if object.hidden() || (self.pass == CullPass::Shadow && !object.cast_shadows()) {
            return;
        }

        let bounds = object.world_bounds().filter(AABB::is_valid);
        let visible = match bounds {
            Some(bounds) if !self.skip_clip_test && object.clip_mode() != ClipMode::Never => {
                self.stats.objects_tested += 1;
                bounds.classify_masked(&self.frustum, self.clip_mask).is_visible()
            }
            _ => {
                self.stats.objects_accepted_without_test += 1;
                true
            }
        };
        if !visible {
            return;
        }

        self.stats.objects_visible += 1;
        match &object.kind {
            SceneObjectKind::Mesh(drawable) | SceneObjectKind::Terrain(drawable) => {
                self.queue.push(self.camera.id, key, drawable.render_order);
            }
            SceneObjectKind::Light(_) => self.queue.push_light(key),
        }
    }
}

impl OctreeVisitor for CullVisitor<'_> {
    fn enter(&mut self, _octree: &Octree, node: &OctreeNode) -> bool {
        self.stats.nodes_visited += 1;
        self.skip_stack.push(self.skip_clip_test);

        // The root may hold objects larger than its loose box.
        if !node.id().is_root() && !self.skip_clip_test {
            match node.loose_box().classify_masked(&self.frustum, self.clip_mask) {
                ClipState::Outside => {
                    self.skip_stack.pop();
                    self.stats.nodes_culled += 1;
                    return false;
                }
                ClipState::Inside => self.skip_clip_test = true,
                ClipState::Intersecting => {}
            }
        }

        for key in node.members() {
            self.visit_object(*key);
        }
        true
    }

    fn leave(&mut self, _octree: &Octree, _node: &OctreeNode) {
        self.skip_clip_test = self.skip_stack.pop().unwrap_or(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::{CameraId, Drawable, LightSource, LightType};
    use crate::spatial::{NodeId, OctreeConfig, SpatialProxy};

    struct Fixture {
        objects: ObjectMap<SceneObject>,
        octree: Octree,
    }

    impl Fixture {
        fn new() -> Self {
            let config = OctreeConfig { root_size: 64.0, leaf_size: 1.0, max_root_size: 4096.0 };
            Self {
                objects: ObjectMap::with_key(),
                octree: Octree::new(&config).unwrap(),
            }
        }

        fn add(&mut self, object: SceneObject) -> ObjectKey {
            let proxy = SpatialProxy::from_object(&object);
            let key = self.objects.insert(object);
            self.octree.place_node(key, proxy);
            key
        }

        fn cube(&mut self, center: Vec3, half: f32) -> ObjectKey {
            self.add(SceneObject::mesh(AABB::from_center_extents(center, Vec3::repeat(half)), 0))
        }

        fn all_keys(&self) -> Vec<ObjectKey> {
            self.objects.keys().collect()
        }
    }

    fn region_camera(min: Vec3, max: Vec3) -> Camera {
        Camera::from_frustum(CameraId(0), Frustum::from_aabb(&AABB::new(min, max)))
    }

    fn visible_keys(queue: &RenderQueue) -> Vec<ObjectKey> {
        let mut keys: Vec<_> = queue.items().iter().map(|item| item.object).collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_octree_cull_matches_brute_force() {
        let mut fixture = Fixture::new();
        for i in 0..60 {
            let t = i as f32;
            let center = Vec3::new((t * 7.3) % 120.0 - 60.0, (t * 3.1) % 40.0 - 20.0, (t * 11.7) % 120.0 - 60.0);
            fixture.cube(center, 0.2 + (i % 7) as f32);
        }
        let far = AABB::from_center_extents(Vec3::new(-50.0, 30.0, -50.0), Vec3::repeat(1.0));
        let point = LightSource { light_type: LightType::Point, intensity: 2.0 };
        fixture.add(SceneObject::directional_light(1.0));
        fixture.add(SceneObject::light(point, AABB::from_center_extents(Vec3::new(10.0, 0.0, 5.0), Vec3::repeat(4.0))));
        fixture.add(SceneObject::light(point, far));
        fixture.add(SceneObject::light(point, far).with_clip_mode(ClipMode::Never));
        fixture.add(SceneObject::mesh(far, 1).with_clip_mode(ClipMode::Never));
        fixture.add(SceneObject::terrain(far, 2).with_clip_mode(ClipMode::Never));
        fixture.add(SceneObject::terrain(AABB::from_center_extents(Vec3::new(5.0, -2.0, 0.0), Vec3::new(8.0, 0.5, 8.0)), 2));
        fixture.add(SceneObject::new(SceneObjectKind::Mesh(Drawable::new(0)), None));
        fixture.add(SceneObject::mesh(AABB::new(Vec3::repeat(1.0), Vec3::repeat(-1.0)), 0));
        fixture.add(SceneObject::mesh(AABB::new(Vec3::repeat(f32::NAN), Vec3::repeat(1.0)), 0));
        let mut unplaced = SceneObject::mesh(far, 0);
        unplaced.set_clip_test_enabled(false);
        fixture.add(unplaced);

        let mut camera = Camera::perspective(CameraId(1), Vec3::new(0.0, 5.0, 40.0), 60.0, 1.5, 0.5, 80.0);
        camera.look_at(Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));

        let mut hierarchical = RenderQueue::new();
        let stats = {
            let mut visitor = CullVisitor::new(&camera, &fixture.objects, &mut hierarchical);
            visitor.cull(CullTarget::Octree(&fixture.octree));
            visitor.stats()
        };

        let mut brute_force = RenderQueue::new();
        let keys = fixture.all_keys();
        CullVisitor::new(&camera, &fixture.objects, &mut brute_force).cull(CullTarget::Objects(&keys));

        let visible = visible_keys(&hierarchical);
        assert!(!visible.is_empty());
        assert!(visible.len() < keys.len());
        assert_eq!(visible, visible_keys(&brute_force));
        assert_eq!(hierarchical.len(), visible.len());
        let mut lights = hierarchical.lights().to_vec();
        let mut expected_lights = brute_force.lights().to_vec();
        lights.sort();
        expected_lights.sort();
        assert_eq!(lights, expected_lights);
        assert_eq!(lights.len(), 3);
        assert!(stats.nodes_culled > 0);
    }

    #[test]
    fn test_never_clipped_mesh_survives_outside_cell() {
        let mut fixture = Fixture::new();
        let far_mesh = fixture.add(
            SceneObject::mesh(AABB::from_center_extents(Vec3::new(25.0, 25.0, 25.0), Vec3::repeat(0.5)), 0)
                .with_clip_mode(ClipMode::Never),
        );
        let neighbour = fixture.cube(Vec3::new(25.0, 25.0, 25.0), 0.5);
        assert_eq!(fixture.octree.node_of(far_mesh), Some(NodeId::ROOT));
        assert_ne!(fixture.octree.node_of(neighbour), Some(NodeId::ROOT));

        let camera = region_camera(Vec3::repeat(-5.0), Vec3::repeat(5.0));
        let mut hierarchical = RenderQueue::new();
        CullVisitor::new(&camera, &fixture.objects, &mut hierarchical).visit_octree(&fixture.octree);
        let mut brute_force = RenderQueue::new();
        let keys = fixture.all_keys();
        CullVisitor::new(&camera, &fixture.objects, &mut brute_force).cull(CullTarget::Objects(&keys));

        assert!(hierarchical.contains(far_mesh));
        assert!(!hierarchical.contains(neighbour));
        assert_eq!(visible_keys(&hierarchical), visible_keys(&brute_force));
    }

    #[test]
    fn test_inside_nodes_skip_object_tests() {
        let mut fixture = Fixture::new();
        let small: Vec<_> = (0..10)
            .map(|i| fixture.cube(Vec3::new(i as f32 * 5.0 - 25.0, 1.0, -3.0), 0.3))
            .collect();

        let camera = region_camera(Vec3::repeat(-100.0), Vec3::repeat(100.0));
        let mut queue = RenderQueue::new();
        let stats = {
            let mut visitor = CullVisitor::new(&camera, &fixture.objects, &mut queue);
            visitor.visit_octree(&fixture.octree);
            visitor.stats()
        };

        assert_eq!(stats.objects_tested, 0);
        assert_eq!(stats.objects_accepted_without_test, small.len());
        assert_eq!(stats.nodes_culled, 0);
        assert_eq!(visible_keys(&queue).len(), small.len());
    }

    #[test]
    fn test_skip_flag_restored_after_inside_subtree() {
        let mut fixture = Fixture::new();
        // Level-1 cell [-32, 0]³ has loose box [-48, 16]³, inside the region,
        // and is walked before the straddling [0, 32]³ cell
        let inside = fixture.cube(Vec3::new(-10.0, -10.0, -10.0), 0.3);
        let straddling = fixture.cube(Vec3::new(20.0, 20.0, 20.0), 0.3);
        let outside = fixture.cube(Vec3::new(30.0, 30.0, 30.0), 0.3);

        let camera = region_camera(Vec3::repeat(-60.0), Vec3::repeat(25.0));
        let mut queue = RenderQueue::new();
        let stats = {
            let mut visitor = CullVisitor::new(&camera, &fixture.objects, &mut queue);
            visitor.visit_octree(&fixture.octree);
            visitor.stats()
        };

        assert!(queue.contains(inside));
        assert!(queue.contains(straddling));
        assert!(!queue.contains(outside));
        assert_eq!(stats.objects_accepted_without_test, 2);
    }

    #[test]
    fn test_hidden_and_shadow_filtering() {
        let mut fixture = Fixture::new();
        let visible = fixture.cube(Vec3::new(1.0, 1.0, 1.0), 0.5);
        let hidden = fixture.cube(Vec3::new(2.0, 1.0, 1.0), 0.5);
        fixture.objects[hidden].set_hidden(true);
        let no_shadow = fixture.add(
            SceneObject::mesh(AABB::from_center_extents(Vec3::new(3.0, 1.0, 1.0), Vec3::repeat(0.5)), 0)
                .with_cast_shadows(false),
        );

        let camera = region_camera(Vec3::repeat(-10.0), Vec3::repeat(10.0));
        let mut main = RenderQueue::new();
        CullVisitor::new(&camera, &fixture.objects, &mut main).visit_octree(&fixture.octree);
        assert_eq!(visible_keys(&main), {
            let mut expected = vec![visible, no_shadow];
            expected.sort();
            expected
        });

        let mut shadow = RenderQueue::new();
        CullVisitor::new(&camera, &fixture.objects, &mut shadow)
            .with_pass(CullPass::Shadow)
            .visit_octree(&fixture.octree);
        assert_eq!(visible_keys(&shadow), vec![visible]);
    }

    #[test]
    fn test_never_clipped_and_lights() {
        let mut fixture = Fixture::new();
        let sun = fixture.add(SceneObject::directional_light(1.0));
        let far_mesh = fixture.add(
            SceneObject::mesh(AABB::from_center_extents(Vec3::new(25.0, 25.0, 25.0), Vec3::repeat(0.5)), 3)
                .with_clip_mode(ClipMode::Never),
        );
        let culled = fixture.cube(Vec3::new(-25.0, 25.0, 25.0), 0.5);

        let camera = region_camera(Vec3::repeat(-5.0), Vec3::repeat(5.0));
        let mut queue = RenderQueue::new();
        let keys = [sun, far_mesh, culled];
        CullVisitor::new(&camera, &fixture.objects, &mut queue).cull(CullTarget::Objects(&keys));

        assert_eq!(queue.lights(), &[sun]);
        assert!(!queue.contains(culled));
        assert_eq!(queue.items()[0].render_order, 3);
        assert_eq!(queue.items()[0].object, far_mesh);
    }

    #[test]
    fn test_clip_mask_limits_tested_planes() {
        let mut fixture = Fixture::new();
        let beyond_far = fixture.cube(Vec3::new(0.0, 0.0, 20.0), 0.5);

        let mut camera = region_camera(Vec3::repeat(-10.0), Vec3::repeat(10.0));
        let mut queue = RenderQueue::new();
        CullVisitor::new(&camera, &fixture.objects, &mut queue).visit_octree(&fixture.octree);
        assert!(!queue.contains(beyond_far));

        camera.set_clip_mask(Some(ClipMask::SIDES));
        let mut queue = RenderQueue::new();
        CullVisitor::new(&camera, &fixture.objects, &mut queue).visit_octree(&fixture.octree);
        assert!(queue.contains(beyond_far));
    }

    #[test]
    fn test_primary_camera_defaults_to_cull_camera() {
        let fixture = Fixture::new();
        let shadow_camera = region_camera(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        let main_camera = Camera::perspective(CameraId(9), Vec3::new(0.0, 0.0, 10.0), 45.0, 1.0, 0.1, 100.0);
        let (mut first, mut second) = (RenderQueue::new(), RenderQueue::new());

        let visitor = CullVisitor::new(&shadow_camera, &fixture.objects, &mut first);
        assert_eq!(visitor.primary_camera().id, CameraId(0));

        let visitor = CullVisitor::new(&shadow_camera, &fixture.objects, &mut second)
            .with_pass(CullPass::Shadow)
            .with_primary_camera(&main_camera);
        assert_eq!(visitor.primary_camera().id, CameraId(9));
        assert_eq!(visitor.pass(), CullPass::Shadow);
    }
}
