//! The scene's `bevy_ecs::World` wrapper: spawns the global entity, carries
//! the frame index and active camera as singleton state, and publishes
//! [`AddModel`] events (Section 4.7).

use bevy_ecs::event::Events;
use bevy_ecs::prelude::*;

use crate::components::ActiveCamera;
use crate::components::GlobalMarker;
use crate::events::AddModel;

struct FrameIndex(u64);

pub struct Scene {
    world: World,
    global_entity: Entity,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut world = World::new();
        world.insert_resource(Events::<AddModel>::default());
        world.insert_resource(FrameIndex(0));
        let global_entity = world.spawn().insert(GlobalMarker).id();
        Self { world, global_entity }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn global_entity(&self) -> Entity {
        self.global_entity
    }

    pub fn spawn(&mut self) -> bevy_ecs::world::EntityMut {
        self.world.spawn()
    }

    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.world.despawn(entity)
    }

    pub fn set_active_camera(&mut self, camera: Entity) {
        self.world.entity_mut(self.global_entity).insert(ActiveCamera(camera));
    }

    pub fn active_camera(&self) -> Option<Entity> {
        self.world.get::<ActiveCamera>(self.global_entity).map(|active| active.0)
    }

    pub fn frame_index(&self) -> u64 {
        self.world.resource::<FrameIndex>().0
    }

    pub fn advance_frame(&mut self) {
        self.world.resource_mut::<FrameIndex>().0 += 1;
    }

    /// Publishes an [`AddModel`] event for an entity already spawned by the
    /// caller (scene editing is an out-of-scope concern; the core only
    /// reacts to this event).
    pub fn notify_model_added(&mut self, entity: Entity, geometry_id: u32) {
        self.world.resource_mut::<Events<AddModel>>().send(AddModel { entity, geometry_id });
    }

    /// Drains events published since the last drain. The render graph and
    /// geometry/texture subsystems only read the world, so draining here
    /// (rather than a `bevy_ecs` system) keeps their contract read-only.
    pub fn drain_add_model_events(&mut self) -> Vec<AddModel> {
        self.world.resource_mut::<Events<AddModel>>().drain().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::components::{Camera, Transform};

    #[test]
    fn global_entity_exists_and_is_unique() {
        let scene = Scene::new();
        assert!(scene.world().get::<GlobalMarker>(scene.global_entity()).is_some());
    }

    #[test]
    fn active_camera_round_trips_through_the_global_entity() {
        let mut scene = Scene::new();
        let camera = scene.spawn().insert(Camera { fov_y_radians: 1.0, near: 0.1, far: 1000.0, aspect_ratio: 16.0 / 9.0 }).id();
        scene.set_active_camera(camera);
        assert_eq!(scene.active_camera(), Some(camera));
    }

    #[test]
    fn frame_index_advances_monotonically() {
        let mut scene = Scene::new();
        assert_eq!(scene.frame_index(), 0);
        scene.advance_frame();
        scene.advance_frame();
        assert_eq!(scene.frame_index(), 2);
    }

    #[test]
    fn add_model_event_is_drained_exactly_once() {
        let mut scene = Scene::new();
        let entity = scene.spawn().insert(Transform::identity()).id();
        scene.notify_model_added(entity, 7);
        let drained = scene.drain_add_model_events();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].geometry_id, 7);
        assert!(scene.drain_add_model_events().is_empty());
    }
}
