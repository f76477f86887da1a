//! Typed events published for state transitions other subsystems react to.

use bevy_ecs::prelude::*;

/// Published whenever [`crate::Scene::add_model`] spawns a renderable
/// entity. The Virtual Texture manager's cache-invalidation hook registers
/// the entity's geometry id with its residency manager in response.
#[derive(Debug, Clone, Copy)]
pub struct AddModel {
    pub entity: Entity,
    pub geometry_id: u32,
}
