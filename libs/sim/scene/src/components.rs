//! Component types stored per-entity. The render graph and the geometry and
//! texture subsystems only ever read these; nothing outside the scene
//! crate's own `Scene` API mutates the world's structure.

use bevy_ecs::prelude::*;
use nalgebra::{Point3, UnitQuaternion, Vector3};

/// Legacy flat-submesh geometry, as opposed to [`VirtualMesh`].
#[derive(Component, Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<mesh_simplify::Vertex>,
    pub indices: Vec<u32>,
}

/// Wraps the Virtual Geometry Builder's output for one renderable entity.
#[derive(Component, Debug, Clone)]
pub struct VirtualMesh {
    pub submeshes: Vec<virtual_geometry::VirtualSubmesh>,
}

#[derive(Component, Debug, Clone)]
pub struct Material {
    pub base_color_texture: Option<String>,
    pub normal_texture: Option<String>,
    pub metallic_roughness_texture: Option<String>,
    pub emissive_texture: Option<String>,
    pub base_color_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_texture: None,
            normal_texture: None,
            metallic_roughness_texture: None,
            emissive_texture: None,
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
        }
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: f32,
}

impl Transform {
    pub fn identity() -> Self {
        Self { translation: Vector3::zeros(), rotation: UnitQuaternion::identity(), scale: 1.0 }
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Camera {
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
    pub aspect_ratio: f32,
}

/// `fall_off_start`/`fall_off_end` are carried as plain fields with no
/// attenuation behavior attached; applying them is an out-of-scope lighting
/// pass's concern.
#[derive(Component, Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub direction: Vector3<f32>,
    pub color: [f32; 3],
    pub intensity: f32,
    pub fall_off_start: f32,
    pub fall_off_end: f32,
}

/// Per-submesh signed-distance-field used as an external collaborator for
/// tracing against static geometry. Only the data shape is owned here; the
/// tracing/generation algorithm is out of scope.
#[derive(Component, Debug, Clone)]
pub struct SDFGrid {
    pub aabb_min: Point3<f32>,
    pub aabb_max: Point3<f32>,
    pub resolution: u32,
    pub samples: Vec<f32>,
}

impl SDFGrid {
    pub fn new(aabb_min: Point3<f32>, aabb_max: Point3<f32>, resolution: u32, samples: Vec<f32>) -> Self {
        assert_eq!(samples.len(), (resolution as usize).pow(3), "sample count must be resolution^3");
        Self { aabb_min, aabb_max, resolution, samples }
    }

    pub fn sample(&self, x: u32, y: u32, z: u32) -> f32 {
        let r = self.resolution;
        self.samples[(z * r * r + y * r + x) as usize]
    }
}

/// Marks the single global entity that owns singleton scene state.
#[derive(Component, Debug, Default)]
pub struct GlobalMarker;

#[derive(Component, Debug, Clone, Copy)]
pub struct ActiveCamera(pub Entity);
