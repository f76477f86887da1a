//! `bevy_ecs`-backed component store the render graph and the geometry and
//! texture subsystems read the scene through, plus the per-model SDF cache.

pub mod components;
pub mod error;
pub mod events;
pub mod sdf_cache;
pub mod world;

pub use components::{ActiveCamera, Camera, DirectionalLight, GlobalMarker, Material, Mesh, SDFGrid, Transform, VirtualMesh};
pub use error::SceneError;
pub use events::AddModel;
pub use sdf_cache::{load_or_build, read_cache, write_cache};
pub use world::Scene;
