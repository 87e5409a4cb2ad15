//! Engine-side data consumed by the render core.
//!
//! - `model` holds vertex layouts, meshes and skeletons
//! - `material` describes shader kind, surface kind and scalar parameters
//! - `texture` holds decoded pixel data for textures and skyboxes
//! - `instance` holds draw instances and the per-draw data sent to the GPU
//! - `light` holds light records and the light uniform block
//! - `particle` holds particle emitters and their GPU instance layout

pub mod instance;
pub mod light;
pub mod material;
pub mod model;
pub mod particle;
pub mod texture;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

resource_id!(
    /// Identity of a scene object (mesh instance, skinned instance or emitter).
    InstanceId
);
resource_id!(MeshId);
resource_id!(SkeletonId);
resource_id!(TextureId);
resource_id!(MaterialId);
resource_id!(SkyboxId);
