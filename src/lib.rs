//! forge-render
//!
//! The rendering core of a forward renderer. It mirrors meshes, textures,
//! skeletons and skyboxes into long-lived GPU storage, files drawable
//! instances into batches keyed by shading model and surface, and runs a
//! fixed sequence of pipeline stages each frame after rendering shadow maps
//! for every shadow-casting light.
//!
//! High-level modules
//! - `resources`: buffer arena, texture slot packer, GPU registry and the background loader
//! - `batches`: instance batches keyed by surface, shader and skinning
//! - `stages`: the opaque, transparent, skybox, particle and debug stages
//! - `shadow`: cascaded directional, cube point and spot shadow maps
//! - `system`: the frame orchestrator
//! - `render`: frame composition as data, executed by a [`gpu::GpuDevice`]
//! - `gpu`: the GPU seam and its wgpu implementation
//! - `pipelines`: wgpu pipeline construction and shaders
//!

pub mod batches;
pub mod camera;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod gpu;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod shadow;
pub mod stages;
pub mod system;

pub use error::RenderError;
pub use gpu::{GpuDevice, RenderTarget, wgpu_device::WgpuDevice};
pub use scene::SceneSource;
pub use settings::RenderSettings;
pub use system::{RenderParams, RenderSystem};

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu;

/// Install `env_logger` reading `RUST_LOG`. Safe to call more than once.
pub fn init_logging() {
    if env_logger::try_init().is_err() {
        log::debug!("A logger is already installed.");
    }
}
