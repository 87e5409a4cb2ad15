//! The GPU seam.
//!
//! Every GPU side effect of the render core goes through [`GpuDevice`]:
//! creating, writing and destroying buffers and textures, preparing
//! pipelines and executing a recorded [`FrameCommands`] list. Resources are
//! referred to by opaque handles so that the bookkeeping above this seam
//! (arena, slot packer, registry, batches, stages) is plain data.
//!
//! [`WgpuDevice`](wgpu_device::WgpuDevice) is the native implementation.
//! All methods must be called from the thread owning the device.

use crate::{
    data_structures::material::ShaderKind,
    error::RenderError,
    render::FrameCommands,
};

pub mod wgpu_device;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Debug)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    /// Sampled RGBA layers of `size`x`size` texels.
    ColourArray { layers: u32 },
    /// Six sampled RGBA faces.
    Cube,
    /// Depth layers rendered by the shadow pass.
    DepthArray { layers: u32 },
    /// Depth cubes rendered by the shadow pass, six layers each.
    DepthCubeArray { cubes: u32 },
    /// Off-screen colour target the composite pass may write to.
    Target { width: u32, height: u32 },
}

#[derive(Clone, Debug)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub size: u32,
    pub kind: TextureKind,
}

impl TextureKind {
    pub fn layer_count(&self) -> u32 {
        match *self {
            TextureKind::ColourArray { layers } | TextureKind::DepthArray { layers } => layers,
            TextureKind::Cube => 6,
            TextureKind::DepthCubeArray { cubes } => cubes * 6,
            TextureKind::Target { .. } => 1,
        }
    }
}

/// Uniform blocks shared by every pipeline of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformBlock {
    Camera,
    Lights,
    Shadows,
}

/// Long-lived resources bound into every colour and shadow pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedBindings {
    pub arena: BufferHandle,
    pub texture_array: TextureHandle,
    pub directional_shadows: TextureHandle,
    pub spot_shadows: TextureHandle,
    pub point_shadows: TextureHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineKey {
    Mesh {
        shader: ShaderKind,
        skinned: bool,
        translucent: bool,
    },
    ShadowDepth {
        skinned: bool,
    },
    Skybox,
    Particle {
        blended: bool,
    },
    DebugLines,
    Composite,
}

impl PipelineKey {
    pub fn label(&self) -> String {
        match self {
            PipelineKey::Mesh {
                shader,
                skinned,
                translucent,
            } => format!(
                "{:?}{}{} Mesh Pipeline",
                shader,
                if *skinned { " Skinned" } else { "" },
                if *translucent { " Translucent" } else { "" }
            ),
            PipelineKey::ShadowDepth { skinned: true } => "Skinned Shadow Pipeline".to_string(),
            PipelineKey::ShadowDepth { skinned: false } => "Shadow Pipeline".to_string(),
            PipelineKey::Skybox => "Skybox Pipeline".to_string(),
            PipelineKey::Particle { blended: true } => "Blended Particle Pipeline".to_string(),
            PipelineKey::Particle { blended: false } => "Opaque Particle Pipeline".to_string(),
            PipelineKey::DebugLines => "Debug Line Pipeline".to_string(),
            PipelineKey::Composite => "Composite Pipeline".to_string(),
        }
    }
}

/// Where the composite pass writes the finished frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTarget {
    Surface,
    Texture(TextureHandle),
}

pub trait GpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> BufferHandle;
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);
    /// Zero `size` bytes starting at `offset`.
    fn clear_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64);
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureHandle;
    /// Replace one layer with `size`x`size` RGBA8 pixels.
    fn write_texture_layer(&mut self, texture: TextureHandle, layer: u32, size: u32, pixels: &[u8]);
    fn clear_texture_layer(&mut self, texture: TextureHandle, layer: u32);
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn write_uniform(&mut self, block: UniformBlock, data: &[u8]);
    fn bind_shared(&mut self, shared: &SharedBindings);
    /// Bind the cubemap sampled by the skybox pipeline, `None` to unbind.
    fn bind_skybox(&mut self, cubemap: Option<TextureHandle>);

    /// Build a pipeline ahead of its first use. A failure is reported once;
    /// commands bound to a failed pipeline draw nothing.
    fn prepare_pipeline(&mut self, key: PipelineKey) -> Result<(), RenderError>;

    /// Check that `target` can be rendered to this frame.
    fn validate_target(&mut self, target: &RenderTarget) -> Result<(), RenderError>;

    /// Encode, submit and (for the surface) present a recorded frame.
    fn execute(&mut self, frame: &FrameCommands, target: &RenderTarget) -> Result<(), RenderError>;
}
