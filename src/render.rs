//! Frame composition as data.
//!
//! Stages and the shadow pass never talk to the GPU while they run. They
//! record into a [`FrameCommands`] list which the device executes in one go
//! at the end of the frame. This keeps every stage independent of the
//! backend and lets the whole frame be inspected in tests.
//!
//! # Key types
//!
//! - [`FrameCommands`] holds the per-draw instance data and the ordered passes
//! - [`Pass`] is one render pass: a shadow depth layer, the colour capture or the composite
//! - [`DrawCommand`] is one recorded operation inside a pass
//!

use std::collections::HashMap;

use crate::{
    data_structures::{InstanceId, instance::InstanceRaw, particle::IndirectArgs},
    gpu::{BufferHandle, PipelineKey, TextureHandle},
    resources::arena::GpuMeshSlice,
};

/// What a pass renders into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PassKind {
    /// Depth-only pass into one layer of a shadow map, with the light-space
    /// matrix stored at `view` in [`FrameCommands::shadow_views`].
    ShadowDepth {
        target: TextureHandle,
        layer: u32,
        view: u32,
    },
    /// The main colour capture into the off-screen HDR target.
    Colour { clear: wgpu::Color },
    /// Tone maps the colour capture into the requested render target.
    Composite { exposure: f32 },
}

/// One indexed draw of a registered submesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshDraw {
    pub instance_id: InstanceId,
    /// Vertex range in the buffer arena.
    pub vertices: GpuMeshSlice,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    /// Row in [`FrameCommands::instances`].
    pub instance: u32,
}

/// A recorded operation inside a [`Pass`].
///
/// # Variants
///
/// - `BindPipeline` switches pipeline for the following draws
/// - `Mesh` draws one submesh of one instance
/// - `Skybox` draws the unit cube sampling the given cubemap
/// - `Lines` draws a debug line list
/// - `MultiDrawIndirect` draws particle instances with arguments already written to `indirect`
///
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    BindPipeline(PipelineKey),
    Mesh(MeshDraw),
    Skybox {
        cubemap: TextureHandle,
    },
    Lines {
        buffer: BufferHandle,
        vertex_count: u32,
    },
    MultiDrawIndirect {
        instances: BufferHandle,
        indirect: BufferHandle,
        args: Vec<IndirectArgs>,
    },
}

impl DrawCommand {
    pub fn is_draw(&self) -> bool {
        !matches!(self, DrawCommand::BindPipeline(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pass {
    pub label: String,
    pub kind: PassKind,
    pub commands: Vec<DrawCommand>,
}

/// Everything the device needs to draw one frame.
#[derive(Debug, Default)]
pub struct FrameCommands {
    /// Per-draw data, uploaded to the instance buffer before any pass runs.
    pub instances: Vec<InstanceRaw>,
    /// Light-space view-projection matrices used by shadow depth passes.
    pub shadow_views: Vec<[[f32; 4]; 4]>,
    pub passes: Vec<Pass>,
    /// Buffers owned by this frame only; destroyed once it has executed.
    pub transient_buffers: Vec<BufferHandle>,
    instance_lookup: HashMap<InstanceId, u32>,
}

impl FrameCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget last frame's work, keeping allocations.
    pub fn clear(&mut self) {
        self.instances.clear();
        self.shadow_views.clear();
        self.passes.clear();
        self.transient_buffers.clear();
        self.instance_lookup.clear();
    }

    /// Store the per-draw data of `id` once per frame and return its row.
    /// Later calls for the same instance reuse the first row.
    pub fn instance_row(&mut self, id: InstanceId, make: impl FnOnce() -> InstanceRaw) -> u32 {
        if let Some(row) = self.instance_lookup.get(&id) {
            return *row;
        }
        let row = self.instances.len() as u32;
        self.instances.push(make());
        self.instance_lookup.insert(id, row);
        row
    }

    pub fn push_shadow_view(&mut self, view_proj: [[f32; 4]; 4]) -> u32 {
        self.shadow_views.push(view_proj);
        (self.shadow_views.len() - 1) as u32
    }

    pub fn begin_pass(&mut self, label: impl Into<String>, kind: PassKind) {
        self.passes.push(Pass {
            label: label.into(),
            kind,
            commands: Vec::new(),
        });
    }

    /// Append to the pass begun last. Commands recorded before any pass are
    /// dropped with a warning.
    pub fn push(&mut self, command: DrawCommand) {
        match self.passes.last_mut() {
            Some(pass) => pass.commands.push(command),
            None => log::warn!("Draw command recorded outside of a pass, dropping it."),
        }
    }

    pub fn current_pass(&self) -> Option<&Pass> {
        self.passes.last()
    }

    pub fn colour_pass(&self) -> Option<&Pass> {
        self.passes
            .iter()
            .find(|pass| matches!(pass.kind, PassKind::Colour { .. }))
    }

    pub fn shadow_passes(&self) -> impl Iterator<Item = &Pass> {
        self.passes
            .iter()
            .filter(|pass| matches!(pass.kind, PassKind::ShadowDepth { .. }))
    }

    pub fn draw_count(&self) -> usize {
        self.passes
            .iter()
            .flat_map(|pass| pass.commands.iter())
            .filter(|command| command.is_draw())
            .count()
    }

    pub fn track_transient(&mut self, buffer: BufferHandle) {
        self.transient_buffers.push(buffer);
    }
}
