//! Pipeline stages and their ordering.
//!
//! A stage is a self-contained unit of per-frame work: it reads the batches
//! and the scene through a [`StageContext`] and records draw commands into
//! the frame. The [`PipelineSequence`] decides in which order the render
//! system calls them.
//!
//! Stages are constructed from a closed set of kinds ([`StageKind`]), so a
//! pipeline can be described by name (e.g. from a config file) without any
//! runtime type lookup.

use std::{any::Any, fmt, str::FromStr};

use thiserror::Error;

use crate::{
    batches::InstanceBatches,
    camera::CameraState,
    data_structures::{InstanceId, instance::{DrawInstance, InstanceRaw}},
    gpu::{GpuDevice, PipelineKey, TextureHandle},
    render::{DrawCommand, FrameCommands, MeshDraw},
    resources::registry::GpuRegistry,
    scene::SceneSource,
    settings::RenderSettings,
};

pub mod debug;
pub mod opaque;
pub mod particle;
pub mod skybox;
pub mod transparent;

pub use debug::DebugStage;
pub use opaque::OpaqueStage;
pub use particle::ParticleStage;
pub use skybox::SkyboxStage;
pub use transparent::TransparentStage;

/// Everything a stage may read or record during a frame.
pub struct StageContext<'a> {
    pub device: &'a mut dyn GpuDevice,
    pub registry: &'a GpuRegistry,
    pub batches: &'a InstanceBatches,
    pub scene: &'a dyn SceneSource,
    pub camera: &'a CameraState,
    pub frame: &'a mut FrameCommands,
    pub settings: &'a RenderSettings,
    /// Cubemap of the attached skybox.
    pub skybox: Option<TextureHandle>,
}

impl<'a> StageContext<'a> {
    /// The frame's instance row of `instance`, storing it on first use.
    pub fn instance_row(&mut self, instance: &DrawInstance) -> u32 {
        let registry = self.registry;
        let world = self.scene.world_transform(instance.id);
        self.frame.instance_row(instance.id, || {
            let material = instance.resolve_material();
            let albedo = material
                .albedo
                .and_then(|texture| registry.texture_slot(texture.id));
            let raw = InstanceRaw::new(world, &material, albedo);
            match instance
                .skeleton
                .as_ref()
                .and_then(|skeleton| registry.skeleton(skeleton.id))
            {
                Some(record) => raw.with_joints(record.joints.byte_offset, record.joint_count),
                None => raw,
            }
        })
    }

    /// Record one draw per resident submesh of an active, registered
    /// instance. Submeshes without GPU data, or whose vertex layout does not
    /// match the instance's pipeline, are skipped. Returns the number of
    /// draws recorded.
    pub fn draw_instance(&mut self, id: InstanceId) -> usize {
        let batches = self.batches;
        let registry = self.registry;
        let Some(instance) = batches.get(id) else {
            return 0;
        };
        if !self.scene.is_active(id) {
            return 0;
        }
        let Some(record) = registry.mesh(instance.mesh.id) else {
            return 0;
        };
        let row = self.instance_row(instance);
        let skinned = instance.is_skinned();
        let mut draws = 0;
        for submesh in record.loaded().filter(|submesh| submesh.skinned == skinned) {
            self.frame.push(DrawCommand::Mesh(MeshDraw {
                instance_id: id,
                vertices: submesh.vertices,
                index_buffer: submesh.index_buffer,
                index_count: submesh.index_count,
                instance: row,
            }));
            draws += 1;
        }
        draws
    }

    pub fn bind(&mut self, pipeline: PipelineKey) {
        self.frame.push(DrawCommand::BindPipeline(pipeline));
    }
}

/// Build the given pipelines now. Failures are logged and the pipelines
/// stay unbound.
pub fn prepare_pipelines(device: &mut dyn GpuDevice, keys: impl IntoIterator<Item = PipelineKey>) {
    for key in keys {
        if let Err(e) = device.prepare_pipeline(key) {
            log::error!("{e}");
        }
    }
}

pub trait RenderStage: Any {
    fn kind(&self) -> StageKind;

    /// Create GPU objects the stage needs. Called once, before its first frame.
    fn initialize(&mut self, device: &mut dyn GpuDevice, settings: &RenderSettings);

    /// Runs before the shadow pass.
    fn pre_render(&mut self, _ctx: &mut StageContext<'_>) {}

    /// Runs inside the colour pass.
    fn render(&mut self, ctx: &mut StageContext<'_>);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The closed set of stages the render system can construct by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Opaque,
    Transparent,
    Skybox,
    Particle,
    Debug,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Opaque,
        StageKind::Transparent,
        StageKind::Skybox,
        StageKind::Particle,
        StageKind::Debug,
    ];

    /// Call order of a freshly initialised render system.
    pub const DEFAULT_ORDER: [StageKind; 5] = [
        StageKind::Opaque,
        StageKind::Skybox,
        StageKind::Transparent,
        StageKind::Particle,
        StageKind::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Opaque => "opaque",
            StageKind::Transparent => "transparent",
            StageKind::Skybox => "skybox",
            StageKind::Particle => "particle",
            StageKind::Debug => "debug",
        }
    }

    pub fn construct(self) -> Box<dyn RenderStage> {
        match self {
            StageKind::Opaque => Box::new(OpaqueStage::new()),
            StageKind::Transparent => Box::new(TransparentStage::new()),
            StageKind::Skybox => Box::new(SkyboxStage::new()),
            StageKind::Particle => Box::new(ParticleStage::new()),
            StageKind::Debug => Box::new(DebugStage::new()),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown render stage {0:?}")]
pub struct UnknownStage(pub String);

impl FromStr for StageKind {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Registered stages in registration order plus the order they are called in.
#[derive(Default)]
pub struct PipelineSequence {
    stages: Vec<Box<dyn RenderStage>>,
    call_order: Vec<usize>,
}

impl PipelineSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage at call position `priority`, clamped to the number
    /// of stages. Returns the position used.
    pub fn push(&mut self, stage: Box<dyn RenderStage>, priority: usize) -> usize {
        let position = priority.min(self.call_order.len());
        self.call_order.insert(position, self.stages.len());
        self.stages.push(stage);
        position
    }

    /// Remove the `count` most recently registered stages, wherever they sit
    /// in the call order. Popping more than exist empties the sequence.
    pub fn pop(&mut self, count: usize) -> Vec<Box<dyn RenderStage>> {
        let mut popped = Vec::new();
        for _ in 0..count {
            let Some(stage) = self.stages.pop() else {
                break;
            };
            let index = self.stages.len();
            self.call_order.retain(|i| *i != index);
            popped.push(stage);
        }
        popped
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage kinds in call order.
    pub fn call_order(&self) -> Vec<StageKind> {
        self.call_order
            .iter()
            .map(|i| self.stages[*i].kind())
            .collect()
    }

    /// Stage kinds in registration order.
    pub fn registration_order(&self) -> Vec<StageKind> {
        self.stages.iter().map(|stage| stage.kind()).collect()
    }

    pub fn for_each_in_call_order(&mut self, mut f: impl FnMut(&mut dyn RenderStage)) {
        for i in &self.call_order {
            f(self.stages[*i].as_mut());
        }
    }

    pub fn for_each(&mut self, mut f: impl FnMut(&mut dyn RenderStage)) {
        for stage in &mut self.stages {
            f(stage.as_mut());
        }
    }

    /// First registered stage of type `T`.
    pub fn get<T: RenderStage>(&self) -> Option<&T> {
        self.stages
            .iter()
            .find_map(|stage| stage.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: RenderStage>(&mut self) -> Option<&mut T> {
        self.stages
            .iter_mut()
            .find_map(|stage| stage.as_any_mut().downcast_mut::<T>())
    }
}
