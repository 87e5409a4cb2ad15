//! The frame orchestrator.
//!
//! [`RenderSystem`] owns the GPU registry, the instance batches, the shadow
//! pass and the ordered pipeline stages, and runs one frame per
//! [`render`](RenderSystem::render) call:
//!
//! 1. drain the upload queue and upload skeleton poses
//! 2. upload the camera block
//! 3. rebuild the light block from the enabled lights
//! 4. call `pre_render` on every stage in call order
//! 5. record the shadow pass (when shadows are enabled)
//! 6. begin the colour capture and call `render` on every stage in call order
//! 7. composite into the requested target and present
//!
//! No error leaves `render`: failures are logged and the frame carries on.

use std::{collections::HashSet, sync::Arc, time::Duration};

use instant::Instant;

use crate::{
    batches::{BatchSlot, InstanceBatches},
    camera::{Camera, CameraState, Projection},
    data_structures::{
        InstanceId, MeshId, SkeletonId, SkyboxId, TextureId,
        instance::DrawInstance,
        light::LightsUniform,
        material::Material,
        model::{Mesh, Skeleton},
        particle::ParticleEmitter,
        texture::{Skybox, TextureResource},
    },
    gpu::{GpuDevice, PipelineKey, RenderTarget, SharedBindings, UniformBlock},
    render::{FrameCommands, PassKind},
    resources::{
        loader::{UploadQueue, UploadSender},
        registry::{GpuRegistry, GpuSkeletonRecord},
    },
    scene::SceneSource,
    settings::RenderSettings,
    shadow::ShadowPass,
    stages::{PipelineSequence, RenderStage, StageContext, StageKind, UnknownStage, prepare_pipelines},
};

/// Per-frame input of [`RenderSystem::render`].
#[derive(Clone, Copy, Debug)]
pub struct RenderParams<'a> {
    pub target: RenderTarget,
    pub camera: &'a Camera,
    pub projection: &'a Projection,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Number of frames rendered so far.
    pub frame: u64,
    /// CPU time spent in the last `render` call.
    pub frame_time: Duration,
    pub draw_calls: usize,
    pub passes: usize,
    /// Uploads drained from the queue at the start of the last frame.
    pub uploads: usize,
}

/// GPU state created by [`RenderSystem::initialize`].
struct GpuState {
    registry: GpuRegistry,
    shadows: ShadowPass,
}

pub struct RenderSystem<D: GpuDevice> {
    device: D,
    settings: RenderSettings,
    state: Option<GpuState>,
    batches: InstanceBatches,
    pipelines: PipelineSequence,
    uploads: UploadQueue,
    frame: FrameCommands,
    skybox: Option<SkyboxId>,
    stats: FrameStats,
}

impl<D: GpuDevice> RenderSystem<D> {
    pub fn new(device: D, settings: RenderSettings) -> Self {
        Self {
            device,
            settings,
            state: None,
            batches: InstanceBatches::new(),
            pipelines: PipelineSequence::new(),
            uploads: UploadQueue::new(),
            frame: FrameCommands::new(),
            skybox: None,
            stats: FrameStats::default(),
        }
    }

    /// Create the arena, texture array and shadow maps, build the shared
    /// pipelines and initialise every stage. Without stages pushed
    /// beforehand the default sequence (opaque, skybox, transparent,
    /// particle, debug) is installed.
    pub fn initialize(&mut self) {
        if self.state.is_some() {
            log::warn!("Render system is already initialized.");
            return;
        }
        let registry = GpuRegistry::new(&mut self.device, &self.settings);
        let shadows = ShadowPass::new(&mut self.device, &self.settings);
        shadows.prepare(&mut self.device);
        prepare_pipelines(&mut self.device, [PipelineKey::Composite]);
        self.device.bind_shared(&SharedBindings {
            arena: registry.arena().buffer(),
            texture_array: registry.slots().texture(),
            directional_shadows: shadows.directional_maps(),
            spot_shadows: shadows.spot_maps(),
            point_shadows: shadows.point_maps(),
        });

        if self.pipelines.is_empty() {
            for kind in StageKind::DEFAULT_ORDER {
                self.pipelines.push(kind.construct(), usize::MAX);
            }
        }
        let (device, settings) = (&mut self.device, &self.settings);
        self.pipelines
            .for_each(|stage| stage.initialize(device, settings));

        log::info!(
            "Render system initialized: {} byte arena, {} texture slots, stages {:?}",
            self.settings.arena_capacity,
            self.settings.texture_slots,
            self.pipelines.call_order()
        );
        self.state = Some(GpuState { registry, shadows });
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Change settings between frames. Capacities only apply at
    /// [`initialize`](Self::initialize).
    pub fn configure(&mut self, f: impl FnOnce(&mut RenderSettings)) {
        f(&mut self.settings);
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Render one frame of `scene`.
    pub fn render(&mut self, scene: &dyn SceneSource, params: &RenderParams<'_>) {
        let started = Instant::now();
        let Some(state) = self.state.as_mut() else {
            log::error!("Render called before the render system was initialized.");
            return;
        };

        let uploads = self.uploads.drain(&mut state.registry, &mut self.device);
        upload_poses(&mut state.registry, &mut self.device, &self.batches, scene);

        let camera = CameraState::new(params.camera, params.projection);
        self.device
            .write_uniform(UniformBlock::Camera, bytemuck::bytes_of(&camera.to_uniform()));
        self.device.write_uniform(
            UniformBlock::Lights,
            bytemuck::bytes_of(&LightsUniform::from_lights(scene.lights())),
        );
        if let Err(e) = self.device.validate_target(&params.target) {
            log::error!("{e}");
        }

        self.frame.clear();
        let skybox = self
            .skybox
            .and_then(|id| state.registry.skybox(id))
            .map(|record| record.cubemap);
        let mut ctx = StageContext {
            device: &mut self.device,
            registry: &state.registry,
            batches: &self.batches,
            scene,
            camera: &camera,
            frame: &mut self.frame,
            settings: &self.settings,
            skybox,
        };

        self.pipelines
            .for_each_in_call_order(|stage| stage.pre_render(&mut ctx));

        if ctx.settings.shadows_enabled {
            state.shadows.record(&mut ctx);
        } else {
            state.shadows.disable(ctx.device);
        }

        ctx.frame.begin_pass(
            "Colour Pass",
            PassKind::Colour {
                clear: ctx.settings.clear_colour,
            },
        );
        self.pipelines
            .for_each_in_call_order(|stage| stage.render(&mut ctx));

        ctx.frame.begin_pass(
            "Composite Pass",
            PassKind::Composite {
                exposure: ctx.settings.exposure,
            },
        );

        if let Err(e) = self.device.execute(&self.frame, &params.target) {
            log::error!("{e}");
        }
        for buffer in self.frame.transient_buffers.drain(..) {
            self.device.destroy_buffer(buffer);
        }

        self.stats = FrameStats {
            frame: self.stats.frame + 1,
            frame_time: started.elapsed(),
            draw_calls: self.frame.draw_count(),
            passes: self.frame.passes.len(),
            uploads,
        };
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// The commands recorded by the last frame.
    pub fn last_frame(&self) -> &FrameCommands {
        &self.frame
    }

    pub fn register_instance(&mut self, instance: DrawInstance) -> BatchSlot {
        let skinned = instance.is_skinned();
        let mismatched = instance
            .mesh
            .submeshes
            .iter()
            .filter(|submesh| submesh.vertices.is_skinned() != skinned)
            .count();
        if mismatched > 0 {
            log::warn!(
                "Instance {:?}: {mismatched} submesh(es) of mesh {:?} do not match its {} pipeline and will not be drawn",
                instance.id,
                instance.mesh.id,
                if skinned { "skinned" } else { "static" }
            );
        }
        self.batches.register(instance)
    }

    pub fn unregister_instance(&mut self, id: InstanceId) -> Option<DrawInstance> {
        self.batches.unregister(id)
    }

    pub fn register_emitter(&mut self, emitter: ParticleEmitter) {
        self.batches.register_emitter(emitter);
    }

    pub fn unregister_emitter(&mut self, id: InstanceId) -> Option<ParticleEmitter> {
        self.batches.unregister_emitter(id)
    }

    /// Re-register every instance bound to `material` so it moves to the
    /// batch matching the material's current shader and surface. Returns
    /// the number of instances moved.
    pub fn update_meshes_with_material(&mut self, material: &Arc<Material>) -> usize {
        if let (Some(state), Some(texture)) = (self.state.as_mut(), material.albedo.as_ref()) {
            state.registry.create_texture(&mut self.device, texture);
        }
        self.batches.update_material(material)
    }

    pub fn batches(&self) -> &InstanceBatches {
        &self.batches
    }

    /// Insert a stage at call position `priority` (clamped to the number of
    /// stages). Stages pushed after `initialize` are initialised right away.
    pub fn push_render_pipeline(&mut self, mut stage: Box<dyn RenderStage>, priority: usize) -> usize {
        if self.state.is_some() {
            stage.initialize(&mut self.device, &self.settings);
        }
        self.pipelines.push(stage, priority)
    }

    /// Construct a stage by name, e.g. `"transparent"`, and push it.
    pub fn push_render_pipeline_named(&mut self, name: &str, priority: usize) -> Result<usize, UnknownStage> {
        let kind: StageKind = name.parse()?;
        Ok(self.push_render_pipeline(kind.construct(), priority))
    }

    /// Remove the `count` most recently pushed stages.
    pub fn pop_render_pipeline(&mut self, count: usize) -> Vec<Box<dyn RenderStage>> {
        self.pipelines.pop(count)
    }

    /// Stage kinds in the order they are called.
    pub fn call_order(&self) -> Vec<StageKind> {
        self.pipelines.call_order()
    }

    pub fn stage<T: RenderStage>(&self) -> Option<&T> {
        self.pipelines.get::<T>()
    }

    pub fn stage_mut<T: RenderStage>(&mut self) -> Option<&mut T> {
        self.pipelines.get_mut::<T>()
    }

    /// Upload the skybox if needed and draw it from the next frame on.
    pub fn attach_new_skybox(&mut self, skybox: &Skybox) {
        let Some(state) = self.state.as_mut() else {
            log::error!("Cannot attach skybox {} before initialize.", skybox.id.raw());
            return;
        };
        let record = state.registry.create_skybox(&mut self.device, skybox);
        self.device.bind_skybox(Some(record.cubemap));
        self.skybox = Some(skybox.id);
    }

    pub fn detach_skybox(&mut self) {
        self.skybox = None;
        self.device.bind_skybox(None);
    }

    pub fn attached_skybox(&self) -> Option<SkyboxId> {
        self.skybox
    }

    /// Upload the submeshes of `mesh` that are not resident yet. Returns how
    /// many submeshes are resident.
    pub fn create_mesh(&mut self, mesh: &Mesh) -> usize {
        match self.state.as_mut() {
            Some(state) => state.registry.create_mesh(&mut self.device, mesh),
            None => {
                log::error!("Cannot create mesh {} before initialize.", mesh.name);
                0
            }
        }
    }

    pub fn remove_mesh(&mut self, id: MeshId) {
        if let Some(state) = self.state.as_mut() {
            if let Err(e) = state.registry.remove_mesh(&mut self.device, id) {
                log::error!("{e}");
            }
        }
    }

    pub fn create_texture(&mut self, texture: &TextureResource) -> Option<u32> {
        let state = self.state.as_mut()?;
        state.registry.create_texture(&mut self.device, texture)
    }

    pub fn remove_texture(&mut self, id: TextureId) {
        if let Some(state) = self.state.as_mut() {
            if let Err(e) = state.registry.remove_texture(&mut self.device, id) {
                log::error!("{e}");
            }
        }
    }

    pub fn create_skeleton(&mut self, skeleton: &Skeleton) -> Option<GpuSkeletonRecord> {
        let state = self.state.as_mut()?;
        state.registry.create_skeleton(&mut self.device, skeleton)
    }

    pub fn remove_skeleton(&mut self, id: SkeletonId) {
        if let Some(state) = self.state.as_mut() {
            if let Err(e) = state.registry.remove_skeleton(&mut self.device, id) {
                log::error!("{e}");
            }
        }
    }

    pub fn create_skybox(&mut self, skybox: &Skybox) {
        if let Some(state) = self.state.as_mut() {
            state.registry.create_skybox(&mut self.device, skybox);
        }
    }

    /// Drop a skybox's cubemap, detaching it first if it is attached.
    pub fn remove_skybox(&mut self, id: SkyboxId) {
        if self.skybox == Some(id) {
            self.detach_skybox();
        }
        if let Some(state) = self.state.as_mut() {
            if let Err(e) = state.registry.remove_skybox(&mut self.device, id) {
                log::error!("{e}");
            }
        }
    }

    pub fn registry(&self) -> Option<&GpuRegistry> {
        self.state.as_ref().map(|state| &state.registry)
    }

    pub fn shadows(&self) -> Option<&ShadowPass> {
        self.state.as_ref().map(|state| &state.shadows)
    }

    /// Producer side of the upload queue, for worker threads.
    pub fn upload_sender(&self) -> UploadSender {
        self.uploads.sender()
    }

    /// Run queued uploads now instead of at the start of the next frame.
    pub fn process_uploads(&mut self) -> usize {
        match self.state.as_mut() {
            Some(state) => self.uploads.drain(&mut state.registry, &mut self.device),
            None => 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

/// Rewrite the joint matrices of every skeleton the scene supplies a pose
/// for, once per skeleton.
fn upload_poses(
    registry: &mut GpuRegistry,
    device: &mut dyn GpuDevice,
    batches: &InstanceBatches,
    scene: &dyn SceneSource,
) {
    let mut seen = HashSet::new();
    for id in batches.all_skinned() {
        let Some(skeleton) = batches.get(*id).and_then(|instance| instance.skeleton.as_ref()) else {
            continue;
        };
        if !seen.insert(skeleton.id) {
            continue;
        }
        if let Some(pose) = scene.joint_matrices(skeleton.id) {
            registry.update_skeleton(device, skeleton.id, pose);
        }
    }
}
