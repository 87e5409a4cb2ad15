use std::collections::{HashMap, HashSet};

use cgmath::{Deg, Matrix4, SquareMatrix};
use forge_render::{
    RenderError, RenderParams, RenderSettings, RenderSystem, RenderTarget, SceneSource,
    camera::{Camera, Projection},
    data_structures::{InstanceId, SkeletonId, light::Light, particle::Particle},
    gpu::{
        BufferDesc, BufferHandle, GpuDevice, PipelineKey, SharedBindings, TextureDesc, TextureHandle,
        TextureKind, UniformBlock,
    },
    render::{FrameCommands, Pass},
};

/// One call made on a [`RecordingDevice`].
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    CreateBuffer {
        handle: BufferHandle,
        label: String,
        size: u64,
    },
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
    ClearBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    DestroyBuffer(BufferHandle),
    CreateTexture {
        handle: TextureHandle,
        label: String,
        size: u32,
        kind: TextureKind,
    },
    WriteTextureLayer {
        texture: TextureHandle,
        layer: u32,
    },
    ClearTextureLayer {
        texture: TextureHandle,
        layer: u32,
    },
    DestroyTexture(TextureHandle),
    BindSkybox(Option<TextureHandle>),
    PreparePipeline(PipelineKey),
}

/// A frame as the device received it.
#[derive(Clone, Debug)]
pub struct ExecutedFrame {
    pub target: RenderTarget,
    pub passes: Vec<Pass>,
    pub instance_count: usize,
}

/// A [`GpuDevice`] that keeps buffer contents in memory and records every
/// call, for tests that run without a GPU.
#[derive(Default)]
pub struct RecordingDevice {
    pub calls: Vec<DeviceCall>,
    pub buffers: HashMap<BufferHandle, Vec<u8>>,
    pub textures: HashMap<TextureHandle, TextureKind>,
    pub layers: HashMap<(TextureHandle, u32), Vec<u8>>,
    pub uniforms: HashMap<UniformBlock, Vec<u8>>,
    pub shared: Option<SharedBindings>,
    pub pipelines: HashSet<PipelineKey>,
    pub failing: HashSet<PipelineKey>,
    pub frames: Vec<ExecutedFrame>,
    next_buffer: u32,
    next_texture: u32,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `prepare_pipeline` fail for `key`.
    pub fn failing(mut self, key: PipelineKey) -> Self {
        self.failing.insert(key);
        self
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn last_frame(&self) -> Option<&ExecutedFrame> {
        self.frames.last()
    }

    pub fn count(&self, f: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| f(call)).count()
    }
}

impl GpuDevice for RecordingDevice {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> BufferHandle {
        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(handle, vec![0; desc.size as usize]);
        self.calls.push(DeviceCall::CreateBuffer {
            handle,
            label: desc.label.to_string(),
            size: desc.size,
        });
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let contents = self
            .buffers
            .get_mut(&buffer)
            .expect("write to a destroyed buffer");
        let start = offset as usize;
        assert!(start + data.len() <= contents.len(), "write past the end of a buffer");
        contents[start..start + data.len()].copy_from_slice(data);
        self.calls.push(DeviceCall::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn clear_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) {
        let contents = self
            .buffers
            .get_mut(&buffer)
            .expect("clear of a destroyed buffer");
        let start = offset as usize;
        let end = (start + size as usize).min(contents.len());
        contents[start..end].fill(0);
        self.calls
            .push(DeviceCall::ClearBuffer { buffer, offset, size });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.calls.push(DeviceCall::DestroyBuffer(buffer));
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureHandle {
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(handle, desc.kind);
        self.calls.push(DeviceCall::CreateTexture {
            handle,
            label: desc.label.to_string(),
            size: desc.size,
            kind: desc.kind,
        });
        handle
    }

    fn write_texture_layer(&mut self, texture: TextureHandle, layer: u32, size: u32, pixels: &[u8]) {
        assert_eq!(pixels.len(), (size * size * 4) as usize, "layer upload has the wrong size");
        self.layers.insert((texture, layer), pixels.to_vec());
        self.calls
            .push(DeviceCall::WriteTextureLayer { texture, layer });
    }

    fn clear_texture_layer(&mut self, texture: TextureHandle, layer: u32) {
        self.layers.remove(&(texture, layer));
        self.calls
            .push(DeviceCall::ClearTextureLayer { texture, layer });
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.calls.push(DeviceCall::DestroyTexture(texture));
    }

    fn write_uniform(&mut self, block: UniformBlock, data: &[u8]) {
        self.uniforms.insert(block, data.to_vec());
    }

    fn bind_shared(&mut self, shared: &SharedBindings) {
        self.shared = Some(*shared);
    }

    fn bind_skybox(&mut self, cubemap: Option<TextureHandle>) {
        self.calls.push(DeviceCall::BindSkybox(cubemap));
    }

    fn prepare_pipeline(&mut self, key: PipelineKey) -> Result<(), RenderError> {
        self.calls.push(DeviceCall::PreparePipeline(key));
        if self.failing.contains(&key) {
            return Err(RenderError::ShaderLink {
                pipeline: key.label(),
                diagnostic: "entry point not found".to_string(),
            });
        }
        self.pipelines.insert(key);
        Ok(())
    }

    fn validate_target(&mut self, target: &RenderTarget) -> Result<(), RenderError> {
        match target {
            RenderTarget::Surface => Ok(()),
            RenderTarget::Texture(handle) => match self.textures.get(handle) {
                Some(TextureKind::Target { .. }) => Ok(()),
                _ => Err(RenderError::IncompleteTarget(format!(
                    "texture {} is not a render target",
                    handle.0
                ))),
            },
        }
    }

    fn execute(&mut self, frame: &FrameCommands, target: &RenderTarget) -> Result<(), RenderError> {
        self.frames.push(ExecutedFrame {
            target: *target,
            passes: frame.passes.clone(),
            instance_count: frame.instances.len(),
        });
        Ok(())
    }
}

/// A scene answering from plain maps. Unknown instances sit at the origin
/// and are active.
#[derive(Default)]
pub struct TestScene {
    pub transforms: HashMap<InstanceId, Matrix4<f32>>,
    pub inactive: HashSet<InstanceId>,
    pub lights: Vec<Light>,
    pub particles: HashMap<InstanceId, Vec<Particle>>,
    pub poses: HashMap<SkeletonId, Vec<Matrix4<f32>>>,
}

impl TestScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(&mut self, id: InstanceId, x: f32, y: f32, z: f32) {
        self.transforms
            .insert(id, Matrix4::from_translation(cgmath::Vector3::new(x, y, z)));
    }
}

impl SceneSource for TestScene {
    fn world_transform(&self, id: InstanceId) -> Matrix4<f32> {
        self.transforms
            .get(&id)
            .copied()
            .unwrap_or_else(Matrix4::identity)
    }

    fn is_active(&self, id: InstanceId) -> bool {
        !self.inactive.contains(&id)
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }

    fn particles(&self, id: InstanceId) -> &[Particle] {
        self.particles.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn joint_matrices(&self, id: SkeletonId) -> Option<&[Matrix4<f32>]> {
        self.poses.get(&id).map(Vec::as_slice)
    }
}

/// Capacities small enough to exhaust in a test.
pub fn small_settings() -> RenderSettings {
    RenderSettings {
        arena_capacity: 64 * 1024,
        texture_slots: 4,
        texture_slot_size: 4,
        shadow_map_size: 64,
        point_shadow_map_size: 32,
        max_particles: 64,
        ..RenderSettings::default()
    }
}

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn initialized_system(settings: RenderSettings) -> RenderSystem<RecordingDevice> {
    init_logs();
    let mut system = RenderSystem::new(RecordingDevice::new(), settings);
    system.initialize();
    system
}

/// A camera at `(0, 0, 10)` looking down -Z.
pub fn camera() -> (Camera, Projection) {
    (
        Camera::new((0.0, 0.0, 10.0), Deg(-90.0), Deg(0.0)),
        Projection::new(800, 600, Deg(45.0), 0.1, 100.0),
    )
}

pub fn render_frame(system: &mut RenderSystem<RecordingDevice>, scene: &TestScene) {
    let (camera, projection) = camera();
    system.render(
        scene,
        &RenderParams {
            target: RenderTarget::Surface,
            camera: &camera,
            projection: &projection,
        },
    );
}
