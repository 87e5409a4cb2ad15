//! [`GpuDevice`] over a wgpu [`Context`].
//!
//! Handles index into tables of live wgpu objects. Pipelines are built on
//! demand from [`PipelineKey`]s and cached; a key whose shader fails to
//! compile is remembered and its draws are skipped. Frames are encoded into
//! a single command buffer: shadow depth passes, the HDR colour capture and
//! the composite into the requested target.

use std::{
    collections::{HashMap, HashSet},
    mem,
    time::Duration,
};

use anyhow::Context as _;

use crate::{
    context::{Context, DEPTH_FORMAT, HDR_FORMAT},
    data_structures::{instance::InstanceRaw, particle::ParticleRaw},
    error::RenderError,
    gpu::{
        BufferDesc, BufferHandle, GpuDevice, PipelineKey, RenderTarget, SharedBindings, TextureDesc, TextureHandle,
        TextureKind, UniformBlock,
    },
    pipelines::{
        BindLayouts, ShaderFile, TargetFormats,
        composite::CompositeUniform,
        mk_pipeline,
        shadow::SHADOW_VIEW_STRIDE,
        skybox::SKYBOX_VERTICES,
    },
    render::{DrawCommand, FrameCommands, Pass, PassKind},
};

/// Format of texture array layers and skybox faces.
pub const COLOUR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

struct GpuTexture {
    texture: wgpu::Texture,
    /// The view bound for sampling: a 2D array, a cube or a plain 2D view.
    view: wgpu::TextureView,
    /// One 2D view per layer for depth targets.
    layer_views: Vec<wgpu::TextureView>,
    kind: TextureKind,
    size: u32,
}

struct FrameUniforms {
    camera: wgpu::Buffer,
    lights: wgpu::Buffer,
    shadows: wgpu::Buffer,
    composite: wgpu::Buffer,
}

/// Off-screen HDR colour and depth attachments sized to the last target.
struct Capture {
    width: u32,
    height: u32,
    hdr_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

pub struct WgpuDevice {
    context: Context,
    layouts: BindLayouts,
    formats: TargetFormats,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    textures: HashMap<TextureHandle, GpuTexture>,
    next_buffer: u32,
    next_texture: u32,
    shaders: HashMap<ShaderFile, wgpu::ShaderModule>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    failed: HashSet<PipelineKey>,
    uniforms: FrameUniforms,
    linear_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    instance_buffer: wgpu::Buffer,
    shadow_view_buffer: wgpu::Buffer,
    shared: Option<SharedBindings>,
    frame_bind_group: Option<wgpu::BindGroup>,
    depth_bind_group: Option<wgpu::BindGroup>,
    skybox_bind_group: Option<wgpu::BindGroup>,
    capture: Option<Capture>,
}

fn uniform_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn vertex_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl WgpuDevice {
    pub fn new(context: Context) -> Self {
        let device = &context.device;
        let layouts = BindLayouts::new(device);
        let formats = TargetFormats {
            hdr: HDR_FORMAT,
            depth: DEPTH_FORMAT,
            output: context.config.format,
        };
        let uniforms = FrameUniforms {
            camera: uniform_buffer(device, "Camera Buffer", mem::size_of::<crate::camera::CameraUniform>() as u64),
            lights: uniform_buffer(
                device,
                "Lights Buffer",
                mem::size_of::<crate::data_structures::light::LightsUniform>() as u64,
            ),
            shadows: uniform_buffer(device, "Shadow Buffer", mem::size_of::<crate::shadow::ShadowUniform>() as u64),
            composite: uniform_buffer(device, "Composite Buffer", mem::size_of::<CompositeUniform>() as u64),
        };
        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let instance_buffer = vertex_buffer(device, "Instance Buffer", 64 * mem::size_of::<InstanceRaw>() as u64);
        let shadow_view_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow View Buffer"),
            size: 16 * SHADOW_VIEW_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            context,
            layouts,
            formats,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            next_buffer: 0,
            next_texture: 0,
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            failed: HashSet::new(),
            uniforms,
            linear_sampler,
            shadow_sampler,
            instance_buffer,
            shadow_view_buffer,
            shared: None,
            frame_bind_group: None,
            depth_bind_group: None,
            skybox_bind_group: None,
            capture: None,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Whether `key` was built. Failed keys stay unbuilt.
    pub fn pipeline_ready(&self, key: PipelineKey) -> bool {
        self.pipelines.contains_key(&key) && !self.failed.contains(&key)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
    }

    /// Copy a texture target back to the CPU. Blocks until the GPU is done.
    pub fn read_target(&self, target: TextureHandle) -> anyhow::Result<image::RgbaImage> {
        let entry = self
            .textures
            .get(&target)
            .context("reading back an unknown texture")?;
        let TextureKind::Target { width, height } = entry.kind else {
            anyhow::bail!("texture {} is not a render target", target.0);
        };
        let unpadded = 4 * width;
        let padded = unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let output = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = futures::channel::oneshot::channel();
        let slice = output.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .context("waiting for the readback")?;
        futures::executor::block_on(rx)
            .context("readback callback dropped")?
            .context("mapping the readback buffer")?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        output.unmap();
        image::RgbaImage::from_raw(width, height, pixels).context("readback size mismatch")
    }

    fn texture_desc(&self, desc: &TextureDesc<'_>) -> wgpu::TextureDescriptor<'static> {
        let (width, height, format, usage) = match desc.kind {
            TextureKind::ColourArray { .. } | TextureKind::Cube => (
                desc.size,
                desc.size,
                COLOUR_FORMAT,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ),
            TextureKind::DepthArray { .. } | TextureKind::DepthCubeArray { .. } => (
                desc.size,
                desc.size,
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            ),
            TextureKind::Target { width, height } => (
                width,
                height,
                self.formats.output,
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::TEXTURE_BINDING,
            ),
        };
        wgpu::TextureDescriptor {
            label: None,
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: desc.kind.layer_count(),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        }
    }

    fn view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(&texture).map(|entry| &entry.view)
    }

    fn rebuild_bind_groups(&mut self) {
        let Some(shared) = self.shared else {
            return;
        };
        let device = &self.context.device;
        let textures = &self.textures;
        let view = |handle: TextureHandle| textures.get(&handle).map(|entry| &entry.view);
        let (Some(arena), Some(albedo), Some(directional), Some(spot), Some(point)) = (
            self.buffers.get(&shared.arena),
            view(shared.texture_array),
            view(shared.directional_shadows),
            view(shared.spot_shadows),
            view(shared.point_shadows),
        ) else {
            log::error!("Shared bindings reference resources that do not exist.");
            self.frame_bind_group = None;
            self.depth_bind_group = None;
            return;
        };
        self.frame_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout: &self.layouts.frame,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.uniforms.lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniforms.shadows.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: arena.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(albedo),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(directional),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::TextureView(spot),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureView(point),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
                },
            ],
        }));
        self.depth_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_depth_bind_group"),
            layout: &self.layouts.depth,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: arena.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.shadow_view_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(mem::size_of::<[[f32; 4]; 4]>() as u64),
                    }),
                },
            ],
        }));
    }

    fn ensure_capture(&mut self, width: u32, height: u32) {
        if self
            .capture
            .as_ref()
            .is_some_and(|capture| capture.width == width && capture.height == height)
        {
            return;
        }
        let device = &self.context.device;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let attachment = |label: &str, format: wgpu::TextureFormat| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        let hdr_view = attachment("HDR Capture", HDR_FORMAT);
        let depth_view = attachment("Depth Capture", DEPTH_FORMAT);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite_bind_group"),
            layout: &self.layouts.composite,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&hdr_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniforms.composite.as_entire_binding(),
                },
            ],
        });
        self.capture = Some(Capture {
            width,
            height,
            hdr_view,
            depth_view,
            bind_group,
        });
    }

    /// Grow the per-frame buffers to fit `frame` and upload its data.
    fn upload_frame(&mut self, frame: &FrameCommands) {
        let device = &self.context.device;
        let instance_bytes = mem::size_of_val(frame.instances.as_slice()) as u64;
        if instance_bytes > self.instance_buffer.size() {
            self.instance_buffer.destroy();
            self.instance_buffer = vertex_buffer(device, "Instance Buffer", instance_bytes.next_power_of_two());
        }
        if instance_bytes > 0 {
            self.context
                .queue
                .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&frame.instances));
        }

        let view_bytes = frame.shadow_views.len() as u64 * SHADOW_VIEW_STRIDE;
        if view_bytes > self.shadow_view_buffer.size() {
            self.shadow_view_buffer.destroy();
            self.shadow_view_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Shadow View Buffer"),
                size: view_bytes.next_power_of_two(),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.rebuild_bind_groups();
        }
        for (i, view) in frame.shadow_views.iter().enumerate() {
            self.context.queue.write_buffer(
                &self.shadow_view_buffer,
                i as u64 * SHADOW_VIEW_STRIDE,
                bytemuck::bytes_of(view),
            );
        }

        for pass in &frame.passes {
            if let PassKind::Composite { exposure } = pass.kind {
                let uniform = CompositeUniform {
                    params: [exposure, 0.0, 0.0, 0.0],
                };
                self.context
                    .queue
                    .write_buffer(&self.uniforms.composite, 0, bytemuck::bytes_of(&uniform));
            }
        }
    }

    fn target_size(&self, target: &RenderTarget) -> Option<(u32, u32)> {
        match target {
            RenderTarget::Surface => Some(self.context.size()),
            RenderTarget::Texture(handle) => match self.textures.get(handle)?.kind {
                TextureKind::Target { width, height } => Some((width, height)),
                _ => None,
            },
        }
    }

    fn record_commands(&self, rpass: &mut wgpu::RenderPass<'_>, pass: &Pass) {
        let mut usable = false;
        for command in &pass.commands {
            match command {
                DrawCommand::BindPipeline(key) => match self.pipelines.get(key) {
                    Some(pipeline) => {
                        rpass.set_pipeline(pipeline);
                        usable = true;
                        if *key == PipelineKey::Skybox {
                            match &self.skybox_bind_group {
                                Some(group) => rpass.set_bind_group(1, group, &[]),
                                None => usable = false,
                            }
                        }
                    }
                    None => usable = false,
                },
                _ if !usable => {}
                DrawCommand::Mesh(draw) if draw.vertices.byte_size == 0 || draw.index_count == 0 => {}
                DrawCommand::Mesh(draw) => {
                    let (Some(arena), Some(indices)) = (
                        self.shared.and_then(|shared| self.buffers.get(&shared.arena)),
                        self.buffers.get(&draw.index_buffer),
                    ) else {
                        continue;
                    };
                    let row = draw.instance as u64 * mem::size_of::<InstanceRaw>() as u64;
                    rpass.set_vertex_buffer(0, arena.slice(draw.vertices.byte_offset..draw.vertices.end()));
                    rpass.set_vertex_buffer(1, self.instance_buffer.slice(row..));
                    rpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    rpass.draw_indexed(0..draw.index_count, 0, 0..1);
                }
                DrawCommand::Skybox { .. } => {
                    rpass.draw(0..SKYBOX_VERTICES, 0..1);
                }
                DrawCommand::Lines { buffer, vertex_count } => {
                    if let Some(buffer) = self.buffers.get(buffer) {
                        rpass.set_vertex_buffer(0, buffer.slice(..));
                        rpass.draw(0..*vertex_count, 0..1);
                    }
                }
                DrawCommand::MultiDrawIndirect {
                    instances,
                    indirect,
                    args,
                } => {
                    let (Some(instances), Some(indirect)) = (self.buffers.get(instances), self.buffers.get(indirect))
                    else {
                        continue;
                    };
                    if self
                        .context
                        .features
                        .contains(wgpu::Features::INDIRECT_FIRST_INSTANCE)
                    {
                        rpass.set_vertex_buffer(0, instances.slice(..));
                        rpass.multi_draw_indirect(indirect, 0, args.len() as u32);
                    } else {
                        let stride = mem::size_of::<ParticleRaw>() as u64;
                        for arg in args {
                            rpass.set_vertex_buffer(0, instances.slice(arg.first_instance as u64 * stride..));
                            rpass.draw(
                                arg.first_vertex..arg.first_vertex + arg.vertex_count,
                                0..arg.instance_count,
                            );
                        }
                    }
                }
            }
        }
    }
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> BufferHandle {
        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT).max(4),
            usage: desc.usage,
            mapped_at_creation: false,
        });
        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(handle, buffer);
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(target) = self.buffers.get(&buffer) else {
            log::warn!("Write to unknown buffer {}.", buffer.0);
            return;
        };
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.context.queue.write_buffer(target, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
            self.context.queue.write_buffer(target, offset, &padded);
        }
    }

    fn clear_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) {
        if size == 0 {
            return;
        }
        let zeros = vec![0u8; size as usize];
        self.write_buffer(buffer, offset, &zeros);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureHandle {
        let mut descriptor = self.texture_desc(desc);
        descriptor.label = Some(desc.label);
        let texture = self.context.device.create_texture(&descriptor);
        let dimension = match desc.kind {
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
            TextureKind::Target { .. } => wgpu::TextureViewDimension::D2,
            _ => wgpu::TextureViewDimension::D2Array,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        });
        let layer_views = match desc.kind {
            TextureKind::DepthArray { .. } | TextureKind::DepthCubeArray { .. } => (0..desc.kind.layer_count())
                .map(|layer| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some("Shadow Layer View"),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
                .collect(),
            _ => Vec::new(),
        };
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                layer_views,
                kind: desc.kind,
                size: desc.size,
            },
        );
        handle
    }

    fn write_texture_layer(&mut self, texture: TextureHandle, layer: u32, size: u32, pixels: &[u8]) {
        let Some(entry) = self.textures.get(&texture) else {
            log::warn!("Write to unknown texture {}.", texture.0);
            return;
        };
        if size != entry.size || pixels.len() != (4 * size * size) as usize {
            log::warn!(
                "Texture layer write of {} bytes does not match {}x{} RGBA layers.",
                pixels.len(),
                entry.size,
                entry.size
            );
            return;
        }
        self.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
    }

    fn clear_texture_layer(&mut self, texture: TextureHandle, layer: u32) {
        let Some(size) = self
            .textures
            .get(&texture)
            .filter(|entry| matches!(entry.kind, TextureKind::ColourArray { .. } | TextureKind::Cube))
            .map(|entry| entry.size)
        else {
            return;
        };
        let zeros = vec![0u8; (4 * size * size) as usize];
        self.write_texture_layer(texture, layer, size, &zeros);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry.texture.destroy();
        }
    }

    fn write_uniform(&mut self, block: UniformBlock, data: &[u8]) {
        let buffer = match block {
            UniformBlock::Camera => &self.uniforms.camera,
            UniformBlock::Lights => &self.uniforms.lights,
            UniformBlock::Shadows => &self.uniforms.shadows,
        };
        self.context.queue.write_buffer(buffer, 0, data);
    }

    fn bind_shared(&mut self, shared: &SharedBindings) {
        self.shared = Some(*shared);
        self.rebuild_bind_groups();
    }

    fn bind_skybox(&mut self, cubemap: Option<TextureHandle>) {
        self.skybox_bind_group = cubemap.and_then(|cubemap| {
            let view = self.view(cubemap)?;
            Some(self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("skybox_bind_group"),
                layout: &self.layouts.skybox,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
                    },
                ],
            }))
        });
    }

    fn prepare_pipeline(&mut self, key: PipelineKey) -> Result<(), RenderError> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let link_error = |diagnostic: String| RenderError::ShaderLink {
            pipeline: key.label(),
            diagnostic,
        };
        if self.failed.contains(&key) {
            return Err(link_error("previous build failed".to_string()));
        }
        let file = ShaderFile::of(key);
        let device = &self.context.device;
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = match self.shaders.get(&file) {
            Some(module) => module.clone(),
            None => {
                let module = device.create_shader_module(file.descriptor());
                let info = futures::executor::block_on(module.get_compilation_info());
                let errors: Vec<String> = info
                    .messages
                    .iter()
                    .filter(|message| matches!(message.message_type, wgpu::CompilationMessageType::Error))
                    .map(|message| message.message.clone())
                    .collect();
                if !errors.is_empty() {
                    drop(scope);
                    self.failed.insert(key);
                    return Err(link_error(errors.join("\n")));
                }
                module
            }
        };
        let pipeline = mk_pipeline(device, &self.layouts, self.formats, key, &module);
        if let Some(error) = futures::executor::block_on(scope.pop()) {
            self.failed.insert(key);
            return Err(link_error(error.to_string()));
        }
        self.shaders.entry(file).or_insert(module);
        log::debug!("Built {}", key.label());
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    fn validate_target(&mut self, target: &RenderTarget) -> Result<(), RenderError> {
        match target {
            RenderTarget::Surface if self.context.surface.is_none() => Err(RenderError::IncompleteTarget(
                "no surface on a headless context".to_string(),
            )),
            RenderTarget::Surface => Ok(()),
            RenderTarget::Texture(handle) => match self.textures.get(handle).map(|entry| entry.kind) {
                Some(TextureKind::Target { width, height }) if width > 0 && height > 0 => Ok(()),
                Some(kind) => Err(RenderError::IncompleteTarget(format!(
                    "texture {} is a {kind:?}, not a colour target",
                    handle.0
                ))),
                None => Err(RenderError::IncompleteTarget(format!("texture {} does not exist", handle.0))),
            },
        }
    }

    fn execute(&mut self, frame: &FrameCommands, target: &RenderTarget) -> Result<(), RenderError> {
        let (width, height) = self
            .target_size(target)
            .ok_or_else(|| RenderError::IncompleteTarget(format!("{target:?} cannot be rendered to")))?;
        self.ensure_capture(width.max(1), height.max(1));
        self.upload_frame(frame);

        let surface_texture = match target {
            RenderTarget::Surface => {
                let surface = self
                    .context
                    .surface
                    .as_ref()
                    .ok_or_else(|| RenderError::IncompleteTarget("no surface".to_string()))?;
                match surface.get_current_texture() {
                    wgpu::CurrentSurfaceTexture::Success(output)
                    | wgpu::CurrentSurfaceTexture::Suboptimal(output) => Some(output),
                    e @ (wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated) => {
                        surface.configure(&self.context.device, &self.context.config);
                        return Err(RenderError::SurfaceLost(format!("{e:?}")));
                    }
                    e => return Err(RenderError::SurfaceLost(format!("{e:?}"))),
                }
            }
            RenderTarget::Texture(_) => None,
        };
        let surface_view = surface_texture
            .as_ref()
            .map(|output| output.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        let output_view = match (target, &surface_view) {
            (RenderTarget::Surface, Some(view)) => view,
            (RenderTarget::Texture(handle), _) => self
                .view(*handle)
                .ok_or_else(|| RenderError::IncompleteTarget(format!("texture {} does not exist", handle.0)))?,
            _ => return Err(RenderError::IncompleteTarget("no surface texture".to_string())),
        };
        let (Some(capture), Some(frame_group)) = (&self.capture, &self.frame_bind_group) else {
            return Err(RenderError::IncompleteTarget("shared bindings are not bound".to_string()));
        };

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        for pass in &frame.passes {
            match pass.kind {
                PassKind::ShadowDepth {
                    target: map,
                    layer,
                    view,
                } => {
                    let (Some(attachment), Some(depth_group)) = (
                        self.textures
                            .get(&map)
                            .and_then(|entry| entry.layer_views.get(layer as usize)),
                        &self.depth_bind_group,
                    ) else {
                        log::warn!("Skipping shadow pass '{}' without a depth layer.", pass.label);
                        continue;
                    };
                    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(&pass.label),
                        color_attachments: &[],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view: attachment,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(1.0),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    rpass.set_bind_group(0, depth_group, &[(view as u64 * SHADOW_VIEW_STRIDE) as u32]);
                    self.record_commands(&mut rpass, pass);
                }
                PassKind::Colour { clear } => {
                    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(&pass.label),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &capture.hdr_view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(clear),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view: &capture.depth_view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(1.0),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    rpass.set_bind_group(0, frame_group, &[]);
                    self.record_commands(&mut rpass, pass);
                }
                PassKind::Composite { .. } => {
                    let Some(pipeline) = self.pipelines.get(&PipelineKey::Composite) else {
                        log::warn!("Composite pipeline missing, the target is left undefined.");
                        continue;
                    };
                    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(&pass.label),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: output_view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    rpass.set_pipeline(pipeline);
                    rpass.set_bind_group(0, &capture.bind_group, &[]);
                    rpass.draw(0..3, 0..1);
                }
            }
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        if let Some(output) = surface_texture {
            output.present();
        }
        Ok(())
    }
}
