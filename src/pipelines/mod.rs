//! Render pipeline construction for every [`PipelineKey`].
//!
//! All colour pipelines share the frame bind group (camera, lights, shadow
//! block, arena, texture array and shadow maps) at group 0. Shadow depth
//! pipelines use a reduced group without the shadow maps they render into.

use crate::gpu::PipelineKey;

pub mod composite;
pub mod debug;
pub mod mesh;
pub mod particle;
pub mod shadow;
pub mod skybox;

/// The WGSL file a pipeline is built from. Modules are compiled once per
/// file and shared by every pipeline using it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderFile {
    Mesh,
    Shadow,
    Skybox,
    Particle,
    Debug,
    Composite,
}

impl ShaderFile {
    pub fn of(key: PipelineKey) -> Self {
        match key {
            PipelineKey::Mesh { .. } => ShaderFile::Mesh,
            PipelineKey::ShadowDepth { .. } => ShaderFile::Shadow,
            PipelineKey::Skybox => ShaderFile::Skybox,
            PipelineKey::Particle { .. } => ShaderFile::Particle,
            PipelineKey::DebugLines => ShaderFile::Debug,
            PipelineKey::Composite => ShaderFile::Composite,
        }
    }

    pub fn descriptor(self) -> wgpu::ShaderModuleDescriptor<'static> {
        let (label, source) = match self {
            ShaderFile::Mesh => ("Mesh Shader", include_str!("mesh.wgsl")),
            ShaderFile::Shadow => ("Shadow Shader", include_str!("shadow.wgsl")),
            ShaderFile::Skybox => ("Skybox Shader", include_str!("skybox.wgsl")),
            ShaderFile::Particle => ("Particle Shader", include_str!("particle.wgsl")),
            ShaderFile::Debug => ("Debug Line Shader", include_str!("debug.wgsl")),
            ShaderFile::Composite => ("Composite Shader", include_str!("composite.wgsl")),
        };
        wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        }
    }
}

/// Formats of the attachments pipelines are built against.
#[derive(Clone, Copy, Debug)]
pub struct TargetFormats {
    pub hdr: wgpu::TextureFormat,
    pub depth: wgpu::TextureFormat,
    pub output: wgpu::TextureFormat,
}

pub struct BindLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub depth: wgpu::BindGroupLayout,
    pub skybox: wgpu::BindGroupLayout,
    pub composite: wgpu::BindGroupLayout,
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        count: None,
    }
}

fn arena_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
    sample_type: wgpu::TextureSampleType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension,
            sample_type,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, ty: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    }
}

impl BindLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let filterable = wgpu::TextureSampleType::Float { filterable: true };
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_bind_group_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT, false),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT, false),
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT, false),
                arena_entry(3),
                texture_entry(4, wgpu::TextureViewDimension::D2Array, filterable),
                sampler_entry(5, wgpu::SamplerBindingType::Filtering),
                texture_entry(6, wgpu::TextureViewDimension::D2Array, wgpu::TextureSampleType::Depth),
                texture_entry(7, wgpu::TextureViewDimension::D2Array, wgpu::TextureSampleType::Depth),
                texture_entry(8, wgpu::TextureViewDimension::D2Array, wgpu::TextureSampleType::Depth),
                sampler_entry(9, wgpu::SamplerBindingType::Comparison),
            ],
        });
        let depth = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow_depth_bind_group_layout"),
            entries: &[arena_entry(0), uniform_entry(1, wgpu::ShaderStages::VERTEX, true)],
        });
        let skybox = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("skybox_bind_group_layout"),
            entries: &[
                texture_entry(0, wgpu::TextureViewDimension::Cube, filterable),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let composite = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite_bind_group_layout"),
            entries: &[
                texture_entry(0, wgpu::TextureViewDimension::D2, filterable),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT, false),
            ],
        });
        Self {
            frame,
            depth,
            skybox,
            composite,
        }
    }
}

/// Build the pipeline for `key` from an already compiled `module`.
pub fn mk_pipeline(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    formats: TargetFormats,
    key: PipelineKey,
    module: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    match key {
        PipelineKey::Mesh {
            shader,
            skinned,
            translucent,
        } => mesh::mk_mesh_pipeline(device, layouts, formats, module, shader, skinned, translucent),
        PipelineKey::ShadowDepth { skinned } => shadow::mk_shadow_pipeline(device, layouts, formats, module, skinned),
        PipelineKey::Skybox => skybox::mk_skybox_pipeline(device, layouts, formats, module),
        PipelineKey::Particle { blended } => particle::mk_particle_pipeline(device, layouts, formats, module, blended),
        PipelineKey::DebugLines => debug::mk_debug_pipeline(device, layouts, formats, module),
        PipelineKey::Composite => composite::mk_composite_pipeline(device, layouts, formats, module),
    }
}

pub fn depth_state(
    format: wgpu::TextureFormat,
    depth_write_enabled: bool,
    depth_compare: wgpu::CompareFunction,
) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: Some(depth_write_enabled),
        depth_compare: Some(depth_compare),
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

pub fn triangles(cull_mode: Option<wgpu::Face>) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode,
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

/// Shared pipeline builder. A `None` colour target builds a depth-only
/// pipeline without a fragment stage.
#[allow(clippy::too_many_arguments)]
pub fn mk_render_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry_points: (&str, &str),
    color_target: Option<(wgpu::TextureFormat, Option<wgpu::BlendState>)>,
    depth_stencil: Option<wgpu::DepthStencilState>,
    primitive: wgpu::PrimitiveState,
    vertex_layouts: &[wgpu::VertexBufferLayout],
) -> wgpu::RenderPipeline {
    let targets = color_target.map(|(format, blend)| {
        [Some(wgpu::ColorTargetState {
            format,
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        })]
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(entry_points.0),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: targets.as_ref().map(|targets| wgpu::FragmentState {
            module,
            entry_point: Some(entry_points.1),
            targets,
            compilation_options: Default::default(),
        }),
        primitive,
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}

pub fn mk_layout(device: &wgpu::Device, label: &str, groups: &[&wgpu::BindGroupLayout]) -> wgpu::PipelineLayout {
    let groups: Vec<Option<&wgpu::BindGroupLayout>> = groups.iter().copied().map(Some).collect();
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &groups,
        immediate_size: 0,
    })
}
