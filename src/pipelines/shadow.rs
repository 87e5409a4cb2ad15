use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{ModelVertex, SkinnedVertex, Vertex},
    },
    pipelines::{BindLayouts, TargetFormats, mk_layout, mk_render_pipeline, triangles},
};

/// Byte stride between light views in the shadow view buffer. Dynamic
/// uniform offsets must be multiples of 256.
pub const SHADOW_VIEW_STRIDE: u64 = 256;

/// Depth-only pipeline drawing casters from one light's point of view.
pub fn mk_shadow_pipeline(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    formats: TargetFormats,
    module: &wgpu::ShaderModule,
    skinned: bool,
) -> wgpu::RenderPipeline {
    let layout = mk_layout(device, "Shadow Pipeline Layout", &[&layouts.depth]);
    let vertex = if skinned {
        ("vs_skinned", SkinnedVertex::desc())
    } else {
        ("vs_main", ModelVertex::desc())
    };
    let label = crate::gpu::PipelineKey::ShadowDepth { skinned }.label();
    mk_render_pipeline(
        device,
        &label,
        &layout,
        module,
        (vertex.0, ""),
        None,
        Some(wgpu::DepthStencilState {
            format: formats.depth,
            depth_write_enabled: Some(true),
            depth_compare: Some(wgpu::CompareFunction::LessEqual),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        }),
        triangles(None),
        &[vertex.1, InstanceRaw::desc()],
    )
}
