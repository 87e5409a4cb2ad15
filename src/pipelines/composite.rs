use crate::pipelines::{BindLayouts, TargetFormats, mk_layout, mk_render_pipeline, triangles};

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompositeUniform {
    // x: exposure
    pub params: [f32; 4],
}

/// Fullscreen triangle tone mapping the HDR capture into the output format.
pub fn mk_composite_pipeline(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    formats: TargetFormats,
    module: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let layout = mk_layout(device, "Composite Pipeline Layout", &[&layouts.composite]);
    mk_render_pipeline(
        device,
        "Composite Pipeline",
        &layout,
        module,
        ("vs_main", "fs_main"),
        Some((formats.output, Some(wgpu::BlendState::REPLACE))),
        None,
        triangles(None),
        &[],
    )
}
