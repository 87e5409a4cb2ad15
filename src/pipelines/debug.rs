use crate::{
    data_structures::model::Vertex,
    pipelines::{BindLayouts, TargetFormats, depth_state, mk_layout, mk_render_pipeline},
    stages::debug::LineVertex,
};

pub fn mk_debug_pipeline(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    formats: TargetFormats,
    module: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let layout = mk_layout(device, "Debug Line Pipeline Layout", &[&layouts.frame]);
    mk_render_pipeline(
        device,
        "Debug Line Pipeline",
        &layout,
        module,
        ("vs_main", "fs_main"),
        Some((formats.hdr, Some(wgpu::BlendState::ALPHA_BLENDING))),
        Some(depth_state(formats.depth, false, wgpu::CompareFunction::LessEqual)),
        wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::LineList,
            ..Default::default()
        },
        &[LineVertex::desc()],
    )
}
