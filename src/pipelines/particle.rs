use crate::{
    data_structures::{model::Vertex, particle::ParticleRaw},
    pipelines::{BindLayouts, TargetFormats, depth_state, mk_layout, mk_render_pipeline, triangles},
};

pub fn mk_particle_pipeline(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    formats: TargetFormats,
    module: &wgpu::ShaderModule,
    blended: bool,
) -> wgpu::RenderPipeline {
    let layout = mk_layout(device, "Particle Pipeline Layout", &[&layouts.frame]);
    let (label, blend) = if blended {
        ("Blended Particle Pipeline", wgpu::BlendState::ALPHA_BLENDING)
    } else {
        ("Opaque Particle Pipeline", wgpu::BlendState::REPLACE)
    };
    mk_render_pipeline(
        device,
        label,
        &layout,
        module,
        ("vs_main", if blended { "fs_blended" } else { "fs_opaque" }),
        Some((formats.hdr, Some(blend))),
        Some(depth_state(formats.depth, !blended, wgpu::CompareFunction::Less)),
        triangles(None),
        &[ParticleRaw::desc()],
    )
}
