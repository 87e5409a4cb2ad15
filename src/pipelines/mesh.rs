use crate::{
    data_structures::{
        instance::InstanceRaw,
        material::ShaderKind,
        model::{ModelVertex, SkinnedVertex, Vertex},
    },
    pipelines::{BindLayouts, TargetFormats, depth_state, mk_layout, mk_render_pipeline, triangles},
};

pub fn fragment_entry(shader: ShaderKind) -> &'static str {
    match shader {
        ShaderKind::Unlit => "fs_unlit",
        ShaderKind::Lit => "fs_lit",
        ShaderKind::Pbr => "fs_pbr",
    }
}

/**
 * Opaque meshes replace and write depth; translucent meshes blend over
 * whatever is already in the capture and only test depth.
 */
pub fn mk_mesh_pipeline(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    formats: TargetFormats,
    module: &wgpu::ShaderModule,
    shader: ShaderKind,
    skinned: bool,
    translucent: bool,
) -> wgpu::RenderPipeline {
    let layout = mk_layout(device, "Mesh Pipeline Layout", &[&layouts.frame]);
    let (blend, cull_mode) = if translucent {
        (Some(wgpu::BlendState::ALPHA_BLENDING), None)
    } else {
        (Some(wgpu::BlendState::REPLACE), Some(wgpu::Face::Back))
    };
    let vertex = if skinned {
        ("vs_skinned", SkinnedVertex::desc())
    } else {
        ("vs_main", ModelVertex::desc())
    };
    let label = crate::gpu::PipelineKey::Mesh {
        shader,
        skinned,
        translucent,
    }
    .label();
    mk_render_pipeline(
        device,
        &label,
        &layout,
        module,
        (vertex.0, fragment_entry(shader)),
        Some((formats.hdr, blend)),
        Some(depth_state(formats.depth, !translucent, wgpu::CompareFunction::Less)),
        triangles(cull_mode),
        &[vertex.1, InstanceRaw::desc()],
    )
}
