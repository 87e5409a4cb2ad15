use crate::pipelines::{BindLayouts, TargetFormats, depth_state, mk_layout, mk_render_pipeline, triangles};

/// Vertices of the cube generated in the skybox vertex shader.
pub const SKYBOX_VERTICES: u32 = 36;

/// Faces wind counter-clockwise seen from outside; the camera sits inside, so
/// front faces are culled.
pub fn skybox_primitive() -> wgpu::PrimitiveState {
    triangles(Some(wgpu::Face::Front))
}

/**
 * The cube is generated from the vertex index and pushed to the far plane,
 * so it passes the depth test only where nothing opaque was drawn.
 */
pub fn mk_skybox_pipeline(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    formats: TargetFormats,
    module: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let layout = mk_layout(device, "Skybox Pipeline Layout", &[&layouts.frame, &layouts.skybox]);
    mk_render_pipeline(
        device,
        "Skybox Pipeline",
        &layout,
        module,
        ("vs_main", "fs_main"),
        Some((formats.hdr, Some(wgpu::BlendState::REPLACE))),
        Some(depth_state(formats.depth, false, wgpu::CompareFunction::LessEqual)),
        skybox_primitive(),
        &[],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skybox_culls_the_faces_turned_towards_the_outside() {
        let primitive = skybox_primitive();
        assert_eq!(primitive.front_face, wgpu::FrontFace::Ccw);
        assert_eq!(primitive.cull_mode, Some(wgpu::Face::Front));
    }
}
