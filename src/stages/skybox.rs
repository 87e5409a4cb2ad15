use std::any::Any;

use crate::{
    gpu::{GpuDevice, PipelineKey},
    render::DrawCommand,
    settings::RenderSettings,
    stages::{RenderStage, StageContext, StageKind, prepare_pipelines},
};

/// Draws the attached skybox cubemap behind all opaque geometry.
///
/// The pipeline tests depth with less-or-equal without writing it and culls
/// front faces, since the camera sits inside the cube; the vertex shader uses
/// the camera's rotation-only view and writes depth 1.
#[derive(Debug, Default)]
pub struct SkyboxStage {
    drawn: bool,
}

impl SkyboxStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a skybox was drawn last frame.
    pub fn drawn(&self) -> bool {
        self.drawn
    }
}

impl RenderStage for SkyboxStage {
    fn kind(&self) -> StageKind {
        StageKind::Skybox
    }

    fn initialize(&mut self, device: &mut dyn GpuDevice, _settings: &RenderSettings) {
        prepare_pipelines(device, [PipelineKey::Skybox]);
    }

    fn render(&mut self, ctx: &mut StageContext<'_>) {
        self.drawn = false;
        let Some(cubemap) = ctx.skybox else {
            return;
        };
        ctx.bind(PipelineKey::Skybox);
        ctx.frame.push(DrawCommand::Skybox { cubemap });
        self.drawn = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
