use std::any::Any;

use crate::{
    batches::BatchKey,
    data_structures::{
        InstanceId,
        material::{ShaderKind, SurfaceKind},
    },
    gpu::{GpuDevice, PipelineKey},
    settings::RenderSettings,
    stages::{RenderStage, StageContext, StageKind, prepare_pipelines},
};

/// Draws the opaque batches, one draw per instance and submesh, grouped by
/// shader kind.
#[derive(Debug, Default)]
pub struct OpaqueStage {
    drawn: Vec<(BatchKey, InstanceId)>,
}

impl OpaqueStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances drawn last frame with the batch they were drawn from.
    pub fn drawn(&self) -> &[(BatchKey, InstanceId)] {
        &self.drawn
    }
}

impl RenderStage for OpaqueStage {
    fn kind(&self) -> StageKind {
        StageKind::Opaque
    }

    fn initialize(&mut self, device: &mut dyn GpuDevice, _settings: &RenderSettings) {
        prepare_pipelines(
            device,
            ShaderKind::ALL.into_iter().flat_map(|shader| {
                [false, true].map(|skinned| PipelineKey::Mesh {
                    shader,
                    skinned,
                    translucent: false,
                })
            }),
        );
    }

    fn render(&mut self, ctx: &mut StageContext<'_>) {
        self.drawn.clear();
        let batches = ctx.batches;
        for batch in batches.batches_for(SurfaceKind::Opaque) {
            if batch.is_empty() {
                continue;
            }
            let key = batch.key();
            ctx.bind(PipelineKey::Mesh {
                shader: key.shader,
                skinned: key.skinned,
                translucent: false,
            });
            for id in batch.instances() {
                if ctx.draw_instance(id) > 0 {
                    self.drawn.push((key, id));
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
