use std::any::Any;

use crate::{
    data_structures::{
        InstanceId,
        instance::matrix_origin,
        material::{ShaderKind, SurfaceKind},
    },
    gpu::{GpuDevice, PipelineKey},
    settings::RenderSettings,
    stages::{RenderStage, StageContext, StageKind, prepare_pipelines},
};

/// Sort by squared distance, farthest first. The sort is stable so equal
/// distances keep their input order.
pub fn sort_back_to_front<T>(items: &mut [(T, f32)]) {
    items.sort_by(|a, b| b.1.total_cmp(&a.1));
}

/// Draws translucent instances back to front, one instance at a time.
#[derive(Debug, Default)]
pub struct TransparentStage {
    sorted: Vec<(InstanceId, f32)>,
}

impl TransparentStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last frame's draw order with each instance's squared camera distance.
    pub fn sorted(&self) -> &[(InstanceId, f32)] {
        &self.sorted
    }
}

impl RenderStage for TransparentStage {
    fn kind(&self) -> StageKind {
        StageKind::Transparent
    }

    fn initialize(&mut self, device: &mut dyn GpuDevice, _settings: &RenderSettings) {
        prepare_pipelines(
            device,
            ShaderKind::ALL.into_iter().flat_map(|shader| {
                [false, true].map(|skinned| PipelineKey::Mesh {
                    shader,
                    skinned,
                    translucent: true,
                })
            }),
        );
    }

    fn pre_render(&mut self, ctx: &mut StageContext<'_>) {
        self.sorted.clear();
        let batches = ctx.batches;
        for id in batches.registration_order() {
            let translucent = batches
                .get(*id)
                .is_some_and(|instance| instance.resolve_material().surface == SurfaceKind::Translucent);
            if !translucent || !ctx.scene.is_active(*id) {
                continue;
            }
            let origin = matrix_origin(&ctx.scene.world_transform(*id));
            self.sorted.push((*id, ctx.camera.distance2(origin)));
        }
        sort_back_to_front(&mut self.sorted);
    }

    fn render(&mut self, ctx: &mut StageContext<'_>) {
        let batches = ctx.batches;
        let mut bound = None;
        for (id, _) in &self.sorted {
            let Some(instance) = batches.get(*id) else {
                continue;
            };
            let material = instance.resolve_material();
            let key = PipelineKey::Mesh {
                shader: material.shader,
                skinned: instance.is_skinned(),
                translucent: true,
            };
            if bound != Some(key) {
                ctx.bind(key);
                bound = Some(key);
            }
            ctx.draw_instance(*id);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
