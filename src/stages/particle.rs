use std::{any::Any, mem};

use crate::{
    data_structures::particle::{IndirectArgs, ParticleBlend, ParticleRaw},
    gpu::{BufferDesc, BufferHandle, GpuDevice, PipelineKey},
    render::DrawCommand,
    settings::RenderSettings,
    stages::{RenderStage, StageContext, StageKind, prepare_pipelines, transparent::sort_back_to_front},
};

/// Vertices of the quad expanded per particle in the vertex shader.
pub const PARTICLE_QUAD_VERTICES: u32 = 6;

/// Upper bound of indirect draws per blend mode.
pub const MAX_INDIRECT_DRAWS: usize = 256;

#[derive(Debug)]
struct ParticleBuffers {
    opaque: BufferHandle,
    blended: BufferHandle,
    opaque_indirect: BufferHandle,
    blended_indirect: BufferHandle,
}

/// Rebuilds the opaque and blended particle arrays from every registered
/// emitter each frame and draws each with one indirect multi-draw.
///
/// Particle positions are taken as world space. Opaque particles get one
/// draw per emitter; blended particles are sorted back to front across all
/// emitters and drawn as a single range.
#[derive(Debug, Default)]
pub struct ParticleStage {
    buffers: Option<ParticleBuffers>,
    capacity: usize,
    opaque: Vec<ParticleRaw>,
    blended: Vec<(ParticleRaw, f32)>,
    opaque_args: Vec<IndirectArgs>,
}

impl ParticleStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last frame's opaque particle array.
    pub fn opaque(&self) -> &[ParticleRaw] {
        &self.opaque
    }

    /// Last frame's blended particle array, farthest first, with squared
    /// camera distances.
    pub fn blended(&self) -> &[(ParticleRaw, f32)] {
        &self.blended
    }

    fn collect(&mut self, ctx: &StageContext<'_>) {
        self.opaque.clear();
        self.blended.clear();
        self.opaque_args.clear();
        let mut dropped = 0;
        for emitter in ctx.batches.emitters() {
            if !ctx.scene.is_active(emitter.id) {
                continue;
            }
            let layer = emitter
                .texture
                .as_ref()
                .and_then(|texture| ctx.registry.texture_slot(texture.id));
            let first = self.opaque.len();
            for particle in ctx.scene.particles(emitter.id) {
                let raw = ParticleRaw::new(particle, emitter.facing, layer);
                match emitter.blend {
                    ParticleBlend::Opaque if self.opaque.len() < self.capacity => self.opaque.push(raw),
                    ParticleBlend::Blended if self.blended.len() < self.capacity => self
                        .blended
                        .push((raw, ctx.camera.distance2(particle.position))),
                    _ => dropped += 1,
                }
            }
            let count = self.opaque.len() - first;
            if count == 0 {
                continue;
            }
            let full = self.opaque_args.len() == MAX_INDIRECT_DRAWS;
            match self.opaque_args.last_mut() {
                // Ranges are contiguous, so overflow folds into the last draw.
                Some(last) if full => {
                    last.instance_count += count as u32;
                }
                _ => self.opaque_args.push(IndirectArgs {
                    vertex_count: PARTICLE_QUAD_VERTICES,
                    instance_count: count as u32,
                    first_vertex: 0,
                    first_instance: first as u32,
                }),
            }
        }
        if dropped > 0 {
            log::warn!("Particle capacity of {} exceeded, dropped {dropped} particles.", self.capacity);
        }
        sort_back_to_front(&mut self.blended);
    }
}

impl RenderStage for ParticleStage {
    fn kind(&self) -> StageKind {
        StageKind::Particle
    }

    fn initialize(&mut self, device: &mut dyn GpuDevice, settings: &RenderSettings) {
        prepare_pipelines(
            device,
            [
                PipelineKey::Particle { blended: false },
                PipelineKey::Particle { blended: true },
            ],
        );
        self.capacity = settings.max_particles as usize;
        let instance_bytes = (self.capacity.max(1) * mem::size_of::<ParticleRaw>()) as u64;
        let indirect_bytes = (MAX_INDIRECT_DRAWS * mem::size_of::<IndirectArgs>()) as u64;
        let mut create = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&BufferDesc { label, size, usage })
        };
        let instance_usage = wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST;
        let indirect_usage = wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST;
        self.buffers = Some(ParticleBuffers {
            opaque: create("Opaque Particle Buffer", instance_bytes, instance_usage),
            blended: create("Blended Particle Buffer", instance_bytes, instance_usage),
            opaque_indirect: create("Opaque Particle Indirect Buffer", indirect_bytes, indirect_usage),
            blended_indirect: create("Blended Particle Indirect Buffer", indirect_bytes, indirect_usage),
        });
    }

    fn render(&mut self, ctx: &mut StageContext<'_>) {
        self.collect(ctx);
        let Some(buffers) = &self.buffers else {
            log::warn!("Particle stage rendered before initialize, skipping.");
            return;
        };

        if !self.opaque.is_empty() {
            ctx.device
                .write_buffer(buffers.opaque, 0, bytemuck::cast_slice(&self.opaque));
            ctx.device
                .write_buffer(buffers.opaque_indirect, 0, bytemuck::cast_slice(&self.opaque_args));
            ctx.bind(PipelineKey::Particle { blended: false });
            ctx.frame.push(DrawCommand::MultiDrawIndirect {
                instances: buffers.opaque,
                indirect: buffers.opaque_indirect,
                args: self.opaque_args.clone(),
            });
        }

        if !self.blended.is_empty() {
            let raw: Vec<ParticleRaw> = self.blended.iter().map(|(raw, _)| *raw).collect();
            let args = [IndirectArgs {
                vertex_count: PARTICLE_QUAD_VERTICES,
                instance_count: raw.len() as u32,
                first_vertex: 0,
                first_instance: 0,
            }];
            ctx.device
                .write_buffer(buffers.blended, 0, bytemuck::cast_slice(&raw));
            ctx.device
                .write_buffer(buffers.blended_indirect, 0, bytemuck::cast_slice(&args));
            ctx.bind(PipelineKey::Particle { blended: true });
            ctx.frame.push(DrawCommand::MultiDrawIndirect {
                instances: buffers.blended,
                indirect: buffers.blended_indirect,
                args: args.to_vec(),
            });
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
