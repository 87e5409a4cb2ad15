//! Particle emitters and the per-particle GPU layout.
//!
//! Particles are simulated by the scene layer; the render core only reads
//! their state once per frame through
//! [`SceneSource::particles`](crate::scene::SceneSource::particles).

use std::{mem, sync::Arc};

use cgmath::{Point3, Quaternion};

use crate::data_structures::{InstanceId, model::Vertex, texture::TextureResource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParticleBlend {
    Opaque,
    Blended,
}

/// Billboards always face the camera; oriented particles use their rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParticleFacing {
    Billboard,
    Oriented,
}

#[derive(Clone, Copy, Debug)]
pub struct Particle {
    pub position: Point3<f32>,
    pub rotation: Quaternion<f32>,
    pub size: f32,
    pub colour: [f32; 4],
}

/// A particle component as registered with the render system.
#[derive(Clone, Debug)]
pub struct ParticleEmitter {
    pub id: InstanceId,
    pub blend: ParticleBlend,
    pub facing: ParticleFacing,
    pub texture: Option<Arc<TextureResource>>,
}

impl ParticleEmitter {
    pub fn new(id: InstanceId, blend: ParticleBlend, facing: ParticleFacing) -> Self {
        Self {
            id,
            blend,
            facing,
            texture: None,
        }
    }

    pub fn with_texture(mut self, texture: Arc<TextureResource>) -> Self {
        self.texture = Some(texture);
        self
    }
}

pub const PARTICLE_FLAG_BILLBOARD: u32 = 1;

/// One particle as stored in the instance arrays uploaded each frame.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleRaw {
    pub position: [f32; 3],
    pub size: f32,
    // xyzw quaternion
    pub rotation: [f32; 4],
    pub colour: [f32; 4],
    // x: flags, y: texture layer or u32::MAX
    pub info: [u32; 4],
}

impl ParticleRaw {
    pub fn new(particle: &Particle, facing: ParticleFacing, texture_layer: Option<u32>) -> Self {
        let flags = match facing {
            ParticleFacing::Billboard => PARTICLE_FLAG_BILLBOARD,
            ParticleFacing::Oriented => 0,
        };
        let q = particle.rotation;
        Self {
            position: particle.position.into(),
            size: particle.size,
            rotation: [q.v.x, q.v.y, q.v.z, q.s],
            colour: particle.colour,
            info: [flags, texture_layer.unwrap_or(u32::MAX), 0, 0],
        }
    }

    pub fn is_billboard(&self) -> bool {
        self.info[0] & PARTICLE_FLAG_BILLBOARD != 0
    }
}

impl Vertex for ParticleRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ParticleRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Uint32x4,
                },
            ],
        }
    }
}

/// Arguments of one indirect draw, laid out as the GPU reads them.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct IndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}
