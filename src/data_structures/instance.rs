//! Draw instances and the per-draw data stored on the GPU.
//!
//! A [`DrawInstance`] borrows its geometry, material and skeleton from the
//! resource layer (shared through `Arc`) and its transform and active flag
//! from the scene layer (looked up by [`InstanceId`]). The render system only
//! files it into batches.

use std::{mem, sync::Arc};

use cgmath::{Matrix, Matrix3, Matrix4, Point3, SquareMatrix};

use crate::data_structures::{
    InstanceId,
    material::{Material, ResolvedMaterial},
    model::{Mesh, Skeleton, Vertex},
};

/// A mesh (optionally skinned) placed in the scene.
#[derive(Clone, Debug)]
pub struct DrawInstance {
    pub id: InstanceId,
    pub mesh: Arc<Mesh>,
    pub material: Option<Arc<Material>>,
    pub skeleton: Option<Arc<Skeleton>>,
}

impl DrawInstance {
    pub fn mesh(id: InstanceId, mesh: Arc<Mesh>, material: Option<Arc<Material>>) -> Self {
        Self {
            id,
            mesh,
            material,
            skeleton: None,
        }
    }

    pub fn skinned(
        id: InstanceId,
        mesh: Arc<Mesh>,
        material: Option<Arc<Material>>,
        skeleton: Arc<Skeleton>,
    ) -> Self {
        Self {
            id,
            mesh,
            material,
            skeleton: Some(skeleton),
        }
    }

    pub fn is_skinned(&self) -> bool {
        self.skeleton.is_some()
    }

    /// Opaque/unlit when no material is bound.
    pub fn resolve_material(&self) -> ResolvedMaterial<'_> {
        self.material
            .as_deref()
            .map(Material::resolve)
            .unwrap_or_default()
    }
}

/// World-space origin of a transform matrix.
pub fn matrix_origin(matrix: &Matrix4<f32>) -> Point3<f32> {
    Point3::new(matrix.w.x, matrix.w.y, matrix.w.z)
}

/// Layer index meaning "no texture bound".
pub const NO_TEXTURE: u32 = u32::MAX;

/**
 * The raw instance is the actual data stored on the GPU: one per draw.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
    _padding: f32,
    base_colour: [f32; 4],
    // metallic, roughness, emissive strength, unused
    params: [f32; 4],
    // albedo layer, joint row offset, joint count, unused
    indices: [u32; 4],
}

impl InstanceRaw {
    pub fn new(world: Matrix4<f32>, material: &ResolvedMaterial, albedo_layer: Option<u32>) -> Self {
        let normal = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate())
            .invert()
            .map(|m| m.transpose())
            .unwrap_or_else(Matrix3::identity);
        Self {
            model: world.into(),
            normal: normal.into(),
            _padding: 0.0,
            base_colour: material.params.base_colour,
            params: [
                material.params.metallic,
                material.params.roughness,
                material.params.emissive_strength,
                0.0,
            ],
            indices: [albedo_layer.unwrap_or(NO_TEXTURE), 0, 0, 0],
        }
    }

    /// Point the vertex shader at joint matrices stored at `byte_offset` in
    /// the arena.
    pub fn with_joints(mut self, byte_offset: u64, joint_count: u32) -> Self {
        self.indices[1] = (byte_offset / 16) as u32;
        self.indices[2] = joint_count;
        self
    }

    pub fn model(&self) -> Matrix4<f32> {
        self.model.into()
    }

    pub fn albedo_layer(&self) -> Option<u32> {
        (self.indices[0] != NO_TEXTURE).then_some(self.indices[0])
    }
}

/**
 * Instance attributes start at location 5 so they follow both the static
 * and the skinned vertex layouts.
 */
impl Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                // A mat4 takes up 4 vertex slots as it is technically 4 vec4s.
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
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 26]>() as wgpu::BufferAddress,
                    shader_location: 12,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 30]>() as wgpu::BufferAddress,
                    shader_location: 13,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 34]>() as wgpu::BufferAddress,
                    shader_location: 14,
                    format: wgpu::VertexFormat::Uint32x4,
                },
            ],
        }
    }
}
