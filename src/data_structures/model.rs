//! Vertex layouts, meshes and skeletons.
//!
//! These are the CPU-side resources handed over by the import pipeline. The
//! render core never mutates them; it mirrors them into the buffer arena.

use std::mem;

use cgmath::{Matrix4, SquareMatrix};

use crate::data_structures::{MeshId, SkeletonId};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// A vertex influenced by up to four joints.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub joints: [u32; 4],
    pub weights: [f32; 4],
}

impl Vertex for SkinnedVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<SkinnedVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Uint32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub enum VertexData {
    Static(Vec<ModelVertex>),
    Skinned(Vec<SkinnedVertex>),
}

impl VertexData {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            VertexData::Static(vertices) => bytemuck::cast_slice(vertices),
            VertexData::Skinned(vertices) => bytemuck::cast_slice(vertices),
        }
    }

    pub fn is_skinned(&self) -> bool {
        matches!(self, VertexData::Skinned(_))
    }

    pub fn len(&self) -> usize {
        match self {
            VertexData::Static(vertices) => vertices.len(),
            VertexData::Skinned(vertices) => vertices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct SubMesh {
    pub vertices: VertexData,
    pub indices: Vec<u32>,
}

/// A decoded mesh: one or more submeshes sharing a transform.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub id: MeshId,
    pub name: String,
    pub submeshes: Vec<SubMesh>,
}

impl Mesh {
    pub fn new(id: MeshId, name: impl Into<String>, submeshes: Vec<SubMesh>) -> Self {
        Self {
            id,
            name: name.into(),
            submeshes,
        }
    }

    /// A single-submesh axis aligned cube of edge length 1 centred on the origin.
    pub fn cube(id: MeshId) -> Self {
        #[rustfmt::skip]
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, u axis, v axis
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in FACES {
            let base = vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                vertices.push(ModelVertex {
                    position: [
                        normal[0] * 0.5 + u[0] * su + v[0] * sv,
                        normal[1] * 0.5 + u[1] * su + v[1] * sv,
                        normal[2] * 0.5 + u[2] * su + v[2] * sv,
                    ],
                    tex_coords: [su + 0.5, 0.5 - sv],
                    normal,
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(
            id,
            "cube",
            vec![SubMesh {
                vertices: VertexData::Static(vertices),
                indices,
            }],
        )
    }
}

/// A joint hierarchy's GPU footprint: one matrix per joint.
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub id: SkeletonId,
    pub joint_count: usize,
}

impl Skeleton {
    pub fn new(id: SkeletonId, joint_count: usize) -> Self {
        Self { id, joint_count }
    }

    /// Identity matrices for every joint, uploaded until a pose is supplied.
    pub fn bind_pose(&self) -> Vec<[[f32; 4]; 4]> {
        vec![Matrix4::<f32>::identity().into(); self.joint_count]
    }

    pub fn byte_size(&self) -> u64 {
        (self.joint_count * mem::size_of::<[[f32; 4]; 4]>()) as u64
    }
}
