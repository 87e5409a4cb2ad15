//! GPU-side records of engine resources.
//!
//! Each mesh, texture, skeleton and skybox the resource layer loads gets
//! exactly one record here, created by the matching `create_*` call and
//! dropped by `remove_*`. Records own their GPU objects; nothing is shared
//! between records except the arena and the texture array they lease from.

use std::collections::HashMap;

use cgmath::Matrix4;

use crate::{
    data_structures::{
        MeshId, SkeletonId, SkyboxId, TextureId,
        model::{Mesh, Skeleton},
        texture::{Skybox, TextureResource},
    },
    error::RenderError,
    gpu::{BufferDesc, BufferHandle, GpuDevice, TextureDesc, TextureHandle, TextureKind},
    resources::{
        arena::{BufferArena, GpuMeshSlice},
        slots::TextureSlotPacker,
    },
    settings::RenderSettings,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuSubmesh {
    pub vertices: GpuMeshSlice,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub skinned: bool,
}

/// One entry per submesh of the mesh; `None` where the submesh did not fit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GpuMeshRecord {
    pub submeshes: Vec<Option<GpuSubmesh>>,
}

impl GpuMeshRecord {
    pub fn loaded(&self) -> impl Iterator<Item = &GpuSubmesh> {
        self.submeshes.iter().flatten()
    }

    pub fn is_complete(&self) -> bool {
        self.submeshes.iter().all(Option::is_some)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuSkeletonRecord {
    pub joints: GpuMeshSlice,
    pub joint_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuSkyboxRecord {
    pub cubemap: TextureHandle,
}

#[derive(Debug)]
pub struct GpuRegistry {
    arena: BufferArena,
    slots: TextureSlotPacker,
    meshes: HashMap<MeshId, GpuMeshRecord>,
    skeletons: HashMap<SkeletonId, GpuSkeletonRecord>,
    skyboxes: HashMap<SkyboxId, GpuSkyboxRecord>,
}

impl GpuRegistry {
    pub fn new(device: &mut dyn GpuDevice, settings: &RenderSettings) -> Self {
        Self {
            arena: BufferArena::new(device, settings.arena_capacity),
            slots: TextureSlotPacker::new(device, settings.texture_slots, settings.texture_slot_size),
            meshes: HashMap::new(),
            skeletons: HashMap::new(),
            skyboxes: HashMap::new(),
        }
    }

    pub fn arena(&self) -> &BufferArena {
        &self.arena
    }

    pub fn slots(&self) -> &TextureSlotPacker {
        &self.slots
    }

    /// Upload every submesh that has no GPU record yet. Returns how many
    /// submeshes of the mesh are resident afterwards.
    pub fn create_mesh(&mut self, device: &mut dyn GpuDevice, mesh: &Mesh) -> usize {
        let record = self.meshes.entry(mesh.id).or_default();
        if record.submeshes.len() < mesh.submeshes.len() {
            record.submeshes.resize(mesh.submeshes.len(), None);
        }
        for (i, (submesh, slot)) in mesh
            .submeshes
            .iter()
            .zip(record.submeshes.iter_mut())
            .enumerate()
        {
            if slot.is_some() {
                continue;
            }
            let Some(vertices) = self.arena.allocate(device, submesh.vertices.as_bytes()) else {
                log::warn!("Submesh {i} of {} left without GPU data.", mesh.name);
                continue;
            };
            let index_buffer = device.create_buffer(&BufferDesc {
                label: &format!("{} Index Buffer {i}", mesh.name),
                size: (submesh.indices.len() * 4) as u64,
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            });
            if !submesh.indices.is_empty() {
                device.write_buffer(index_buffer, 0, bytemuck::cast_slice(&submesh.indices));
            }
            *slot = Some(GpuSubmesh {
                vertices,
                index_buffer,
                index_count: submesh.indices.len() as u32,
                skinned: submesh.vertices.is_skinned(),
            });
        }
        record.loaded().count()
    }

    pub fn mesh(&self, id: MeshId) -> Option<&GpuMeshRecord> {
        self.meshes.get(&id)
    }

    pub fn remove_mesh(&mut self, device: &mut dyn GpuDevice, id: MeshId) -> Result<(), RenderError> {
        let record = self.meshes.remove(&id).ok_or(RenderError::NotRegistered {
            kind: "mesh",
            id: id.raw(),
        })?;
        for submesh in record.submeshes.into_iter().flatten() {
            self.arena.release(device, submesh.vertices);
            device.destroy_buffer(submesh.index_buffer);
        }
        Ok(())
    }

    /// Place the texture in the shared array. Idempotent.
    pub fn create_texture(&mut self, device: &mut dyn GpuDevice, texture: &TextureResource) -> Option<u32> {
        self.slots.acquire(device, texture)
    }

    pub fn texture_slot(&self, id: TextureId) -> Option<u32> {
        self.slots.slot_of(id)
    }

    pub fn remove_texture(&mut self, device: &mut dyn GpuDevice, id: TextureId) -> Result<(), RenderError> {
        self.slots
            .release(device, id)
            .map(|_| ())
            .ok_or(RenderError::NotRegistered {
                kind: "texture",
                id: id.raw(),
            })
    }

    /// Lease arena space for the skeleton's joint matrices and upload the
    /// bind pose. Idempotent.
    pub fn create_skeleton(&mut self, device: &mut dyn GpuDevice, skeleton: &Skeleton) -> Option<GpuSkeletonRecord> {
        if let Some(record) = self.skeletons.get(&skeleton.id) {
            return Some(*record);
        }
        let joints = self
            .arena
            .allocate(device, bytemuck::cast_slice(&skeleton.bind_pose()))?;
        let record = GpuSkeletonRecord {
            joints,
            joint_count: skeleton.joint_count as u32,
        };
        self.skeletons.insert(skeleton.id, record);
        Some(record)
    }

    pub fn skeleton(&self, id: SkeletonId) -> Option<&GpuSkeletonRecord> {
        self.skeletons.get(&id)
    }

    /// Upload a new pose. Extra matrices beyond the skeleton's joint count
    /// are ignored.
    pub fn update_skeleton(&mut self, device: &mut dyn GpuDevice, id: SkeletonId, pose: &[Matrix4<f32>]) {
        let Some(record) = self.skeletons.get(&id) else {
            return;
        };
        let rows: Vec<[[f32; 4]; 4]> = pose
            .iter()
            .take(record.joint_count as usize)
            .map(|m| (*m).into())
            .collect();
        self.arena.rewrite(device, record.joints, bytemuck::cast_slice(&rows));
    }

    pub fn remove_skeleton(&mut self, device: &mut dyn GpuDevice, id: SkeletonId) -> Result<(), RenderError> {
        let record = self.skeletons.remove(&id).ok_or(RenderError::NotRegistered {
            kind: "skeleton",
            id: id.raw(),
        })?;
        self.arena.release(device, record.joints);
        Ok(())
    }

    /// Create the cubemap for a skybox. Idempotent.
    pub fn create_skybox(&mut self, device: &mut dyn GpuDevice, skybox: &Skybox) -> GpuSkyboxRecord {
        if let Some(record) = self.skyboxes.get(&skybox.id) {
            return *record;
        }
        let cubemap = device.create_texture(&TextureDesc {
            label: &format!("Skybox {}", skybox.id.raw()),
            size: skybox.size,
            kind: TextureKind::Cube,
        });
        for (face, pixels) in skybox.faces.iter().enumerate() {
            device.write_texture_layer(cubemap, face as u32, skybox.size, pixels);
        }
        let record = GpuSkyboxRecord { cubemap };
        self.skyboxes.insert(skybox.id, record);
        record
    }

    pub fn skybox(&self, id: SkyboxId) -> Option<&GpuSkyboxRecord> {
        self.skyboxes.get(&id)
    }

    pub fn remove_skybox(&mut self, device: &mut dyn GpuDevice, id: SkyboxId) -> Result<(), RenderError> {
        let record = self.skyboxes.remove(&id).ok_or(RenderError::NotRegistered {
            kind: "skybox",
            id: id.raw(),
        })?;
        device.destroy_texture(record.cubemap);
        Ok(())
    }

    /// Release every GPU object held by the registry.
    pub fn destroy(mut self, device: &mut dyn GpuDevice) {
        let meshes: Vec<MeshId> = self.meshes.keys().copied().collect();
        for id in meshes {
            let _ = self.remove_mesh(device, id);
        }
        for (_, record) in self.skyboxes.drain() {
            device.destroy_texture(record.cubemap);
        }
        self.arena.destroy(device);
        self.slots.destroy(device);
    }
}
