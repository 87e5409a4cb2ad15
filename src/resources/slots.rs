//! Fixed-capacity texture array with a FIFO free list of layers.

use std::collections::{HashMap, VecDeque};

use crate::{
    data_structures::{TextureId, texture::TextureResource},
    error::RenderError,
    gpu::{GpuDevice, TextureDesc, TextureHandle, TextureKind},
};

#[derive(Debug)]
pub struct TextureSlotPacker {
    texture: TextureHandle,
    slot_size: u32,
    capacity: u32,
    free: VecDeque<u32>,
    assigned: HashMap<TextureId, u32>,
}

impl TextureSlotPacker {
    pub fn new(device: &mut dyn GpuDevice, capacity: u32, slot_size: u32) -> Self {
        let texture = device.create_texture(&TextureDesc {
            label: "Texture Slot Array",
            size: slot_size,
            kind: TextureKind::ColourArray { layers: capacity },
        });
        Self {
            texture,
            slot_size,
            capacity,
            free: (0..capacity).collect(),
            assigned: HashMap::new(),
        }
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn slot_of(&self, texture: TextureId) -> Option<u32> {
        self.assigned.get(&texture).copied()
    }

    /// Give `texture` a layer and upload its pixels there. A texture that
    /// already holds a layer keeps it. `None` (logged) when every layer is
    /// taken; nothing changes in that case.
    pub fn acquire(&mut self, device: &mut dyn GpuDevice, texture: &TextureResource) -> Option<u32> {
        if let Some(slot) = self.slot_of(texture.id) {
            return Some(slot);
        }
        let Some(slot) = self.free.pop_front() else {
            log::warn!(
                "{}, {} gets no slot.",
                RenderError::TextureSlotsExhausted {
                    capacity: self.capacity
                },
                texture.name
            );
            return None;
        };
        let pixels = texture.fitted_pixels(self.slot_size);
        device.write_texture_layer(self.texture, slot, self.slot_size, &pixels);
        self.assigned.insert(texture.id, slot);
        log::debug!("Texture {} uses slot {slot}", texture.name);
        Some(slot)
    }

    /// Blank the layer held by `texture` and queue it for reuse. Returns the
    /// freed layer, `None` if the texture held none.
    pub fn release(&mut self, device: &mut dyn GpuDevice, texture: TextureId) -> Option<u32> {
        let slot = self.assigned.remove(&texture)?;
        device.clear_texture_layer(self.texture, slot);
        self.free.push_back(slot);
        Some(slot)
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) {
        device.destroy_texture(self.texture);
    }
}
