//! Append-only allocator over one GPU storage buffer.
//!
//! All mesh vertices and skeleton joint matrices live in a single buffer.
//! Allocations bump a high-water mark and are never reused within a session:
//! [`BufferArena::release`] only zero-fills the range.

use crate::{
    error::RenderError,
    gpu::{BufferDesc, BufferHandle, GpuDevice},
};

/// Offsets are aligned so joint matrices can be read as `vec4` rows.
pub const ARENA_ALIGNMENT: u64 = 16;

/// A lease on a byte range of the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuMeshSlice {
    pub byte_offset: u64,
    pub byte_size: u64,
}

impl GpuMeshSlice {
    pub fn end(&self) -> u64 {
        self.byte_offset + self.byte_size
    }

    pub fn overlaps(&self, other: &GpuMeshSlice) -> bool {
        self.byte_offset < other.end() && other.byte_offset < self.end()
    }
}

#[derive(Debug)]
pub struct BufferArena {
    buffer: BufferHandle,
    capacity: u64,
    high_water: u64,
}

impl BufferArena {
    pub fn new(device: &mut dyn GpuDevice, capacity: u64) -> Self {
        let buffer = device.create_buffer(&BufferDesc {
            label: "Buffer Arena",
            size: capacity,
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            buffer,
            capacity,
            high_water: 0,
        }
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn used(&self) -> u64 {
        self.high_water
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.high_water
    }

    /// Reserve a range for `data` and copy it there. `None` (logged) when
    /// `data` is empty or the arena cannot fit it; nothing is reserved in
    /// either case.
    pub fn allocate(&mut self, device: &mut dyn GpuDevice, data: &[u8]) -> Option<GpuMeshSlice> {
        if data.is_empty() {
            log::warn!("Refusing an empty arena allocation.");
            return None;
        }
        match self.try_allocate(data.len() as u64) {
            Ok(slice) => {
                device.write_buffer(self.buffer, slice.byte_offset, data);
                Some(slice)
            }
            Err(e) => {
                log::warn!("{e}, skipping resource.");
                None
            }
        }
    }

    fn try_allocate(&mut self, byte_size: u64) -> Result<GpuMeshSlice, RenderError> {
        let byte_offset = self.high_water.next_multiple_of(ARENA_ALIGNMENT);
        let end = byte_offset
            .checked_add(byte_size.next_multiple_of(4))
            .filter(|end| *end <= self.capacity)
            .ok_or(RenderError::ArenaExhausted {
                requested: byte_size,
                remaining: self.remaining(),
                capacity: self.capacity,
            })?;
        self.high_water = end;
        Ok(GpuMeshSlice {
            byte_offset,
            byte_size,
        })
    }

    /// Zero the range. The space is not handed out again.
    pub fn release(&mut self, device: &mut dyn GpuDevice, slice: GpuMeshSlice) {
        if slice.byte_size > 0 {
            device.clear_buffer(self.buffer, slice.byte_offset, slice.byte_size.next_multiple_of(4));
        }
    }

    /// Overwrite the start of a leased range, e.g. with a new skeleton pose.
    pub fn rewrite(&mut self, device: &mut dyn GpuDevice, slice: GpuMeshSlice, data: &[u8]) {
        let len = (data.len() as u64).min(slice.byte_size) as usize;
        if len > 0 {
            device.write_buffer(self.buffer, slice.byte_offset, &data[..len]);
        }
    }

    pub fn destroy(self, device: &mut dyn GpuDevice) {
        device.destroy_buffer(self.buffer);
    }
}
