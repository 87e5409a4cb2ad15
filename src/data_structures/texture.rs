//! Decoded textures and skyboxes.
//!
//! Decoding and resizing are pure CPU work and safe to run on worker threads;
//! the resulting [`TextureResource`] is uploaded later on the render thread.

use anyhow::*;
use image::{ImageFormat, imageops::FilterType, load_from_memory_with_format};

use crate::data_structures::{SkyboxId, TextureId};

/// RGBA8 pixels ready to be copied into a texture array layer.
#[derive(Clone, Debug)]
pub struct TextureResource {
    pub id: TextureId,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureResource {
    pub fn new(id: TextureId, name: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            width,
            height,
            pixels,
        }
    }

    /// A `size`x`size` texture filled with one colour.
    pub fn solid(id: TextureId, name: impl Into<String>, size: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(size as usize * size as usize * 4)
            .collect();
        Self::new(id, name, size, size, pixels)
    }

    /// Decode an encoded image (PNG, JPEG, ...) and fit it to a square slot.
    ///
    /// `format` is an optional file extension hint; without it the format is
    /// guessed from the bytes.
    pub fn from_bytes(
        id: TextureId,
        name: &str,
        bytes: &[u8],
        format: Option<&str>,
        slot_size: u32,
    ) -> Result<Self> {
        let img = match format {
            None => image::load_from_memory(bytes)?,
            Some(fmt) => {
                let format = ImageFormat::from_extension(fmt)
                    .with_context(|| format!("unknown image format {fmt} for {name}"))?;
                load_from_memory_with_format(bytes, format)?
            }
        };
        Ok(Self::from_image(id, name, &img, slot_size))
    }

    pub fn from_image(id: TextureId, name: &str, img: &image::DynamicImage, slot_size: u32) -> Self {
        let rgba = img.to_rgba8();
        let rgba = if rgba.width() == slot_size && rgba.height() == slot_size {
            rgba
        } else {
            image::imageops::resize(&rgba, slot_size, slot_size, FilterType::Triangle)
        };
        Self::new(id, name, slot_size, slot_size, rgba.into_raw())
    }

    /// Pixels fitted to a square layer of edge `slot_size`.
    pub fn fitted_pixels(&self, slot_size: u32) -> Vec<u8> {
        if self.width == slot_size && self.height == slot_size {
            return self.pixels.clone();
        }
        match image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone()) {
            Some(img) => image::imageops::resize(&img, slot_size, slot_size, FilterType::Triangle).into_raw(),
            None => {
                log::warn!(
                    "Texture {} has {} bytes of pixels, expected {}x{} RGBA; uploading a blank layer.",
                    self.name,
                    self.pixels.len(),
                    self.width,
                    self.height
                );
                vec![0; slot_size as usize * slot_size as usize * 4]
            }
        }
    }
}

/// Six RGBA8 faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Clone, Debug)]
pub struct Skybox {
    pub id: SkyboxId,
    pub size: u32,
    pub faces: [Vec<u8>; 6],
}

impl Skybox {
    pub fn new(id: SkyboxId, size: u32, faces: [Vec<u8>; 6]) -> Self {
        Self { id, size, faces }
    }

    /// Decode six encoded face images, resizing each to `size`.
    pub fn from_encoded_faces(id: SkyboxId, faces: &[Vec<u8>; 6], size: u32) -> Result<Self> {
        let mut decoded: [Vec<u8>; 6] = Default::default();
        for (face, bytes) in decoded.iter_mut().zip(faces.iter()) {
            let img = image::load_from_memory(bytes)
                .with_context(|| format!("decoding face of skybox {}", id.raw()))?;
            *face = image::imageops::resize(&img.to_rgba8(), size, size, FilterType::Triangle).into_raw();
        }
        Ok(Self::new(id, size, decoded))
    }

    pub fn gradient(id: SkyboxId, size: u32, top: [u8; 4], bottom: [u8; 4]) -> Self {
        let face = |rgba: [u8; 4]| -> Vec<u8> {
            rgba.iter()
                .copied()
                .cycle()
                .take(size as usize * size as usize * 4)
                .collect()
        };
        let mid = [
            ((top[0] as u16 + bottom[0] as u16) / 2) as u8,
            ((top[1] as u16 + bottom[1] as u16) / 2) as u8,
            ((top[2] as u16 + bottom[2] as u16) / 2) as u8,
            255,
        ];
        Self::new(
            id,
            size,
            [face(mid), face(mid), face(top), face(bottom), face(mid), face(mid)],
        )
    }
}
