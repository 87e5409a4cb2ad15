//! Materials decide which batch an instance is drawn from.

use std::sync::Arc;

use crate::data_structures::{MaterialId, texture::TextureResource};

/// Lighting model of a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ShaderKind {
    #[default]
    Unlit,
    Lit,
    Pbr,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 3] = [ShaderKind::Unlit, ShaderKind::Lit, ShaderKind::Pbr];
}

/// Whether a material writes depth and is drawn in the opaque stage, or is
/// blended back to front in the transparent stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SurfaceKind {
    #[default]
    Opaque,
    Translucent,
}

impl SurfaceKind {
    pub const ALL: [SurfaceKind; 2] = [SurfaceKind::Opaque, SurfaceKind::Translucent];
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialParams {
    pub base_colour: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub emissive_strength: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            base_colour: [1.0, 1.0, 1.0, 1.0],
            metallic: 0.0,
            roughness: 0.5,
            emissive_strength: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    pub shader: ShaderKind,
    pub surface: SurfaceKind,
    pub albedo: Option<Arc<TextureResource>>,
    pub params: MaterialParams,
}

impl Material {
    pub fn new(id: MaterialId, name: impl Into<String>, shader: ShaderKind, surface: SurfaceKind) -> Self {
        Self {
            id,
            name: name.into(),
            shader,
            surface,
            albedo: None,
            params: MaterialParams::default(),
        }
    }

    pub fn with_albedo(mut self, texture: Arc<TextureResource>) -> Self {
        self.albedo = Some(texture);
        self
    }

    pub fn with_params(mut self, params: MaterialParams) -> Self {
        self.params = params;
        self
    }

    pub fn resolve(&self) -> ResolvedMaterial<'_> {
        ResolvedMaterial {
            shader: self.shader,
            surface: self.surface,
            albedo: self.albedo.as_deref(),
            params: self.params,
        }
    }
}

/// What the draw path needs to know about an instance's material.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedMaterial<'a> {
    pub shader: ShaderKind,
    pub surface: SurfaceKind,
    pub albedo: Option<&'a TextureResource>,
    pub params: MaterialParams,
}

impl Default for ResolvedMaterial<'_> {
    fn default() -> Self {
        Self {
            shader: ShaderKind::Unlit,
            surface: SurfaceKind::Opaque,
            albedo: None,
            params: MaterialParams::default(),
        }
    }
}
