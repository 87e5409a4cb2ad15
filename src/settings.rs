//! Tunables of the render system.
//!
//! Capacity fields (arena size, texture slots, shadow resolution, particle
//! capacity) are read once by [`RenderSystem::initialize`](crate::system::RenderSystem::initialize).
//! Everything else is read every frame and may be changed between frames
//! through [`RenderSystem::configure`](crate::system::RenderSystem::configure).

/// Maximum number of lights uploaded to the shading stage per frame.
pub const MAX_LIGHTS: usize = 8;

/// Number of depth slices a directional light's shadow is split into.
pub const CASCADE_COUNT: usize = 4;

#[derive(Clone, Debug)]
pub struct RenderSettings {
    /// Size in bytes of the vertex/skinning arena. Space is never reclaimed
    /// within a session, so provision generously.
    pub arena_capacity: u64,
    /// Number of layers in the shared texture array.
    pub texture_slots: u32,
    /// Edge length in texels of every texture array layer.
    pub texture_slot_size: u32,
    /// Edge length in texels of directional and spot shadow map layers.
    pub shadow_map_size: u32,
    /// Edge length in texels of each point light cube face.
    pub point_shadow_map_size: u32,
    /// Blend between uniform (`0.0`) and logarithmic (`1.0`) cascade splits.
    pub cascade_lambda: f32,
    /// Depth bias applied when comparing against shadow maps.
    pub shadow_bias: f32,
    pub shadows_enabled: bool,
    pub clear_colour: wgpu::Color,
    /// Exposure used by the composite tone mapping.
    pub exposure: f32,
    /// Upper bound of particles per blend mode per frame.
    pub max_particles: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            arena_capacity: 64 * 1024 * 1024,
            texture_slots: 64,
            texture_slot_size: 1024,
            shadow_map_size: 1024,
            point_shadow_map_size: 512,
            cascade_lambda: 0.75,
            shadow_bias: 0.005,
            shadows_enabled: true,
            clear_colour: wgpu::Color {
                r: 0.1,
                g: 0.2,
                b: 0.3,
                a: 1.0,
            },
            exposure: 1.0,
            max_particles: 16 * 1024,
        }
    }
}
