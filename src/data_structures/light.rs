//! Light records and the light uniform block.

use cgmath::{InnerSpace, Point3, Vector3};

use crate::settings::MAX_LIGHTS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

impl LightType {
    fn raw(self) -> u32 {
        match self {
            LightType::Directional => 0,
            LightType::Point => 1,
            LightType::Spot => 2,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Light {
    pub position: Point3<f32>,
    pub direction: Vector3<f32>,
    pub diffuse: [f32; 3],
    pub ambient: [f32; 3],
    pub specular: [f32; 3],
    /// Attenuation range for point and spot lights; far plane of their shadows.
    pub radius: f32,
    pub intensity: f32,
    /// Half angles of the spot cone, in radians.
    pub inner_cutoff: f32,
    pub outer_cutoff: f32,
    pub kind: LightType,
    pub cast_shadows: bool,
    pub enabled: bool,
}

impl Light {
    fn base(kind: LightType) -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 0.0),
            direction: Vector3::new(0.0, -1.0, 0.0),
            diffuse: [1.0, 1.0, 1.0],
            ambient: [0.05, 0.05, 0.05],
            specular: [1.0, 1.0, 1.0],
            radius: 25.0,
            intensity: 1.0,
            inner_cutoff: 20f32.to_radians(),
            outer_cutoff: 30f32.to_radians(),
            kind,
            cast_shadows: false,
            enabled: true,
        }
    }

    pub fn directional(direction: Vector3<f32>) -> Self {
        Self {
            direction: direction.normalize(),
            ..Self::base(LightType::Directional)
        }
    }

    pub fn point(position: Point3<f32>, radius: f32) -> Self {
        Self {
            position,
            radius,
            ..Self::base(LightType::Point)
        }
    }

    pub fn spot(position: Point3<f32>, direction: Vector3<f32>, outer_cutoff: f32, radius: f32) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            radius,
            outer_cutoff,
            inner_cutoff: outer_cutoff * 0.8,
            ..Self::base(LightType::Spot)
        }
    }

    pub fn with_shadows(mut self) -> Self {
        self.cast_shadows = true;
        self
    }

    pub fn with_colour(mut self, diffuse: [f32; 3], intensity: f32) -> Self {
        self.diffuse = diffuse;
        self.intensity = intensity;
        self
    }
}

/// The first `MAX_LIGHTS` enabled lights in declaration order; the rest are
/// dropped.
pub fn active_lights(lights: &[Light]) -> impl Iterator<Item = &Light> {
    lights.iter().filter(|light| light.enabled).take(MAX_LIGHTS)
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightRaw {
    position: [f32; 3],
    kind: u32,
    direction: [f32; 3],
    radius: f32,
    diffuse: [f32; 3],
    intensity: f32,
    ambient: [f32; 3],
    inner_cos: f32,
    specular: [f32; 3],
    outer_cos: f32,
    // x: shadow slot or -1, yzw unused
    shadow: [i32; 4],
}

impl LightRaw {
    pub fn kind(&self) -> u32 {
        self.kind
    }

    pub fn shadow_slot(&self) -> Option<usize> {
        usize::try_from(self.shadow[0]).ok()
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightsUniform {
    pub lights: [LightRaw; MAX_LIGHTS],
    // x: number of lights in use
    pub count: [u32; 4],
}

impl LightsUniform {
    /// Rebuild the block from the enabled-light set. The n-th light in the
    /// block that casts shadows owns shadow slot n.
    pub fn from_lights(lights: &[Light]) -> Self {
        let mut uniform = Self::default();
        let mut count = 0;
        for (slot, light) in active_lights(lights).enumerate() {
            uniform.lights[slot] = LightRaw {
                position: light.position.into(),
                kind: light.kind.raw(),
                direction: light.direction.into(),
                radius: light.radius,
                diffuse: light.diffuse,
                intensity: light.intensity,
                ambient: light.ambient,
                inner_cos: light.inner_cutoff.cos(),
                specular: light.specular,
                outer_cos: light.outer_cutoff.cos(),
                shadow: [if light.cast_shadows { slot as i32 } else { -1 }, 0, 0, 0],
            };
            count += 1;
        }
        uniform.count[0] = count;
        uniform
    }
}

impl Default for LightsUniform {
    fn default() -> Self {
        Self {
            lights: [LightRaw::default(); MAX_LIGHTS],
            count: [0; 4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lights_beyond_the_cap_are_dropped_in_declaration_order() {
        let mut lights: Vec<Light> = (0..12)
            .map(|i| Light::point(Point3::new(i as f32, 0.0, 0.0), 5.0))
            .collect();
        lights[1].enabled = false;
        let uniform = LightsUniform::from_lights(&lights);
        assert_eq!(uniform.count[0], MAX_LIGHTS as u32);
        let xs: Vec<f32> = uniform.lights.iter().map(|l| l.position[0]).collect();
        assert_eq!(xs, vec![0.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn shadow_slot_follows_block_slot() {
        let lights = [
            Light::point(Point3::new(0.0, 0.0, 0.0), 5.0),
            Light::directional(Vector3::new(0.0, -1.0, 0.2)).with_shadows(),
        ];
        let uniform = LightsUniform::from_lights(&lights);
        assert_eq!(uniform.lights[0].shadow_slot(), None);
        assert_eq!(uniform.lights[1].shadow_slot(), Some(1));
    }
}
