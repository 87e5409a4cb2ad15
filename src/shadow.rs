//! Shadow map generation for directional, point and spot lights.
//!
//! Every enabled shadow-casting light among the first [`MAX_LIGHTS`] gets
//! its light-space projections recomputed every frame:
//!
//! - directional lights split the camera range into [`CASCADE_COUNT`]
//!   cascades, each fitted with a tight orthographic projection
//! - point lights render six 90° faces into a cube array layer
//! - spot lights render one perspective map matching their outer cone
//!
//! The light's slot in the light block selects its layers, so shading can
//! find a light's maps without any extra indirection.

use cgmath::{Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Transform, Vector3, Vector4};

use crate::{
    batches::InstanceBatches,
    camera::{CameraState, OPENGL_TO_WGPU_MATRIX},
    data_structures::{
        InstanceId,
        light::{Light, LightType, active_lights},
        material::SurfaceKind,
    },
    gpu::{GpuDevice, PipelineKey, TextureDesc, TextureHandle, TextureKind, UniformBlock},
    render::PassKind,
    settings::{CASCADE_COUNT, MAX_LIGHTS, RenderSettings},
    stages::StageContext,
};

/// Near plane of point and spot shadow projections.
const LIGHT_NEAR: f32 = 0.1;

/// Computes cascade far distances with the practical split scheme.
///
/// `lambda` blends between uniform (`0.0`) and logarithmic (`1.0`)
/// distribution. The last split is always `far`.
pub fn cascade_splits(near: f32, far: f32, lambda: f32) -> [f32; CASCADE_COUNT] {
    let near = near.max(1e-4);
    let far = if far > near { far } else { near + 1.0 };
    let mut splits = [0.0; CASCADE_COUNT];
    for (i, split) in splits.iter_mut().enumerate() {
        let p = (i + 1) as f32 / CASCADE_COUNT as f32;
        let log_split = near * (far / near).powf(p);
        let uni_split = near + (far - near) * p;
        *split = lambda * log_split + (1.0 - lambda) * uni_split;
    }
    splits[CASCADE_COUNT - 1] = far;
    splits
}

fn safe_up(direction: Vector3<f32>) -> Vector3<f32> {
    if direction.y.abs() > 0.99 {
        Vector3::unit_x()
    } else {
        Vector3::unit_y()
    }
}

fn safe_direction(direction: Vector3<f32>) -> Vector3<f32> {
    if direction.magnitude2() > 1e-6 {
        direction.normalize()
    } else {
        -Vector3::unit_z()
    }
}

/// World-space corners of the camera frustum between two view distances.
pub fn frustum_slice_corners(camera: &CameraState, slice_near: f32, slice_far: f32) -> [Point3<f32>; 8] {
    let tan_half_fov = (camera.projection.fovy.0 * 0.5).tan();
    let aspect = camera.projection.aspect;
    let inverse_view = camera.inverse_view();
    let mut corners = [Point3::origin(); 8];
    for (i, distance) in [slice_near, slice_far].into_iter().enumerate() {
        let h = tan_half_fov * distance;
        let w = h * aspect;
        for (j, (x, y)) in [(-w, -h), (w, -h), (w, h), (-w, h)].into_iter().enumerate() {
            corners[i * 4 + j] = inverse_view.transform_point(Point3::new(x, y, -distance));
        }
    }
    corners
}

/// Orthographic light-space view-projection tightly bounding `corners`.
///
/// The depth range is extended towards the light so casters outside the
/// camera slice still land in the map.
pub fn cascade_matrix(light_direction: Vector3<f32>, corners: &[Point3<f32>; 8]) -> Matrix4<f32> {
    let direction = safe_direction(light_direction);
    let center = Point3::centroid(corners);
    let light_view = Matrix4::look_at_rh(center - direction, center, safe_up(direction));

    let mut min = Vector3::new(f32::MAX, f32::MAX, f32::MAX);
    let mut max = Vector3::new(f32::MIN, f32::MIN, f32::MIN);
    for corner in corners {
        let p = light_view.transform_point(*corner);
        min = Vector3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
        max = Vector3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
    }
    let z_range = (max.z - min.z).max(1.0);
    max.z += z_range.max(50.0);
    min.z -= z_range;

    OPENGL_TO_WGPU_MATRIX * cgmath::ortho(min.x, max.x, min.y, max.y, -max.z, -min.z) * light_view
}

/// Look direction and up vector of each cube face in +X, -X, +Y, -Y, +Z, -Z order.
pub const CUBE_FACES: [(Vector3<f32>, Vector3<f32>); 6] = [
    (Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, -1.0, 0.0)),
    (Vector3::new(-1.0, 0.0, 0.0), Vector3::new(0.0, -1.0, 0.0)),
    (Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 0.0, 1.0)),
    (Vector3::new(0.0, -1.0, 0.0), Vector3::new(0.0, 0.0, -1.0)),
    (Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.0, -1.0, 0.0)),
    (Vector3::new(0.0, 0.0, -1.0), Vector3::new(0.0, -1.0, 0.0)),
];

/// Six 90° perspective view-projections around a point light. The far
/// plane is the light's radius.
pub fn point_matrices(position: Point3<f32>, radius: f32) -> [Matrix4<f32>; 6] {
    let projection = OPENGL_TO_WGPU_MATRIX
        * cgmath::perspective(Deg(90.0), 1.0, LIGHT_NEAR, radius.max(LIGHT_NEAR * 2.0));
    CUBE_FACES.map(|(direction, up)| projection * Matrix4::look_to_rh(position, direction, up))
}

/// Perspective view-projection covering a spot light's outer cone.
pub fn spot_matrix(position: Point3<f32>, direction: Vector3<f32>, outer_cutoff: f32, radius: f32) -> Matrix4<f32> {
    let direction = safe_direction(direction);
    let fov = (outer_cutoff * 2.0).clamp(0.1, std::f32::consts::PI - 0.01);
    let projection = OPENGL_TO_WGPU_MATRIX
        * cgmath::perspective(cgmath::Rad(fov), 1.0, LIGHT_NEAR, radius.max(LIGHT_NEAR * 2.0));
    projection * Matrix4::look_to_rh(position, direction, safe_up(direction))
}

/// The shadow block as laid out in the shaders. Matrices are indexed by
/// the owning light's slot.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowUniform {
    pub directional: [[[f32; 4]; 4]; MAX_LIGHTS * CASCADE_COUNT],
    pub spot: [[[f32; 4]; 4]; MAX_LIGHTS],
    pub point: [[[f32; 4]; 4]; MAX_LIGHTS * 6],
    /// View-space far distance of each cascade.
    pub cascade_splits: [[f32; CASCADE_COUNT]; MAX_LIGHTS],
    // bias, enabled, directional/spot texel size, point texel size
    pub params: [f32; 4],
}

impl Default for ShadowUniform {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// Light-space projections computed for one light this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LightShadow {
    pub slot: usize,
    pub kind: LightType,
    pub matrices: Vec<Matrix4<f32>>,
    /// Cascade far distances; empty for point and spot lights.
    pub splits: Vec<f32>,
}

/// Owns the depth targets and records one depth pass per light view.
#[derive(Debug)]
pub struct ShadowPass {
    directional_maps: TextureHandle,
    spot_maps: TextureHandle,
    point_maps: TextureHandle,
    uniform: ShadowUniform,
    lights: Vec<LightShadow>,
}

impl ShadowPass {
    pub fn new(device: &mut dyn GpuDevice, settings: &RenderSettings) -> Self {
        let directional_maps = device.create_texture(&TextureDesc {
            label: "Directional Shadow Maps",
            size: settings.shadow_map_size,
            kind: TextureKind::DepthArray {
                layers: (MAX_LIGHTS * CASCADE_COUNT) as u32,
            },
        });
        let spot_maps = device.create_texture(&TextureDesc {
            label: "Spot Shadow Maps",
            size: settings.shadow_map_size,
            kind: TextureKind::DepthArray {
                layers: MAX_LIGHTS as u32,
            },
        });
        let point_maps = device.create_texture(&TextureDesc {
            label: "Point Shadow Maps",
            size: settings.point_shadow_map_size,
            kind: TextureKind::DepthCubeArray {
                cubes: MAX_LIGHTS as u32,
            },
        });
        Self {
            directional_maps,
            spot_maps,
            point_maps,
            uniform: ShadowUniform::default(),
            lights: Vec::new(),
        }
    }

    pub fn directional_maps(&self) -> TextureHandle {
        self.directional_maps
    }

    pub fn spot_maps(&self) -> TextureHandle {
        self.spot_maps
    }

    pub fn point_maps(&self) -> TextureHandle {
        self.point_maps
    }

    pub fn uniform(&self) -> &ShadowUniform {
        &self.uniform
    }

    /// Shadows computed by the last [`record`](Self::record).
    pub fn lights(&self) -> &[LightShadow] {
        &self.lights
    }

    pub fn prepare(&self, device: &mut dyn GpuDevice) {
        crate::stages::prepare_pipelines(
            device,
            [
                PipelineKey::ShadowDepth { skinned: false },
                PipelineKey::ShadowDepth { skinned: true },
            ],
        );
    }

    /// Compute the projections of every shadow-casting light.
    pub fn compute(&mut self, lights: &[Light], camera: &CameraState, settings: &RenderSettings) {
        self.uniform = ShadowUniform::default();
        self.uniform.params = [
            settings.shadow_bias,
            1.0,
            1.0 / settings.shadow_map_size.max(1) as f32,
            1.0 / settings.point_shadow_map_size.max(1) as f32,
        ];
        self.lights.clear();
        for (slot, light) in active_lights(lights).enumerate() {
            if !light.cast_shadows {
                continue;
            }
            let shadow = match light.kind {
                LightType::Directional => {
                    let splits = cascade_splits(
                        camera.projection.znear,
                        camera.projection.zfar,
                        settings.cascade_lambda,
                    );
                    let mut slice_near = camera.projection.znear;
                    let mut matrices = Vec::with_capacity(CASCADE_COUNT);
                    for (cascade, split) in splits.iter().enumerate() {
                        let corners = frustum_slice_corners(camera, slice_near, *split);
                        let matrix = cascade_matrix(light.direction, &corners);
                        self.uniform.directional[slot * CASCADE_COUNT + cascade] = matrix.into();
                        matrices.push(matrix);
                        slice_near = *split;
                    }
                    self.uniform.cascade_splits[slot] = splits;
                    LightShadow {
                        slot,
                        kind: light.kind,
                        matrices,
                        splits: splits.to_vec(),
                    }
                }
                LightType::Point => {
                    let matrices = point_matrices(light.position, light.radius);
                    for (face, matrix) in matrices.iter().enumerate() {
                        self.uniform.point[slot * 6 + face] = (*matrix).into();
                    }
                    LightShadow {
                        slot,
                        kind: light.kind,
                        matrices: matrices.to_vec(),
                        splits: Vec::new(),
                    }
                }
                LightType::Spot => {
                    let matrix = spot_matrix(light.position, light.direction, light.outer_cutoff, light.radius);
                    self.uniform.spot[slot] = matrix.into();
                    LightShadow {
                        slot,
                        kind: light.kind,
                        matrices: vec![matrix],
                        splits: Vec::new(),
                    }
                }
            };
            self.lights.push(shadow);
        }
    }

    /// Compute this frame's projections, upload the shadow block and record
    /// a depth pass for every light view.
    pub fn record(&mut self, ctx: &mut StageContext<'_>) {
        self.compute(ctx.scene.lights(), ctx.camera, ctx.settings);
        ctx.device
            .write_uniform(UniformBlock::Shadows, bytemuck::bytes_of(&self.uniform));

        let casters = shadow_casters(ctx.batches);
        for light in &self.lights {
            for (i, matrix) in light.matrices.iter().enumerate() {
                let (target, layer) = match light.kind {
                    LightType::Directional => (self.directional_maps, light.slot * CASCADE_COUNT + i),
                    LightType::Point => (self.point_maps, light.slot * 6 + i),
                    LightType::Spot => (self.spot_maps, light.slot),
                };
                let view = ctx.frame.push_shadow_view((*matrix).into());
                ctx.frame.begin_pass(
                    format!("{:?} Shadow {} View {}", light.kind, light.slot, i),
                    PassKind::ShadowDepth {
                        target,
                        layer: layer as u32,
                        view,
                    },
                );
                for (skinned, ids) in [(false, &casters.0), (true, &casters.1)] {
                    if ids.is_empty() {
                        continue;
                    }
                    ctx.bind(PipelineKey::ShadowDepth { skinned });
                    for id in ids {
                        ctx.draw_instance(*id);
                    }
                }
            }
        }
    }

    /// Upload a shadow block that turns shadow lookups off.
    pub fn disable(&mut self, device: &mut dyn GpuDevice) {
        self.uniform = ShadowUniform::default();
        self.lights.clear();
        device.write_uniform(UniformBlock::Shadows, bytemuck::bytes_of(&self.uniform));
    }
}

/// Opaque instances, static and skinned, in registration order.
fn shadow_casters(batches: &InstanceBatches) -> (Vec<InstanceId>, Vec<InstanceId>) {
    let opaque = |id: &&InstanceId| {
        batches
            .get(**id)
            .is_some_and(|instance| instance.resolve_material().surface == SurfaceKind::Opaque)
    };
    (
        batches.all_meshes().iter().filter(opaque).copied().collect(),
        batches.all_skinned().iter().filter(opaque).copied().collect(),
    )
}

/// Transform a point by a light matrix into normalised device coordinates.
pub fn project(matrix: &Matrix4<f32>, point: Point3<f32>) -> Point3<f32> {
    let clip = *matrix * Vector4::new(point.x, point.y, point.z, 1.0);
    Point3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
}
