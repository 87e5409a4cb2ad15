//! Camera, projection and the camera uniform block.
//!
//! The camera is an explicit value handed to every frame through
//! [`RenderParams`](crate::system::RenderParams); there is no globally active
//! camera.

use cgmath::{Angle, InnerSpace, Matrix3, Matrix4, Point3, Rad, SquareMatrix, Vector3};

/// cgmath produces OpenGL clip space (z in -1..1); wgpu expects z in 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// A free-flying camera described by position, yaw and pitch.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Point3<f32>,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
}

impl Camera {
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
        }
    }

    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vector3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize()
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Projection {
    pub aspect: f32,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Everything the frame derives from the active camera, computed once per
/// frame and passed by reference to stages and the shadow pass.
#[derive(Clone, Copy, Debug)]
pub struct CameraState {
    pub position: Point3<f32>,
    pub view: Matrix4<f32>,
    pub projection: Projection,
    pub proj_matrix: Matrix4<f32>,
    pub view_proj: Matrix4<f32>,
    /// View-projection with the view translation stripped, for the skybox.
    pub skybox_view_proj: Matrix4<f32>,
}

impl CameraState {
    pub fn new(camera: &Camera, projection: &Projection) -> Self {
        let view = camera.calc_matrix();
        let proj_matrix = projection.calc_matrix();
        let rotation_only = Matrix4::from(Matrix3::from_cols(
            view.x.truncate(),
            view.y.truncate(),
            view.z.truncate(),
        ));
        Self {
            position: camera.position,
            view,
            projection: *projection,
            proj_matrix,
            view_proj: proj_matrix * view,
            skybox_view_proj: proj_matrix * rotation_only,
        }
    }

    pub fn distance2(&self, point: Point3<f32>) -> f32 {
        (point - self.position).magnitude2()
    }

    pub fn inverse_view(&self) -> Matrix4<f32> {
        self.view.invert().unwrap_or_else(Matrix4::identity)
    }

    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            view_proj: self.view_proj.into(),
            view: self.view.into(),
            skybox_view_proj: self.skybox_view_proj.into(),
            position: self.position.to_homogeneous().into(),
            planes: [
                self.projection.znear,
                self.projection.zfar,
                self.projection.aspect,
                0.0,
            ],
        }
    }
}

/// The camera block as laid out in the shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    // Rows are used for linear view-space depth when selecting cascades
    pub view: [[f32; 4]; 4],
    pub skybox_view_proj: [[f32; 4]; 4],
    pub position: [f32; 4],
    // near, far, aspect, unused
    pub planes: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_proj: Matrix4::identity().into(),
            view: Matrix4::identity().into(),
            skybox_view_proj: Matrix4::identity().into(),
            position: [0.0; 4],
            planes: [0.1, 100.0, 1.0, 0.0],
        }
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}
