//! What the render core reads from the scene layer each frame.

use cgmath::Matrix4;

use crate::data_structures::{InstanceId, SkeletonId, light::Light, particle::Particle};

/// Read-only view of the entity/component scene.
///
/// Queried every frame for every registered instance; implementations should
/// answer from already computed state.
pub trait SceneSource {
    fn world_transform(&self, id: InstanceId) -> Matrix4<f32>;

    fn is_active(&self, id: InstanceId) -> bool;

    /// Lights in declaration order.
    fn lights(&self) -> &[Light];

    /// Live particles of the emitter registered as `id`.
    fn particles(&self, _id: InstanceId) -> &[Particle] {
        &[]
    }

    /// Current pose of a skeleton, one matrix per joint. `None` keeps the
    /// pose uploaded last.
    fn joint_matrices(&self, _id: SkeletonId) -> Option<&[Matrix4<f32>]> {
        None
    }
}
