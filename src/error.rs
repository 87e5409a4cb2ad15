//! Recoverable render failures.
//!
//! Nothing in this crate surfaces these to the frame loop: every variant is
//! logged where it occurs and the frame carries on with degraded output
//! (missing geometry, unbound programs, an undefined target).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The buffer arena cannot fit `requested` more bytes.
    #[error("buffer arena exhausted: requested {requested} bytes, {remaining} of {capacity} left")]
    ArenaExhausted {
        requested: u64,
        remaining: u64,
        capacity: u64,
    },

    /// Every layer of the texture array is assigned.
    #[error("texture slots exhausted: all {capacity} layers are in use")]
    TextureSlotsExhausted { capacity: u32 },

    /// A removal referenced a resource that has no GPU record.
    #[error("{kind} {id} is not registered")]
    NotRegistered { kind: &'static str, id: u64 },

    /// The render target failed validation.
    #[error("incomplete render target: {0}")]
    IncompleteTarget(String),

    /// A shader module or pipeline failed to build.
    #[error("shader link failure for {pipeline}: {diagnostic}")]
    ShaderLink { pipeline: String, diagnostic: String },

    /// The presentation surface was lost or is outdated.
    #[error("surface lost: {0}")]
    SurfaceLost(String),
}
