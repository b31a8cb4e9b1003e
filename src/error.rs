//! Error types for batching and drawing a render pass

use crate::backend::BufferHandle;
use crate::resources::{AttributeFormat, AttributeSemantic, MeshId};
use thiserror::Error;

/// Why a buffer refused a reservation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveError {
    /// The buffer has no room left for the request
    #[error("buffer full: requested {vertices} vertices / {indices} indices, {free_vertices} / {free_indices} free")]
    Full {
        vertices: usize,
        indices: usize,
        free_vertices: usize,
        free_indices: usize,
    },
    /// The buffer already holds geometry for another material
    #[error("buffer holds material {held}, requested {requested}")]
    MaterialMismatch { held: u32, requested: u32 },
}

/// Render pass error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported vertex attribute {semantic:?} as {format:?} (slot {slot})")]
    UnsupportedAttribute {
        slot: usize,
        semantic: AttributeSemantic,
        format: AttributeFormat,
    },
    #[error("malformed mesh {mesh:?}: {reason}")]
    MalformedMesh { mesh: MeshId, reason: String },
    #[error("mesh {mesh:?} has no {channel} channel")]
    MissingChannel { mesh: MeshId, channel: &'static str },
    #[error("mesh {mesh:?} supplies {available} color channels, layout requests {requested}")]
    ColorChannels {
        mesh: MeshId,
        available: usize,
        requested: usize,
    },
    #[error("mesh {mesh:?} ({vertices} vertices, {indices} indices) does not fit an empty pool buffer")]
    ExceedsPoolCapacity {
        mesh: MeshId,
        vertices: usize,
        indices: usize,
    },
    #[error("buffer pool exhausted ({buffers} buffers in use)")]
    PoolExhausted { buffers: usize },
    #[error("cache rebuild for mesh {mesh:?} failed: {source}")]
    CacheRebuildFailed { mesh: MeshId, source: ReserveError },
    #[error("shader rejected uniform `{0}`")]
    UniformRejected(String),
    #[error("no render target bound to the pass")]
    NoTarget,
    #[error("graphics context failed on buffer {handle:?}: {reason}")]
    Context { handle: BufferHandle, reason: String },
}

impl RenderError {
    /// Whether this error aborts the frame.
    ///
    /// Everything the batcher reports is fatal except a rejected uniform,
    /// which is only returned when the pass runs with strict uniforms.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RenderError::UniformRejected(_))
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
