//! Collaborator traits the render pass draws through
//!
//! The pass never talks to a graphics API directly. Shaders, textures and
//! render targets are borrowed objects that know how to bind themselves, and
//! every buffer upload and draw call goes through a [`GraphicsContext`] that
//! lives on whichever thread owns the API context.

use crate::backend::types::*;
use crate::batch::VertexBuffer;
use crate::error::RenderResult;
use crate::resources::VertexLayout;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUFFER_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Handle to a GPU vertex/index buffer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    pub(crate) fn next() -> Self {
        Self(NEXT_BUFFER_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Shader program consumed by a render pass
pub trait Shader: Send + Sync {
    /// Name for logging
    fn name(&self) -> &str;

    /// Vertex attributes this shader expects, in declaration order
    fn layout(&self) -> &VertexLayout;

    /// Make this shader current
    fn bind(&self);

    /// Set a uniform on the bound shader.
    ///
    /// Returns `false` if the shader has no such uniform or the value has
    /// the wrong type.
    fn set_uniform(&self, name: &str, value: &UniformValue) -> bool;
}

/// Texture bound for the duration of a draw
pub trait Texture: Send + Sync {
    fn name(&self) -> &str;

    fn bind(&self, slot: u32);
}

/// Framebuffer or window surface the pass draws into
pub trait RenderTarget: Send + Sync {
    fn name(&self) -> &str;

    fn bind(&self);
}

/// The graphics API context.
///
/// Only ever called from the thread that owns the context; see
/// [`FrameExecutor`](crate::pass::FrameExecutor).
pub trait GraphicsContext {
    /// Enable or disable the hardware depth test
    fn set_depth_state(&mut self, state: DepthState);

    /// Revision of `handle`'s contents last uploaded, if any
    fn uploaded_revision(&self, handle: BufferHandle) -> Option<u64>;

    /// Copy the written part of `buffer` to GPU storage, creating the
    /// storage on first use of its handle
    fn upload_buffer(&mut self, buffer: &VertexBuffer) -> RenderResult<()>;

    /// Issue one indexed draw over the written part of `buffer`
    fn draw_buffer(&mut self, buffer: &VertexBuffer) -> RenderResult<()>;

    /// Free GPU storage for a buffer the pass no longer owns
    fn release_buffer(&mut self, handle: BufferHandle);
}
