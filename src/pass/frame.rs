//! Handing a batched frame to the thread that owns the graphics context.
//!
//! Batching happens on the producer thread. Everything the context needs to
//! replay the frame is captured in a [`DrawFrame`]: the bound objects, the
//! uniform and texture state, and `Arc` snapshots of the buffers to draw.
//! A [`FrameExecutor`] decides where that replay runs.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{
    BufferHandle, DepthState, GraphicsContext, RenderTarget, Shader, Texture, UniformValue,
};
use crate::batch::VertexBuffer;
use crate::error::{RenderError, RenderResult};

/// What executing a frame cost on the context side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: usize,
    pub uploads: usize,
    pub uploads_skipped: usize,
    pub rejected_uniforms: usize,
}

/// A fully batched frame, ready to replay against a graphics context
pub struct DrawFrame {
    pub(crate) target: Arc<dyn RenderTarget>,
    pub(crate) shader: Arc<dyn Shader>,
    pub(crate) depth: DepthState,
    pub(crate) uniforms: Vec<(String, UniformValue)>,
    pub(crate) textures: Vec<(u32, Arc<dyn Texture>)>,
    pub(crate) buffers: Vec<Arc<VertexBuffer>>,
    pub(crate) released: Vec<BufferHandle>,
    pub(crate) strict_uniforms: bool,
}

impl DrawFrame {
    /// Handles in draw order
    pub fn handles(&self) -> Vec<BufferHandle> {
        self.buffers.iter().map(|b| b.handle()).collect()
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    /// Bind state and issue one draw per buffer.
    ///
    /// Buffers whose current revision is already on the GPU are drawn
    /// without re-uploading.
    pub fn execute(&self, ctx: &mut dyn GraphicsContext) -> RenderResult<FrameStats> {
        let mut stats = FrameStats::default();

        for &handle in &self.released {
            ctx.release_buffer(handle);
        }

        self.target.bind();
        ctx.set_depth_state(self.depth);
        self.shader.bind();

        for (name, value) in &self.uniforms {
            if self.shader.set_uniform(name, value) {
                continue;
            }
            if self.strict_uniforms {
                log::error!(
                    "shader {} rejected uniform {name}, aborting frame",
                    self.shader.name()
                );
                return Err(RenderError::UniformRejected(name.clone()));
            }
            log::warn!("shader {} rejected uniform {name}", self.shader.name());
            stats.rejected_uniforms += 1;
        }

        for (slot, texture) in &self.textures {
            texture.bind(*slot);
        }

        for buffer in &self.buffers {
            if ctx.uploaded_revision(buffer.handle()) == Some(buffer.revision()) {
                stats.uploads_skipped += 1;
            } else {
                ctx.upload_buffer(buffer)?;
                stats.uploads += 1;
            }
            ctx.draw_buffer(buffer)?;
            stats.draw_calls += 1;
        }

        Ok(stats)
    }
}

/// Where a batched frame gets replayed
pub trait FrameExecutor {
    /// Run or enqueue `frame`.
    ///
    /// Returns the stats when the frame ran before returning.
    fn submit(&mut self, frame: DrawFrame) -> RenderResult<Option<FrameStats>>;
}

/// Replays frames on the calling thread
pub struct Immediate<'a> {
    ctx: &'a mut dyn GraphicsContext,
}

impl<'a> Immediate<'a> {
    pub fn new(ctx: &'a mut dyn GraphicsContext) -> Self {
        Self { ctx }
    }
}

impl FrameExecutor for Immediate<'_> {
    fn submit(&mut self, frame: DrawFrame) -> RenderResult<Option<FrameStats>> {
        frame.execute(&mut *self.ctx).map(Some)
    }
}

/// Queue of frames waiting for the context thread.
///
/// Clones share the same queue. The producer submits through the
/// [`FrameExecutor`] impl; the thread owning the context calls
/// [`drain`](Self::drain).
#[derive(Clone, Default)]
pub struct ContextQueue {
    frames: Arc<Mutex<VecDeque<DrawFrame>>>,
}

impl ContextQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames submitted and not yet drained
    pub fn pending(&self) -> usize {
        self.frames.lock().len()
    }

    /// Execute queued frames in submission order.
    ///
    /// Stops at the first failing frame; frames behind it stay queued.
    pub fn drain(&self, ctx: &mut dyn GraphicsContext) -> RenderResult<Vec<FrameStats>> {
        let mut done = Vec::new();
        // Lock only long enough to pop, so the producer is never blocked on a draw.
        while let Some(frame) = self.pop() {
            done.push(frame.execute(ctx)?);
        }
        Ok(done)
    }

    fn pop(&self) -> Option<DrawFrame> {
        self.frames.lock().pop_front()
    }
}

impl FrameExecutor for ContextQueue {
    fn submit(&mut self, frame: DrawFrame) -> RenderResult<Option<FrameStats>> {
        let mut frames = self.frames.lock();
        frames.push_back(frame);
        log::trace!("ContextQueue: {} frames pending", frames.len());
        Ok(None)
    }
}
