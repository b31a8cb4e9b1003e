//! Pool of shared vertex buffers for auto-batching small meshes.
//!
//! Small meshes are packed one after another into the active buffer. When a
//! mesh does not fit, or uses a different material, the pool rotates to the
//! next buffer, allocating a new one if none is left. [`clear`] rewinds the
//! pool at the start of a frame without freeing any storage.
//!
//! Buffers are held in `Arc`s so a finished frame can keep drawing from them
//! while the next frame is being batched; writing to a buffer that is still
//! shared clones it first.
//!
//! [`clear`]: BufferPool::clear

use std::sync::Arc;

use super::buffer::{Reservation, VertexBuffer};
use crate::backend::{BufferHandle, MaterialId};
use crate::error::{RenderError, RenderResult};
use crate::resources::{Mesh, VertexLayout};

pub struct BufferPool {
    layout: Arc<VertexLayout>,
    buffers: Vec<Arc<VertexBuffer>>,
    active: usize,
    vertex_capacity: usize,
    index_capacity: usize,
    max_buffers: usize,
}

impl BufferPool {
    pub fn new(
        layout: Arc<VertexLayout>,
        vertex_capacity: usize,
        index_capacity: usize,
        max_buffers: usize,
    ) -> Self {
        Self {
            layout,
            buffers: Vec::new(),
            active: 0,
            vertex_capacity,
            index_capacity,
            max_buffers,
        }
    }

    pub fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    pub fn index_capacity(&self) -> usize {
        self.index_capacity
    }

    /// Number of buffers allocated so far
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Whether an empty pool buffer could hold this mesh
    pub fn can_hold(&self, mesh: &Mesh) -> bool {
        mesh.vertex_count() <= self.vertex_capacity && mesh.index_count() <= self.index_capacity
    }

    /// The buffer currently being written, if it has been allocated
    pub fn active(&self) -> Option<&Arc<VertexBuffer>> {
        self.buffers.get(self.active)
    }

    /// Index of the active buffer; may equal [`buffer_count`](Self::buffer_count)
    /// right after a rotation
    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn buffer(&self, index: usize) -> Option<&Arc<VertexBuffer>> {
        self.buffers.get(index)
    }

    pub fn active_handle(&self) -> Option<BufferHandle> {
        self.active().map(|b| b.handle())
    }

    /// Rewind to the first buffer and forget all written geometry
    pub fn clear(&mut self) {
        let used = (self.active + 1).min(self.buffers.len());
        for buffer in &mut self.buffers[..used] {
            if !buffer.is_empty() {
                writable(buffer).clear();
            }
        }
        self.active = 0;
    }

    /// Move to a buffer with nothing written to it yet.
    ///
    /// Keeps geometry written after this call out of any buffer that
    /// already made it into the draw list. Returns whether the pool rotated;
    /// an active buffer that is still empty is already clean.
    pub fn goto_next_clean(&mut self) -> bool {
        match self.buffers.get(self.active) {
            Some(buffer) if !buffer.is_empty() => {
                self.active += 1;
                log::debug!("BufferPool: rotated to clean buffer {}", self.active);
                true
            }
            _ => false,
        }
    }

    /// Reserve room for `mesh` drawn with `material` in the active buffer,
    /// rotating first if it lacks room or holds another material.
    pub fn reserve(&mut self, mesh: &Mesh, material: MaterialId) -> RenderResult<Reservation<'_>> {
        let vertices = mesh.vertex_count();
        let indices = mesh.index_count();
        if !self.can_hold(mesh) {
            return Err(RenderError::ExceedsPoolCapacity {
                mesh: mesh.id(),
                vertices,
                indices,
            });
        }

        let needs_rotation = match self.buffers.get(self.active) {
            Some(buffer) => {
                !buffer.is_empty()
                    && (!buffer.fits(vertices, indices) || buffer.material() != Some(material))
            }
            None => false,
        };
        if needs_rotation {
            self.active += 1;
            log::debug!("BufferPool: rotated to buffer {}", self.active);
        }

        let buffer = self.active_mut()?;
        buffer
            .reserve(material, vertices, indices)
            .map_err(|_| RenderError::ExceedsPoolCapacity {
                mesh: mesh.id(),
                vertices,
                indices,
            })
    }

    /// Drop every buffer, e.g. because the vertex layout changed.
    ///
    /// Returns the handles whose GPU storage should be released.
    pub fn reset(&mut self, layout: Arc<VertexLayout>) -> Vec<BufferHandle> {
        self.layout = layout;
        self.active = 0;
        self.buffers.drain(..).map(|b| b.handle()).collect()
    }

    fn active_mut(&mut self) -> RenderResult<&mut VertexBuffer> {
        while self.buffers.len() <= self.active {
            if self.buffers.len() >= self.max_buffers {
                log::error!(
                    "BufferPool: exhausted after {} buffers of {} vertices",
                    self.buffers.len(),
                    self.vertex_capacity
                );
                return Err(RenderError::PoolExhausted {
                    buffers: self.buffers.len(),
                });
            }
            let buffer = VertexBuffer::new(&self.layout, self.vertex_capacity, self.index_capacity);
            log::debug!(
                "BufferPool: allocated buffer {:?} ({} vertices, {} indices)",
                buffer.handle(),
                self.vertex_capacity,
                self.index_capacity
            );
            self.buffers.push(Arc::new(buffer));
        }

        Ok(writable(&mut self.buffers[self.active]))
    }
}

/// Unique access to a pooled buffer, cloning it if a queued frame still
/// holds a reference.
pub(crate) fn writable(buffer: &mut Arc<VertexBuffer>) -> &mut VertexBuffer {
    if Arc::strong_count(buffer) > 1 {
        log::debug!(
            "buffer {:?} still referenced by a pending frame, copying before write",
            buffer.handle()
        );
    }
    Arc::make_mut(buffer)
}
