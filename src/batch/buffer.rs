//! CPU staging storage for one GPU vertex/index buffer pair.
//!
//! A [`VertexBuffer`] owns one byte stream per stream of the shader's
//! [`VertexLayout`] plus an index array, all allocated up front at a fixed
//! capacity. Geometry is appended by [`reserve`](VertexBuffer::reserve),
//! which hands back correctly sized destination slices; nothing grows after
//! construction.
//!
//! Every write bumps the buffer's revision. The graphics context compares
//! revisions to decide whether the GPU copy is stale.

use bytemuck::Pod;

use crate::backend::{BufferHandle, MaterialId};
use crate::error::ReserveError;
use crate::resources::{VertexAttribute, VertexLayout};

/// Destination region handed out by [`VertexBuffer::reserve`].
pub struct Reservation<'a> {
    /// Index of the first reserved vertex inside the buffer.
    pub base_vertex: u32,
    /// Number of reserved vertices.
    pub vertex_count: usize,
    /// One byte slice per vertex stream, exactly `vertex_count * stride` long.
    pub streams: Vec<&'a mut [u8]>,
    /// Stride of each stream in `streams`.
    pub strides: &'a [usize],
    /// Reserved index slots.
    pub indices: &'a mut [u32],
}

#[derive(Debug, Clone)]
pub struct VertexBuffer {
    handle: BufferHandle,
    material: Option<MaterialId>,
    streams: Vec<Vec<u8>>,
    strides: Vec<usize>,
    indices: Vec<u32>,
    vertex_capacity: usize,
    index_capacity: usize,
    vertex_cursor: usize,
    index_cursor: usize,
    revision: u64,
}

impl VertexBuffer {
    /// Allocate storage for `vertex_capacity` vertices laid out per `layout`
    /// and `index_capacity` indices.
    pub fn new(layout: &VertexLayout, vertex_capacity: usize, index_capacity: usize) -> Self {
        let strides: Vec<usize> = layout.buffers.iter().map(|b| b.stride as usize).collect();
        let streams = strides
            .iter()
            .map(|stride| vec![0u8; stride * vertex_capacity])
            .collect();

        Self {
            handle: BufferHandle::next(),
            material: None,
            streams,
            strides,
            indices: vec![0; index_capacity],
            vertex_capacity,
            index_capacity,
            vertex_cursor: 0,
            index_cursor: 0,
            revision: 0,
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Material of the geometry written so far, `None` while empty
    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_cursor
    }

    pub fn index_count(&self) -> usize {
        self.index_cursor
    }

    pub fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    pub fn index_capacity(&self) -> usize {
        self.index_capacity
    }

    pub fn is_empty(&self) -> bool {
        self.index_cursor == 0 && self.vertex_cursor == 0
    }

    /// Whether a reservation of this size fits in the remaining space
    pub fn fits(&self, vertices: usize, indices: usize) -> bool {
        self.vertex_cursor + vertices <= self.vertex_capacity
            && self.index_cursor + indices <= self.index_capacity
    }

    /// Whether this buffer could hold the request once cleared
    pub fn can_hold(&self, vertices: usize, indices: usize) -> bool {
        vertices <= self.vertex_capacity && indices <= self.index_capacity
    }

    /// Forget all written geometry. Storage is kept.
    pub fn clear(&mut self) {
        self.vertex_cursor = 0;
        self.index_cursor = 0;
        self.material = None;
        self.revision += 1;
    }

    /// Reserve room for `vertex_count` vertices and `index_count` indices
    /// drawn with `material`.
    pub fn reserve(
        &mut self,
        material: MaterialId,
        vertex_count: usize,
        index_count: usize,
    ) -> Result<Reservation<'_>, ReserveError> {
        if let Some(held) = self.material {
            if held != material && !self.is_empty() {
                return Err(ReserveError::MaterialMismatch {
                    held: held.0,
                    requested: material.0,
                });
            }
        }

        if !self.fits(vertex_count, index_count) {
            return Err(ReserveError::Full {
                vertices: vertex_count,
                indices: index_count,
                free_vertices: self.vertex_capacity - self.vertex_cursor,
                free_indices: self.index_capacity - self.index_cursor,
            });
        }

        let base_vertex = self.vertex_cursor;
        let base_index = self.index_cursor;
        self.vertex_cursor += vertex_count;
        self.index_cursor += index_count;
        self.material = Some(material);
        self.revision += 1;

        let streams = self
            .streams
            .iter_mut()
            .zip(&self.strides)
            .map(|(stream, stride)| {
                &mut stream[base_vertex * stride..(base_vertex + vertex_count) * stride]
            })
            .collect();

        Ok(Reservation {
            base_vertex: base_vertex as u32,
            vertex_count,
            streams,
            strides: &self.strides,
            indices: &mut self.indices[base_index..base_index + index_count],
        })
    }

    /// Written bytes of vertex stream `index`
    pub fn stream(&self, index: usize) -> &[u8] {
        match (self.streams.get(index), self.strides.get(index)) {
            (Some(stream), Some(stride)) => &stream[..self.vertex_cursor * stride],
            _ => &[],
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Written indices, already offset to this buffer's vertex range
    pub fn indices(&self) -> &[u32] {
        &self.indices[..self.index_cursor]
    }

    /// Decode every written value of `attribute` as `T`.
    ///
    /// Returns an empty vector if `T` does not fit the attribute's stream.
    pub fn read_attribute<T: Pod>(&self, attribute: &VertexAttribute) -> Vec<T> {
        let buffer_index = attribute.buffer_index as usize;
        let Some(&stride) = self.strides.get(buffer_index) else {
            return Vec::new();
        };
        let offset = attribute.offset as usize;
        let size = std::mem::size_of::<T>();
        if offset + size > stride {
            return Vec::new();
        }

        self.stream(buffer_index)
            .chunks_exact(stride)
            .map(|vertex| bytemuck::pod_read_unaligned(&vertex[offset..offset + size]))
            .collect()
    }
}
