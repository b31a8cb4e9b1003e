//! Vertex buffer batching
//!
//! Small meshes are packed into shared buffers from a [`BufferPool`]; large
//! ones get a dedicated buffer from the [`MeshBufferCache`]. Both write
//! geometry through the [`assembler`], which lays mesh channels out the way
//! the shader's [`VertexLayout`](crate::resources::VertexLayout) describes.

pub mod assembler;
mod buffer;
mod cache;
mod pool;

pub use assembler::{assemble, check_mesh, resolve_layout, AttributeWriter};
pub use buffer::{Reservation, VertexBuffer};
pub use cache::{CacheOutcome, MeshBufferCache};
pub use pool::BufferPool;
