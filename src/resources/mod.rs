//! Geometry inputs of the render pass
//!
//! Meshes supplied by the caller and the vertex layouts declared by shaders.

mod layout;
mod mesh;

pub use layout::*;
pub use mesh::*;
