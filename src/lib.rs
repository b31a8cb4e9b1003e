//! Render Batcher - layered draw-command batching for a real-time render pass
//!
//! Callers submit meshes with a transform, a tint and a material each frame.
//! The pass groups them by depth layer, optionally sorts them, and packs
//! their vertex data into as few GPU buffers as it can, laid out the way the
//! bound shader declares.
//!
//! # Features
//! - 256 depth layers drawn back to front, or a single bucket under
//!   hardware depth testing
//! - Stable software sort by translation X/Y/Z or a packed command key
//! - Auto-batching of small meshes into shared pool buffers
//! - Dedicated, generation-checked buffers for large meshes (bounded LRU)
//! - Interleaved or separate vertex streams, resolved once per shader
//! - Frame replay on the thread that owns the graphics context

pub mod backend;
pub mod batch;
pub mod error;
pub mod pass;
pub mod resources;

pub use error::{RenderError, RenderResult, ReserveError};
pub use pass::{
    ContextQueue, DrawFrame, FrameExecutor, FrameReport, FrameState, Immediate, RenderPass,
    SoftwareSort,
};

use backend::CompareFunction;

/// Configuration for a [`RenderPass`]
#[derive(Debug, Clone)]
pub struct RenderPassConfig {
    /// Meshes with more vertices than this get a dedicated cached buffer
    pub cache_threshold: usize,
    /// Vertices per pool buffer
    pub pool_vertex_capacity: usize,
    /// Indices per pool buffer
    pub pool_index_capacity: usize,
    /// Pool buffers allowed per frame before batching fails
    pub max_pool_buffers: usize,
    /// Cached meshes kept before least recently used ones are evicted
    pub max_cached_meshes: usize,
    /// Use the hardware depth test instead of layer buckets
    pub depth_test: bool,
    pub depth_compare: CompareFunction,
    pub software_sort: SoftwareSort,
    /// Treat a uniform rejected by the shader as a frame-aborting error
    pub strict_uniforms: bool,
}

impl Default for RenderPassConfig {
    fn default() -> Self {
        Self {
            cache_threshold: 4096,
            pool_vertex_capacity: 16384,
            pool_index_capacity: 49152,
            max_pool_buffers: 64,
            max_cached_meshes: 256,
            depth_test: false,
            depth_compare: CompareFunction::LessEqual,
            software_sort: SoftwareSort::None,
            strict_uniforms: false,
        }
    }
}

impl RenderPassConfig {
    pub fn with_cache_threshold(mut self, vertices: usize) -> Self {
        self.cache_threshold = vertices;
        self
    }

    pub fn with_pool_capacity(mut self, vertices: usize, indices: usize) -> Self {
        self.pool_vertex_capacity = vertices;
        self.pool_index_capacity = indices;
        self
    }

    pub fn with_max_pool_buffers(mut self, buffers: usize) -> Self {
        self.max_pool_buffers = buffers;
        self
    }

    pub fn with_max_cached_meshes(mut self, meshes: usize) -> Self {
        self.max_cached_meshes = meshes;
        self
    }

    pub fn with_depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }

    pub fn with_depth_compare(mut self, compare: CompareFunction) -> Self {
        self.depth_compare = compare;
        self
    }

    pub fn with_software_sort(mut self, sort: SoftwareSort) -> Self {
        self.software_sort = sort;
        self
    }

    pub fn with_strict_uniforms(mut self, strict: bool) -> Self {
        self.strict_uniforms = strict;
        self
    }

    /// Check that every mesh routed to the pool fits an empty pool buffer
    pub fn validate(&self) -> RenderResult<()> {
        if self.pool_vertex_capacity == 0 || self.pool_index_capacity == 0 {
            return Err(RenderError::InvalidConfig(
                "pool buffers need a non-zero capacity".to_string(),
            ));
        }
        if self.cache_threshold > self.pool_vertex_capacity {
            return Err(RenderError::InvalidConfig(format!(
                "cache threshold of {} vertices exceeds the pool buffer capacity of {}",
                self.cache_threshold, self.pool_vertex_capacity
            )));
        }
        // Indices are u32 and offset by the vertex position in the buffer.
        if u32::try_from(self.pool_vertex_capacity).is_err() {
            return Err(RenderError::InvalidConfig(format!(
                "pool buffer capacity of {} vertices is not addressable by u32 indices",
                self.pool_vertex_capacity
            )));
        }
        if self.max_pool_buffers == 0 {
            return Err(RenderError::InvalidConfig(
                "at least one pool buffer is required".to_string(),
            ));
        }
        if self.max_cached_meshes == 0 {
            return Err(RenderError::InvalidConfig(
                "at least one cached mesh is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RenderPassConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_threshold, 4096);
        assert_eq!(config.max_cached_meshes, 256);
    }

    #[test]
    fn test_threshold_above_pool_capacity_rejected() {
        let config = RenderPassConfig::default()
            .with_pool_capacity(1024, 3072)
            .with_cache_threshold(2048);
        assert!(matches!(
            config.validate(),
            Err(RenderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_pool_buffers_rejected() {
        let config = RenderPassConfig::default().with_max_pool_buffers(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_cached_meshes_rejected() {
        let config = RenderPassConfig::default().with_max_cached_meshes(0);
        assert!(matches!(
            config.validate(),
            Err(RenderError::InvalidConfig(_))
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_pool_capacity_beyond_u32_rejected() {
        let vertices = u32::MAX as usize + 1;
        let config = RenderPassConfig::default().with_pool_capacity(vertices, 6);
        assert!(matches!(
            config.validate(),
            Err(RenderError::InvalidConfig(_))
        ));
        let edge = RenderPassConfig::default().with_pool_capacity(u32::MAX as usize, 6);
        assert!(edge.validate().is_ok());
    }
}
