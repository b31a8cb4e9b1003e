//! Vertex layout definitions declared by shaders.
//!
//! A layout describes which mesh channels a shader consumes and where each
//! one lands in the vertex streams the batcher fills:
//!
//! - **Interleaved**: one stream, every attribute at its own offset inside a
//!   shared stride.
//! - **Separate**: one stream per attribute, each with its own stride.
//!
//! Any mix of the two is allowed. Attributes reference their stream via
//! `buffer_index`.
//!
//! # Example
//!
//! ```ignore
//! // Positions in their own stream, color + uv interleaved in a second one
//! let layout = Arc::new(VertexLayout::new()
//!     .with_buffer(VertexBufferLayout::new(12))
//!     .with_buffer(VertexBufferLayout::new(24))
//!     .with_attribute(VertexAttribute::position(0).at_buffer(0))
//!     .with_attribute(VertexAttribute::color(0).at_buffer(1))
//!     .with_attribute(VertexAttribute::texcoord0(16).at_buffer(1)));
//! ```

use std::sync::Arc;

/// Semantic meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    /// Vertex position (float2 or float3).
    Position,
    /// Vertex normal (float3).
    Normal,
    /// Vertex tangent.
    Tangent,
    /// Texture coordinates set 0 (float2).
    TexCoord0,
    /// Texture coordinates set 1.
    TexCoord1,
    /// Vertex color (float to float4).
    Color,
    /// Bone indices for skinning.
    Joints,
    /// Bone weights for skinning.
    Weights,
}

/// Format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Four 32-bit unsigned integers.
    Uint4,
    /// Four 8-bit unsigned integers (normalized to 0.0-1.0).
    Unorm8x4,
}

impl AttributeFormat {
    /// Size in bytes of this format.
    pub fn size(&self) -> usize {
        match self {
            Self::Float | Self::Unorm8x4 => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 | Self::Uint4 => 16,
        }
    }

    /// Number of float components, if this is a float format.
    pub fn float_components(&self) -> Option<usize> {
        match self {
            Self::Float => Some(1),
            Self::Float2 => Some(2),
            Self::Float3 => Some(3),
            Self::Float4 => Some(4),
            Self::Uint4 | Self::Unorm8x4 => None,
        }
    }

    /// Float format with `components` components (1..=4).
    pub fn float(components: usize) -> Option<Self> {
        match components {
            1 => Some(Self::Float),
            2 => Some(Self::Float2),
            3 => Some(Self::Float3),
            4 => Some(Self::Float4),
            _ => None,
        }
    }
}

/// Describes a single vertex stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Stride in bytes between consecutive vertices.
    pub stride: u32,
}

impl VertexBufferLayout {
    pub fn new(stride: u32) -> Self {
        Self { stride }
    }
}

/// A single vertex attribute description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Semantic meaning of this attribute.
    pub semantic: AttributeSemantic,
    /// Data format of this attribute.
    pub format: AttributeFormat,
    /// Byte offset within the vertex stream.
    pub offset: u32,
    /// Index of the vertex stream this attribute is written to.
    pub buffer_index: u32,
}

impl VertexAttribute {
    pub fn new(
        semantic: AttributeSemantic,
        format: AttributeFormat,
        offset: u32,
        buffer_index: u32,
    ) -> Self {
        Self {
            semantic,
            format,
            offset,
            buffer_index,
        }
    }

    /// 2D position attribute (float2) at stream 0.
    pub fn position2(offset: u32) -> Self {
        Self::new(AttributeSemantic::Position, AttributeFormat::Float2, offset, 0)
    }

    /// 3D position attribute (float3) at stream 0.
    pub fn position(offset: u32) -> Self {
        Self::new(AttributeSemantic::Position, AttributeFormat::Float3, offset, 0)
    }

    /// Normal attribute (float3) at stream 0.
    pub fn normal(offset: u32) -> Self {
        Self::new(AttributeSemantic::Normal, AttributeFormat::Float3, offset, 0)
    }

    /// RGBA color attribute (float4) at stream 0.
    pub fn color(offset: u32) -> Self {
        Self::new(AttributeSemantic::Color, AttributeFormat::Float4, offset, 0)
    }

    /// Color attribute with 1 to 4 float channels at stream 0.
    ///
    /// Channel counts outside 1..=4 produce a `Uint4` attribute, which the
    /// batcher rejects when the layout is bound.
    pub fn color_channels(channels: usize, offset: u32) -> Self {
        let format = AttributeFormat::float(channels).unwrap_or(AttributeFormat::Uint4);
        Self::new(AttributeSemantic::Color, format, offset, 0)
    }

    /// Texcoord0 attribute (float2) at stream 0.
    pub fn texcoord0(offset: u32) -> Self {
        Self::new(AttributeSemantic::TexCoord0, AttributeFormat::Float2, offset, 0)
    }

    /// Set the stream index for this attribute.
    pub fn at_buffer(mut self, buffer_index: u32) -> Self {
        self.buffer_index = buffer_index;
        self
    }
}

/// Layout of vertex data across one or more streams.
///
/// Owned by a shader and typically shared via `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Descriptions of each vertex stream.
    pub buffers: Vec<VertexBufferLayout>,
    /// The vertex attributes, in declaration order.
    pub attributes: Vec<VertexAttribute>,
    /// Optional label for debugging.
    pub label: Option<String>,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            attributes: Vec::new(),
            label: None,
        }
    }

    /// Add a vertex stream.
    pub fn with_buffer(mut self, buffer: VertexBufferLayout) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Add a vertex attribute.
    pub fn with_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Stride for a specific stream, 0 if the stream does not exist.
    pub fn buffer_stride(&self, buffer_index: usize) -> u32 {
        self.buffers
            .get(buffer_index)
            .map(|b| b.stride)
            .unwrap_or(0)
    }

    pub fn has_semantic(&self, semantic: AttributeSemantic) -> bool {
        self.attributes.iter().any(|attr| attr.semantic == semantic)
    }

    /// Check that every attribute references an existing stream and fits
    /// inside that stream's stride.
    pub fn validate(&self) -> Result<(), String> {
        for attr in &self.attributes {
            let Some(buffer) = self.buffers.get(attr.buffer_index as usize) else {
                return Err(format!(
                    "Attribute {:?} references buffer {} but only {} buffers defined",
                    attr.semantic,
                    attr.buffer_index,
                    self.buffers.len()
                ));
            };
            let end = attr.offset as usize + attr.format.size();
            if end > buffer.stride as usize {
                return Err(format!(
                    "Attribute {:?} ends at byte {} past stride {} of buffer {}",
                    attr.semantic, end, buffer.stride, attr.buffer_index
                ));
            }
        }
        Ok(())
    }
}

impl Default for VertexLayout {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Common Layouts
// ============================================================================

impl VertexLayout {
    /// Position-only layout (12 bytes per vertex).
    pub fn position_only() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(12))
                .with_attribute(VertexAttribute::position(0))
                .with_label("position_only"),
        )
    }

    /// 2D sprite layout: float2 position + float4 color + float2 uv, interleaved (32 bytes).
    pub fn sprite() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(32))
                .with_attribute(VertexAttribute::position2(0))
                .with_attribute(VertexAttribute::color(8))
                .with_attribute(VertexAttribute::texcoord0(24))
                .with_label("sprite"),
        )
    }

    /// Lit mesh layout: position + normal + color + uv, interleaved (48 bytes).
    pub fn lit() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(48))
                .with_attribute(VertexAttribute::position(0))
                .with_attribute(VertexAttribute::normal(12))
                .with_attribute(VertexAttribute::color(24))
                .with_attribute(VertexAttribute::texcoord0(40))
                .with_label("lit"),
        )
    }

    /// Same channels as [`lit`](Self::lit), one stream per attribute.
    pub fn lit_separate() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(12))
                .with_buffer(VertexBufferLayout::new(12))
                .with_buffer(VertexBufferLayout::new(16))
                .with_buffer(VertexBufferLayout::new(8))
                .with_attribute(VertexAttribute::position(0).at_buffer(0))
                .with_attribute(VertexAttribute::normal(0).at_buffer(1))
                .with_attribute(VertexAttribute::color(0).at_buffer(2))
                .with_attribute(VertexAttribute::texcoord0(0).at_buffer(3))
                .with_label("lit_separate"),
        )
    }
}
