//! Plain data exchanged with the graphics context

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Opaque material identifier carried by draw commands.
///
/// A vertex buffer holds geometry for exactly one material, so a draw call
/// never has to switch materials mid-buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MaterialId(pub u32);

/// Value assigned to a named shader uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Uint(u32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

/// Compare function for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Depth test configuration applied before the pass draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthState {
    Disabled,
    Enabled(CompareFunction),
}

impl DepthState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, DepthState::Enabled(_))
    }
}
