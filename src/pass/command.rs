//! Draw commands and their software sort keys

use std::cmp::Ordering;
use std::sync::Arc;

use glam::{Mat4, Vec4};

use crate::backend::MaterialId;
use crate::resources::Mesh;

/// Software ordering applied within each layer when depth testing is off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftwareSort {
    #[default]
    None,
    /// Descending by translation X
    X,
    /// Descending by translation Y
    Y,
    /// Descending by translation Z
    Z,
    /// Descending by the packed [`DrawCommand::command`] key
    Command,
}

/// One submission for the current frame
#[derive(Debug, Clone)]
pub struct DrawCommand {
    pub mesh: Arc<Mesh>,
    pub matrix: Mat4,
    pub tint: Vec4,
    pub material: MaterialId,
    pub layer: i8,
    /// Packed key: layer bucket, material, then translation Z
    pub command: u64,
    /// Position in the frame's submission order
    pub sequence: usize,
}

impl DrawCommand {
    pub fn new(mesh: Arc<Mesh>, matrix: Mat4, tint: Vec4, material: MaterialId, layer: i8) -> Self {
        let command = command_key(layer, material, matrix.w_axis.z);
        Self {
            mesh,
            matrix,
            tint,
            material,
            layer,
            command,
            sequence: 0,
        }
    }

    /// Descending order for `sort`.
    ///
    /// Floats use IEEE total order: NaN sorts above every number and `0.0`
    /// above `-0.0`.
    pub(crate) fn compare(&self, other: &Self, sort: SoftwareSort) -> Ordering {
        match sort {
            SoftwareSort::None => Ordering::Equal,
            SoftwareSort::X => other.matrix.w_axis.x.total_cmp(&self.matrix.w_axis.x),
            SoftwareSort::Y => other.matrix.w_axis.y.total_cmp(&self.matrix.w_axis.y),
            SoftwareSort::Z => other.matrix.w_axis.z.total_cmp(&self.matrix.w_axis.z),
            SoftwareSort::Command => other.command.cmp(&self.command),
        }
    }
}

/// Bucket index for a layer; higher layers get higher indices
pub fn layer_index(layer: i8) -> usize {
    (layer as i16 + 128) as usize
}

/// Pack a sort key so that unsigned comparison orders by layer bucket, then
/// material, then depth
pub fn command_key(layer: i8, material: MaterialId, depth: f32) -> u64 {
    let layer = (layer_index(layer) as u64) << 56;
    let material = u64::from(material.0 & 0x00FF_FFFF) << 32;
    layer | material | u64::from(ordered_bits(depth))
}

/// Map an `f32` to a `u32` whose unsigned order matches the float's total order
fn ordered_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}
