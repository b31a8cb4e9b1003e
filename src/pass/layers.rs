//! Per-layer command buckets.
//!
//! 256 buckets, one per `i8` layer. Buckets are drawn from the highest layer
//! down, so layer 0 ends up on top of layer 5 under the painter's algorithm.
//! Sorting only ever reorders commands inside one bucket.

use super::command::{layer_index, DrawCommand, SoftwareSort};

pub const LAYER_COUNT: usize = 256;

pub struct CommandLayers {
    buckets: Vec<Vec<DrawCommand>>,
    len: usize,
}

impl CommandLayers {
    pub fn new() -> Self {
        Self {
            buckets: (0..LAYER_COUNT).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append to the bucket of `layer`, stamping the submission sequence
    pub fn push(&mut self, layer: i8, mut command: DrawCommand) {
        command.sequence = self.len;
        self.buckets[layer_index(layer)].push(command);
        self.len += 1;
    }

    /// Move every command into the layer 0 bucket in submission order
    pub fn collapse(&mut self) {
        let single = layer_index(0);
        if self.buckets[single].len() == self.len {
            return;
        }
        let mut commands = self.drain();
        commands.sort_by_key(|c| c.sequence);
        self.len = commands.len();
        self.buckets[single] = commands;
    }

    /// Empty every bucket, keeping allocations
    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(Vec::clear);
        self.len = 0;
    }

    /// Stable sort inside each bucket
    pub fn sort(&mut self, sort: SoftwareSort) {
        if sort == SoftwareSort::None {
            return;
        }
        for bucket in &mut self.buckets {
            bucket.sort_by(|a, b| a.compare(b, sort));
        }
    }

    /// Commands in draw order without consuming them
    pub fn iter(&self) -> impl Iterator<Item = &DrawCommand> {
        self.buckets.iter().rev().flatten()
    }

    /// Move every command out in draw order. Bucket capacity is kept.
    pub fn drain(&mut self) -> Vec<DrawCommand> {
        let mut commands = Vec::with_capacity(self.len);
        for bucket in self.buckets.iter_mut().rev() {
            commands.append(bucket);
        }
        self.len = 0;
        commands
    }
}

impl Default for CommandLayers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MaterialId;
    use crate::resources::Mesh;
    use glam::{Mat4, Vec3, Vec4};
    use std::sync::Arc;

    fn command(mesh: &Arc<Mesh>, z: f32, layer: i8) -> DrawCommand {
        DrawCommand::new(
            mesh.clone(),
            Mat4::from_translation(Vec3::new(0.0, 0.0, z)),
            Vec4::ONE,
            MaterialId(0),
            layer,
        )
    }

    #[test]
    fn test_draw_order_is_descending_by_layer() {
        let mesh = Arc::new(Mesh::quad());
        let mut layers = CommandLayers::new();
        layers.push(5, command(&mesh, 1.0, 5));
        layers.push(0, command(&mesh, 2.0, 0));
        layers.push(5, command(&mesh, 3.0, 5));
        layers.push(-3, command(&mesh, 4.0, -3));

        let order: Vec<f32> = layers.iter().map(|c| c.matrix.w_axis.z).collect();
        assert_eq!(order, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_sort_is_stable_within_layer() {
        let mesh = Arc::new(Mesh::quad());
        let mut layers = CommandLayers::new();
        for (tag, z, layer) in [(0.0, 1.0, 0), (1.0, 5.0, 0), (2.0, 1.0, 0), (3.0, 0.0, 1)] {
            let mut cmd = command(&mesh, z, layer);
            cmd.tint.x = tag;
            layers.push(layer, cmd);
        }

        layers.sort(SoftwareSort::Z);
        let order: Vec<f32> = layers.iter().map(|c| c.tint.x).collect();
        assert_eq!(order, vec![3.0, 1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_drain_empties_buckets() {
        let mesh = Arc::new(Mesh::quad());
        let mut layers = CommandLayers::new();
        layers.push(2, command(&mesh, 0.0, 2));
        layers.push(1, command(&mesh, 0.0, 1));

        let drained = layers.drain();
        assert_eq!(drained.iter().map(|c| c.layer).collect::<Vec<_>>(), vec![2, 1]);
        assert!(layers.is_empty());
        assert_eq!(layers.iter().count(), 0);
    }

    #[test]
    fn test_collapse_restores_submission_order() {
        let mesh = Arc::new(Mesh::quad());
        let mut layers = CommandLayers::new();
        layers.push(0, command(&mesh, 1.0, 0));
        layers.push(5, command(&mesh, 2.0, 5));
        layers.push(-2, command(&mesh, 3.0, -2));
        layers.push(5, command(&mesh, 4.0, 5));

        layers.collapse();
        assert_eq!(layers.len(), 4);
        let order: Vec<f32> = layers.iter().map(|c| c.matrix.w_axis.z).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(layers.drain().len(), 4);
    }
}
