//! The render pass: accumulate, sort, batch, draw.
//!
//! A frame goes through [`clear`](RenderPass::clear), a burst of
//! [`add`](RenderPass::add) calls, then [`draw`](RenderPass::draw) (which
//! batches if that has not happened yet). Batching routes every command
//! either to the shared [`BufferPool`] or to the [`MeshBufferCache`] and
//! records the resulting buffers in draw order.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Mat4, Vec4};

use super::command::{DrawCommand, SoftwareSort};
use super::frame::{DrawFrame, FrameExecutor, FrameStats};
use super::layers::CommandLayers;
use crate::backend::{
    BufferHandle, DepthState, MaterialId, RenderTarget, Shader, Texture, UniformValue,
};
use crate::batch::{
    assemble, check_mesh, resolve_layout, AttributeWriter, BufferPool, CacheOutcome,
    MeshBufferCache, VertexBuffer,
};
use crate::error::{RenderError, RenderResult};
use crate::resources::{Mesh, VertexLayout};
use crate::RenderPassConfig;

/// Where the pass is within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Accumulating,
    Sorted,
    Batched,
    Drawn,
}

/// Counters for the current frame, reset by [`RenderPass::clear`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub commands: usize,
    pub pool_commands: usize,
    pub cache_commands: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_rebuilds: usize,
    pub cache_evictions: usize,
    /// Times the assembler wrote a mesh into a buffer
    pub assembled: usize,
    /// Pool rotations forced ahead of a cached mesh
    pub clean_rotations: usize,
    pub draw_calls: usize,
    pub uploads: usize,
    pub uploads_skipped: usize,
    pub rejected_uniforms: usize,
}

impl FrameReport {
    fn absorb(&mut self, stats: FrameStats) {
        self.draw_calls += stats.draw_calls;
        self.uploads += stats.uploads;
        self.uploads_skipped += stats.uploads_skipped;
        self.rejected_uniforms += stats.rejected_uniforms;
    }
}

/// A buffer in the draw list, by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawSlot {
    Pool(usize),
    Cache(usize),
}

pub struct RenderPass {
    config: RenderPassConfig,
    shader: Arc<dyn Shader>,
    layout: Arc<VertexLayout>,
    writers: Vec<AttributeWriter>,
    layers: CommandLayers,
    layer: i8,
    uniforms: BTreeMap<String, UniformValue>,
    textures: BTreeMap<u32, Arc<dyn Texture>>,
    target: Option<Arc<dyn RenderTarget>>,
    pool: BufferPool,
    cache: MeshBufferCache,
    draw_list: Vec<DrawSlot>,
    released: Vec<BufferHandle>,
    state: FrameState,
    report: FrameReport,
}

impl RenderPass {
    /// Create a pass drawing with `shader`.
    ///
    /// Fails if the configuration is inconsistent or the shader's layout
    /// declares an attribute the assembler cannot write.
    pub fn new(shader: Arc<dyn Shader>, config: RenderPassConfig) -> RenderResult<Self> {
        config.validate()?;
        let layout = Arc::new(shader.layout().clone());
        let writers = resolve_layout(&layout)?;
        log::debug!(
            "RenderPass: shader {} with {} attributes over {} streams",
            shader.name(),
            writers.len(),
            layout.buffer_count()
        );

        let pool = BufferPool::new(
            layout.clone(),
            config.pool_vertex_capacity,
            config.pool_index_capacity,
            config.max_pool_buffers,
        );
        let cache = MeshBufferCache::new(config.max_cached_meshes);

        Ok(Self {
            config,
            shader,
            layout,
            writers,
            layers: CommandLayers::new(),
            layer: 0,
            uniforms: BTreeMap::new(),
            textures: BTreeMap::new(),
            target: None,
            pool,
            cache,
            draw_list: Vec::new(),
            released: Vec::new(),
            state: FrameState::Idle,
            report: FrameReport::default(),
        })
    }

    pub fn config(&self) -> &RenderPassConfig {
        &self.config
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Counters accumulated since the last [`clear`](Self::clear)
    pub fn report(&self) -> FrameReport {
        self.report
    }

    pub fn layer(&self) -> i8 {
        self.layer
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn cache(&self) -> &MeshBufferCache {
        &self.cache
    }

    /// Start a new frame. Allocations are kept.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.pool.clear();
        self.draw_list.clear();
        self.cache.begin_frame();
        self.report = FrameReport::default();
        self.state = FrameState::Idle;
    }

    /// Layer used by subsequent [`add`](Self::add) calls
    pub fn set_layer(&mut self, layer: i8) {
        self.layer = layer;
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.config.depth_test = enabled;
    }

    pub fn set_software_sort(&mut self, sort: SoftwareSort) {
        self.config.software_sort = sort;
    }

    /// Queue `mesh` for this frame on the current layer.
    ///
    /// Layer placement is settled in [`batch`](Self::batch), so the depth
    /// test toggle applies to the whole frame whenever it is flipped.
    pub fn add(&mut self, mesh: &Arc<Mesh>, matrix: Mat4, tint: Vec4, material: MaterialId) {
        let command = DrawCommand::new(mesh.clone(), matrix, tint, material, self.layer);
        self.layers.push(self.layer, command);
        self.state = FrameState::Accumulating;
    }

    /// Texture bound to `slot` for every draw until replaced
    pub fn set_texture(&mut self, slot: u32, texture: Arc<dyn Texture>) {
        self.textures.insert(slot, texture);
    }

    /// Uniform set on the shader at draw time
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.uniforms.insert(name.to_string(), value.into());
    }

    /// Target used by [`execute`](Self::execute)
    pub fn set_target(&mut self, target: Arc<dyn RenderTarget>) {
        self.target = Some(target);
    }

    /// Switch shaders. Pooled and cached geometry was laid out for the old
    /// shader, so all of it is dropped and released with the next frame.
    pub fn set_shader(&mut self, shader: Arc<dyn Shader>) -> RenderResult<()> {
        let layout = Arc::new(shader.layout().clone());
        let writers = resolve_layout(&layout)?;

        if *layout != *self.layout {
            self.released.extend(self.pool.reset(layout.clone()));
            self.cache.invalidate_all();
            self.draw_list.clear();
            log::debug!(
                "RenderPass: layout changed with shader {}, buffers dropped",
                shader.name()
            );
        }

        self.shader = shader;
        self.layout = layout;
        self.writers = writers;
        Ok(())
    }

    /// Sort each layer by the configured key. No-op under depth testing.
    pub fn sort_in_software(&mut self) {
        if !self.config.depth_test {
            self.layers.sort(self.config.software_sort);
        }
        if self.state == FrameState::Accumulating {
            self.state = FrameState::Sorted;
        }
    }

    /// Sort, then write every queued command into a pool or cache buffer.
    ///
    /// With depth testing on, every command shares one bucket in submission
    /// order and the layer is folded into the translation Z instead.
    ///
    /// Commands are consumed, so a second call without new
    /// [`add`](Self::add)s writes nothing. On error the rest of the frame
    /// is discarded and nothing batched so far will be drawn.
    pub fn batch(&mut self) -> RenderResult<()> {
        self.sort_in_software();

        let depth_test = self.config.depth_test;
        if depth_test {
            self.layers.collapse();
        }

        for mut command in self.layers.drain() {
            if depth_test {
                command.matrix.w_axis.z -= f32::from(command.layer);
            }
            if let Err(err) = self.batch_command(&command) {
                log::error!("RenderPass: aborting frame: {err}");
                self.draw_list.clear();
                self.state = FrameState::Idle;
                return Err(err);
            }
        }

        self.report.cache_evictions = self.cache.evictions();
        self.state = FrameState::Batched;
        Ok(())
    }

    fn batch_command(&mut self, command: &DrawCommand) -> RenderResult<()> {
        let mesh = command.mesh.as_ref();
        check_mesh(mesh)?;
        self.report.commands += 1;

        let cached = mesh.vertex_count() > self.config.cache_threshold
            || mesh.index_count() > self.pool.index_capacity();

        let slot = if cached {
            if self.pool.goto_next_clean() {
                self.report.clean_rotations += 1;
            }

            let writers = &self.writers;
            let mut assembled = 0;
            let (slot, outcome) =
                self.cache
                    .fetch(mesh, command.material, &self.layout, |reservation| {
                        assembled += 1;
                        assemble(writers, mesh, &command.matrix, command.tint, reservation)
                    })?;

            self.report.assembled += assembled;
            self.report.cache_commands += 1;
            match outcome {
                CacheOutcome::Hit => self.report.cache_hits += 1,
                CacheOutcome::Miss => self.report.cache_misses += 1,
                CacheOutcome::Rebuilt => self.report.cache_rebuilds += 1,
            }
            DrawSlot::Cache(slot)
        } else {
            let reservation = self.pool.reserve(mesh, command.material)?;
            assemble(
                &self.writers,
                mesh,
                &command.matrix,
                command.tint,
                reservation,
            )?;

            self.report.assembled += 1;
            self.report.pool_commands += 1;
            DrawSlot::Pool(self.pool.active_index())
        };

        if self.draw_list.last() != Some(&slot) {
            self.draw_list.push(slot);
        }
        Ok(())
    }

    /// Batch, then hand the frame to `executor` for drawing into `target`
    pub fn draw(
        &mut self,
        target: Arc<dyn RenderTarget>,
        executor: &mut dyn FrameExecutor,
    ) -> RenderResult<FrameReport> {
        self.batch()?;

        let frame = DrawFrame {
            target,
            shader: self.shader.clone(),
            depth: self.depth_state(),
            uniforms: self
                .uniforms
                .iter()
                .map(|(name, value)| (name.clone(), *value))
                .collect(),
            textures: self
                .textures
                .iter()
                .map(|(slot, texture)| (*slot, texture.clone()))
                .collect(),
            buffers: self.draw_buffers().cloned().collect(),
            released: self.take_released(),
            strict_uniforms: self.config.strict_uniforms,
        };

        log::trace!(
            "RenderPass: submitting {} buffers to {}",
            frame.buffers.len(),
            frame.target_name()
        );
        if let Some(stats) = executor.submit(frame)? {
            self.report.absorb(stats);
        }
        self.state = FrameState::Drawn;
        Ok(self.report)
    }

    /// [`draw`](Self::draw) into the target set with
    /// [`set_target`](Self::set_target)
    pub fn execute(&mut self, executor: &mut dyn FrameExecutor) -> RenderResult<FrameReport> {
        let target = self.target.clone().ok_or(RenderError::NoTarget)?;
        self.draw(target, executor)
    }

    /// Handles of the batched buffers, in draw order
    pub fn buffers_to_draw(&self) -> Vec<BufferHandle> {
        self.draw_buffers().map(|b| b.handle()).collect()
    }

    /// Batched buffers, in draw order
    pub fn draw_buffers(&self) -> impl Iterator<Item = &Arc<VertexBuffer>> {
        self.draw_list.iter().filter_map(|slot| match *slot {
            DrawSlot::Pool(index) => self.pool.buffer(index),
            DrawSlot::Cache(index) => self.cache.buffer(index),
        })
    }

    fn depth_state(&self) -> DepthState {
        if self.config.depth_test {
            DepthState::Enabled(self.config.depth_compare)
        } else {
            DepthState::Disabled
        }
    }

    fn take_released(&mut self) -> Vec<BufferHandle> {
        let mut released = std::mem::take(&mut self.released);
        released.extend(self.cache.take_released());
        released
    }
}
