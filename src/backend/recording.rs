//! Recording graphics backend for tests and headless runs.
//!
//! Nothing here touches a GPU. Every bind, upload and draw is appended to a
//! shared [`CallLog`] and traced through `log`, so a test can assert on the
//! exact sequence a render pass produced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::traits::{BufferHandle, GraphicsContext, RenderTarget, Shader, Texture};
use super::types::{DepthState, MaterialId, UniformValue};
use crate::batch::VertexBuffer;
use crate::error::{RenderError, RenderResult};
use crate::resources::VertexLayout;

/// One recorded collaborator call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    BindTarget(String),
    DepthState(DepthState),
    BindShader(String),
    SetUniform { name: String, accepted: bool },
    BindTexture { slot: u32, texture: String },
    Upload {
        handle: BufferHandle,
        revision: u64,
        vertices: usize,
        indices: usize,
    },
    Draw {
        handle: BufferHandle,
        material: Option<MaterialId>,
        indices: usize,
    },
    Release(BufferHandle),
}

/// Call sequence shared between a context and the objects it binds
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    /// Snapshot of every call recorded so far
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    /// Handles drawn, in draw order
    pub fn draws(&self) -> Vec<BufferHandle> {
        self.0
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Draw { handle, .. } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    pub fn upload_count(&self) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::Upload { .. }))
            .count()
    }

    /// Handles released, in release order
    pub fn releases(&self) -> Vec<BufferHandle> {
        self.0
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Release(handle) => Some(*handle),
                _ => None,
            })
            .collect()
    }
}

/// [`GraphicsContext`] that tracks uploaded revisions and records calls
#[derive(Debug, Default)]
pub struct RecordingContext {
    log: CallLog,
    uploaded: HashMap<BufferHandle, u64>,
}

impl RecordingContext {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            uploaded: HashMap::new(),
        }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Number of buffers currently holding GPU storage
    pub fn resident_buffers(&self) -> usize {
        self.uploaded.len()
    }
}

impl GraphicsContext for RecordingContext {
    fn set_depth_state(&mut self, state: DepthState) {
        log::trace!("RecordingContext: depth state {:?}", state);
        self.log.push(Call::DepthState(state));
    }

    fn uploaded_revision(&self, handle: BufferHandle) -> Option<u64> {
        self.uploaded.get(&handle).copied()
    }

    fn upload_buffer(&mut self, buffer: &VertexBuffer) -> RenderResult<()> {
        log::trace!(
            "RecordingContext: uploading {:?} rev {} ({} vertices, {} indices)",
            buffer.handle(),
            buffer.revision(),
            buffer.vertex_count(),
            buffer.index_count()
        );
        self.uploaded.insert(buffer.handle(), buffer.revision());
        self.log.push(Call::Upload {
            handle: buffer.handle(),
            revision: buffer.revision(),
            vertices: buffer.vertex_count(),
            indices: buffer.index_count(),
        });
        Ok(())
    }

    fn draw_buffer(&mut self, buffer: &VertexBuffer) -> RenderResult<()> {
        if self.uploaded.get(&buffer.handle()) != Some(&buffer.revision()) {
            return Err(RenderError::Context {
                handle: buffer.handle(),
                reason: format!("revision {} was never uploaded", buffer.revision()),
            });
        }

        log::trace!(
            "RecordingContext: drawing {:?} ({} indices)",
            buffer.handle(),
            buffer.index_count()
        );
        self.log.push(Call::Draw {
            handle: buffer.handle(),
            material: buffer.material(),
            indices: buffer.index_count(),
        });
        Ok(())
    }

    fn release_buffer(&mut self, handle: BufferHandle) {
        log::trace!("RecordingContext: releasing {:?}", handle);
        self.uploaded.remove(&handle);
        self.log.push(Call::Release(handle));
    }
}

/// Shader with a fixed layout and an optional set of known uniforms
#[derive(Debug)]
pub struct RecordingShader {
    name: String,
    layout: Arc<VertexLayout>,
    uniforms: Option<HashSet<String>>,
    log: CallLog,
}

impl RecordingShader {
    /// Shader that accepts every uniform
    pub fn new(name: &str, layout: Arc<VertexLayout>, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            layout,
            uniforms: None,
            log,
        }
    }

    /// Only accept uniforms with these names
    pub fn with_uniforms<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.uniforms = Some(names.into_iter().map(str::to_string).collect());
        self
    }
}

impl Shader for RecordingShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    fn bind(&self) {
        self.log.push(Call::BindShader(self.name.clone()));
    }

    fn set_uniform(&self, name: &str, value: &UniformValue) -> bool {
        let accepted = self
            .uniforms
            .as_ref()
            .map_or(true, |known| known.contains(name));
        log::trace!(
            "RecordingShader {}: uniform {} = {:?} ({})",
            self.name,
            name,
            value,
            if accepted { "accepted" } else { "rejected" }
        );
        self.log.push(Call::SetUniform {
            name: name.to_string(),
            accepted,
        });
        accepted
    }
}

#[derive(Debug)]
pub struct RecordingTexture {
    name: String,
    log: CallLog,
}

impl RecordingTexture {
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
        }
    }
}

impl Texture for RecordingTexture {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self, slot: u32) {
        self.log.push(Call::BindTexture {
            slot,
            texture: self.name.clone(),
        });
    }
}

#[derive(Debug)]
pub struct RecordingTarget {
    name: String,
    log: CallLog,
}

impl RecordingTarget {
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
        }
    }
}

impl RenderTarget for RecordingTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self) {
        self.log.push(Call::BindTarget(self.name.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_requires_current_upload() {
        let log = CallLog::new();
        let mut ctx = RecordingContext::new(log.clone());
        let buffer = VertexBuffer::new(&VertexLayout::position_only(), 4, 6);

        assert!(matches!(
            ctx.draw_buffer(&buffer),
            Err(RenderError::Context { .. })
        ));

        ctx.upload_buffer(&buffer).unwrap();
        assert_eq!(ctx.uploaded_revision(buffer.handle()), Some(buffer.revision()));
        ctx.draw_buffer(&buffer).unwrap();
        assert_eq!(log.draws(), vec![buffer.handle()]);
        assert_eq!(log.upload_count(), 1);
    }

    #[test]
    fn test_release_forgets_upload() {
        let mut ctx = RecordingContext::new(CallLog::new());
        let buffer = VertexBuffer::new(&VertexLayout::position_only(), 4, 6);
        ctx.upload_buffer(&buffer).unwrap();
        assert_eq!(ctx.resident_buffers(), 1);

        ctx.release_buffer(buffer.handle());
        assert_eq!(ctx.resident_buffers(), 0);
        assert_eq!(ctx.log().releases(), vec![buffer.handle()]);
    }

    #[test]
    fn test_shader_uniform_filter() {
        let log = CallLog::new();
        let shader = RecordingShader::new("flat", VertexLayout::position_only(), log.clone())
            .with_uniforms(["u_mvp"]);

        assert!(shader.set_uniform("u_mvp", &UniformValue::Float(1.0)));
        assert!(!shader.set_uniform("u_time", &UniformValue::Float(1.0)));
        assert_eq!(
            log.calls(),
            vec![
                Call::SetUniform {
                    name: "u_mvp".into(),
                    accepted: true
                },
                Call::SetUniform {
                    name: "u_time".into(),
                    accepted: false
                },
            ]
        );
    }
}
