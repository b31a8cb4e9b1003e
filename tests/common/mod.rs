//! Shared fixtures for render pass integration tests.

use std::sync::Arc;

use glam::{Vec3, Vec4};

use render_batcher::backend::{CallLog, RecordingContext, RecordingShader, RecordingTarget};
use render_batcher::resources::{AttributeSemantic, Colors, Mesh, MeshData, VertexLayout};
use render_batcher::{RenderPass, RenderPassConfig};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Recording collaborators sharing one call log
pub struct Harness {
    pub log: CallLog,
    pub ctx: RecordingContext,
    pub target: Arc<RecordingTarget>,
    pub layout: Arc<VertexLayout>,
}

impl Harness {
    pub fn new(layout: Arc<VertexLayout>) -> Self {
        init_logging();
        let log = CallLog::new();
        Self {
            ctx: RecordingContext::new(log.clone()),
            target: Arc::new(RecordingTarget::new("screen", log.clone())),
            layout,
            log,
        }
    }

    pub fn shader(&self) -> RecordingShader {
        RecordingShader::new("test", self.layout.clone(), self.log.clone())
    }

    pub fn pass(&self, config: RenderPassConfig) -> RenderPass {
        RenderPass::new(Arc::new(self.shader()), config).expect("valid pass")
    }
}

/// `vertices` vertices with awkward coordinates, consecutive triangles
pub fn strip_mesh(vertices: usize) -> Mesh {
    let positions: Vec<Vec3> = (0..vertices)
        .map(|i| {
            let i = i as f32;
            Vec3::new(0.1 * i + 1.0e-7, 1.0 / (i + 3.0), -0.3 * i)
        })
        .collect();
    let indices = (0..(vertices / 3 * 3) as u32).collect();
    Mesh::new(
        "strip",
        MeshData {
            colors: Some(Colors::Rgba(vec![Vec4::ONE; vertices])),
            positions,
            indices,
            ..Default::default()
        },
    )
}

/// Decode the positions written into `buffer`'s first position attribute
pub fn positions(layout: &VertexLayout, buffer: &render_batcher::batch::VertexBuffer) -> Vec<Vec3> {
    layout
        .attributes
        .iter()
        .find(|a| a.semantic == AttributeSemantic::Position)
        .map(|attribute| buffer.read_attribute(attribute))
        .unwrap_or_default()
}
