//! Render pass orchestration
//!
//! [`RenderPass`] owns the per-frame command buckets together with the
//! buffer pool and mesh cache they are batched into. Finished frames are
//! handed to a [`FrameExecutor`], which replays them against the graphics
//! context either immediately or from the thread that owns it.

mod command;
mod frame;
mod layers;
mod render_pass;

pub use command::{command_key, layer_index, DrawCommand, SoftwareSort};
pub use frame::{ContextQueue, DrawFrame, FrameExecutor, FrameStats, Immediate};
pub use layers::{CommandLayers, LAYER_COUNT};
pub use render_pass::{FrameReport, FrameState, RenderPass};
