//! # Threaded Context Demo
//!
//! Demonstrates:
//! - Batching frames on a producer thread
//! - Replaying them on the thread that owns the graphics context
//! - A large mesh served from the cache while small meshes share pool buffers
//!
//! Run with `RUST_LOG=debug` to watch pool rotations and cache activity.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::{Mat4, Quat, Vec3, Vec4};

use render_batcher::backend::{
    CallLog, MaterialId, RecordingContext, RecordingShader, RecordingTarget,
};
use render_batcher::resources::{Mesh, VertexLayout};
use render_batcher::{ContextQueue, RenderPass, RenderPassConfig, RenderResult, SoftwareSort};

const FRAMES: usize = 8;
const SPRITES: usize = 64;

fn produce(queue: ContextQueue, log: CallLog) -> RenderResult<()> {
    let layout = VertexLayout::lit();
    let shader =
        Arc::new(RecordingShader::new("lit", layout, log.clone()).with_uniforms(["u_view_proj"]));
    let config = RenderPassConfig::default().with_software_sort(SoftwareSort::Z);
    let mut pass = RenderPass::new(shader, config)?;
    pass.set_target(Arc::new(RecordingTarget::new("window", log)));

    let ground = Arc::new(Mesh::plane(20.0, 20.0, 80));
    let quad = Arc::new(Mesh::quad());
    let mut queue = queue;

    for frame in 0..FRAMES {
        pass.clear();
        pass.set_uniform("u_view_proj", Mat4::IDENTITY);

        pass.set_layer(1);
        pass.add(&ground, Mat4::IDENTITY, Vec4::ONE, MaterialId(0));

        pass.set_layer(0);
        for i in 0..SPRITES {
            let angle = (frame * SPRITES + i) as f32 * 0.1;
            let matrix = Mat4::from_rotation_translation(
                Quat::from_rotation_z(angle),
                Vec3::new(i as f32 % 8.0, (i / 8) as f32, angle.sin()),
            );
            pass.add(&quad, matrix, Vec4::new(1.0, 0.5, 0.5, 1.0), MaterialId(1));
        }

        let report = pass.execute(&mut queue)?;
        log::info!(
            "frame {frame}: {} commands, {} cache hits, {} buffers queued",
            report.commands,
            report.cache_hits,
            pass.buffers_to_draw().len()
        );
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let log = CallLog::new();
    let queue = ContextQueue::new();
    let mut ctx = RecordingContext::new(log.clone());

    let producer = {
        let queue = queue.clone();
        let log = log.clone();
        thread::spawn(move || produce(queue, log))
    };

    // This thread owns the context and replays whatever has been queued.
    let mut drawn = 0;
    loop {
        let finished = producer.is_finished();
        match queue.drain(&mut ctx) {
            Ok(stats) => {
                for s in &stats {
                    log::info!(
                        "context: {} draws, {} uploads, {} skipped",
                        s.draw_calls,
                        s.uploads,
                        s.uploads_skipped
                    );
                }
                drawn += stats.len();
            }
            Err(err) => {
                log::error!("context: frame failed: {err}");
                break;
            }
        }
        if finished {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    match producer.join() {
        Ok(Ok(())) => log::info!("replayed {drawn} frames, {} draw calls", log.draws().len()),
        Ok(Err(err)) => log::error!("producer failed: {err}"),
        Err(_) => log::error!("producer thread panicked"),
    }
}
