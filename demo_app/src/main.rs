//! Headless scene demo
//!
//! Runs the execution core the way a windowed application would, without a
//! window: the main thread owns the render state machine (over an in-memory
//! device) and renders frames, while a second thread ticks the active scene
//! at a fixed step, switches scenes and creates GPU resources through the
//! deferred task queue.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use scene_engine::components::{Rotator, SpriteRenderer};
use scene_engine::config::{Config, ConfigError, EngineConfig};
use scene_engine::context::EngineContext;
use scene_engine::foundation::{logging, math::Vec2, time::FixedStepTimer};
use scene_engine::render::{
    Camera2D, DeviceCall, HeadlessDevice, Mesh, ProgramId, RenderError, RenderStateMachine, ResourceCache,
    TextureDescriptor,
};
use scene_engine::scene::{AddComponent, ComponentParams, ParamValue, Scene, SceneError, SceneManager};

const CONFIG_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
const SCENE_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scenes/demo.ron");
const RUN_TIME: Duration = Duration::from_secs(3);
const ASTEROID_COUNT: usize = 24;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Failed to spawn the update thread: {0}")]
    Spawn(std::io::Error),

    #[error("Update thread panicked")]
    UpdateThreadPanicked,
}

fn load_config() -> Result<EngineConfig, DemoError> {
    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = if Path::new(&path).exists() {
        EngineConfig::load_from_file(&path)?
    } else {
        EngineConfig::default().with_initial_scene("demo")
    };
    config.validate()?;
    Ok(config)
}

/// Scene built in code: a field of spinning asteroids at random positions
fn build_asteroid_field(scene: &Arc<Scene>) -> Result<(), SceneError> {
    let mut rng = rand::thread_rng();
    scene.set_camera(Some(Camera2D::new(1280.0, 720.0)));

    let field = scene
        .create_entity("field")
        .ok_or(SceneError::WrongThread("create_entity"))?;
    for i in 0..ASTEROID_COUNT {
        let Some(asteroid) = scene.create_child(field, format!("asteroid_{i}")) else {
            continue;
        };
        let position = Vec2::new(rng.gen_range(-600.0..600.0), rng.gen_range(-320.0..320.0));
        let scale = rng.gen_range(8.0..32.0);
        scene.with_transform(asteroid, |t| {
            t.set_position(position);
            t.set_scale(Vec2::new(scale, scale));
        });

        let tint = f64::from(rng.gen_range(0.4_f32..1.0));
        let params = ComponentParams::new().with("color", ParamValue::List(vec![tint, tint, tint, 1.0]));
        scene.add_component_with::<SpriteRenderer>(asteroid, AddComponent::new().with_params(params));
        let spin = ComponentParams::new().with("degrees_per_second", ParamValue::Float(rng.gen_range(-90.0..90.0)));
        scene.add_component_with::<Rotator>(asteroid, AddComponent::new().with_params(spin));
    }
    Ok(())
}

/// Update thread: scene loading, fixed-step ticks, scene switch halfway
fn run_update_thread(manager: &SceneManager, resources: &ResourceCache) -> Result<u64, DemoError> {
    let context = manager.context();
    context.bind_update_thread();

    // The checker texture must exist before the first scene references it
    let texture = context
        .gpu()
        .run(|state: &mut RenderStateMachine| state.create_texture(&TextureDescriptor::solid(4, 4, [200, 200, 255, 255])))?;
    resources.insert_texture("checker", texture);

    let initial = context.config().initial_scene.clone().unwrap_or_else(|| "demo".to_string());
    manager.load_scene(&initial)?;

    let mut timer = FixedStepTimer::new(context.config().update_rate_hz);
    let started = Instant::now();
    let mut switched = false;
    while started.elapsed() < RUN_TIME {
        for _ in 0..timer.advance() {
            manager.update(timer.step_seconds());
        }
        if !switched && started.elapsed() > RUN_TIME / 2 {
            manager.load_scene("asteroids")?;
            switched = true;
        }
        thread::sleep(timer.until_next_tick());
    }

    manager.unload();
    Ok(timer.tick_count())
}

fn main() -> Result<(), DemoError> {
    let config = load_config()?;
    logging::init_with_level(&config.log_level);
    log::info!("Starting headless demo");

    let resources = Arc::new(ResourceCache::new());
    resources.insert_shader("sprite", Arc::new(SpriteRenderer::program_interface(ProgramId(1))));
    resources.insert_mesh("quad", Mesh::quad(1.0, 1.0).into_shared());

    let context = EngineContext::builder()
        .with_config(config)
        .with_resources(Arc::<ResourceCache>::clone(&resources))
        .build();

    let mut manager = SceneManager::new(Arc::clone(&context));
    manager.register_description_file(SCENE_PATH)?;
    manager.register_builder("asteroids", build_asteroid_field);
    let manager = Arc::new(manager);

    let device = HeadlessDevice::new(16);
    let probe = device.probe();
    let mut state = RenderStateMachine::with_config(Box::new(device), Arc::clone(context.gpu()), context.config());

    let running = Arc::new(AtomicBool::new(true));
    let updater = {
        let manager = Arc::clone(&manager);
        let resources = Arc::clone(&resources);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("update".to_string())
            .spawn(move || {
                let result = run_update_thread(&manager, &resources);
                running.store(false, Ordering::Release);
                result
            })
            .map_err(DemoError::Spawn)?
    };

    let mut rendered = 0_u64;
    while running.load(Ordering::Acquire) {
        if manager.render_frame(&mut state) {
            rendered += 1;
        }
        if state.frame_index() % 60 == 0 {
            let stats = state.last_frame_stats();
            log::debug!(
                "Frame {}: {} draws, {} state changes, {} redundant skipped",
                state.frame_index(),
                stats.draw_calls,
                stats.state_changes,
                stats.redundant_skipped
            );
        }
        thread::sleep(Duration::from_millis(16));
    }

    let ticks = updater.join().map_err(|_| DemoError::UpdateThreadPanicked)??;

    // Releases queued by the final unload
    manager.render_frame(&mut state);
    context.gpu().close();

    let draws = probe.count(|call| matches!(call, DeviceCall::DrawElements(_)));
    log::info!(
        "Demo finished: {} update ticks, {} scene frames of {} total, {} draw calls",
        ticks,
        rendered,
        state.frame_index(),
        draws
    );
    log::info!(
        "Live GPU objects after shutdown: {} buffers, {} textures",
        probe.live_buffers(),
        probe.live_textures()
    );
    Ok(())
}
