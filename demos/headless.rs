//! # Headless Demo
//!
//! Drives the deferred renderer on the dummy backend and prints the stages of every
//! frame. Useful to see how toggles, camera motion and debug views reshape the frame.
//!
//! ```bash
//! cargo run --example headless -- --frames 3 --orbit --fxaa
//! RUST_LOG=trace cargo run --example headless -- --debug-view 4
//! ```

use clap::Parser;
use glam::{Vec2, Vec3};

use deferred_renderer::backend::{BackendResult, DummyBackend, GraphicsBackend};
use deferred_renderer::scene::Camera;
use deferred_renderer::{
    CameraView, DebugView, DeferredRenderer, FeatureToggles, KeyEdgeTracker, LightingService,
    ProgramId, RenderContext, RendererConfig, SceneGraph, ShaderRegistry,
};

#[derive(Parser, Debug)]
#[command(
    name = "headless",
    about = "Render frames without a GPU and print the stage trace"
)]
struct Args {
    /// Number of frames to render
    #[arg(long, default_value = "2")]
    frames: u64,

    #[arg(long, default_value = "1280")]
    width: u32,

    #[arg(long, default_value = "720")]
    height: u32,

    /// Multisample count of the G-buffer
    #[arg(long, default_value = "4")]
    samples: u32,

    /// Move the camera every frame, enabling motion blur
    #[arg(long)]
    orbit: bool,

    #[arg(long)]
    fxaa: bool,

    #[arg(long)]
    no_ambient_occlusion: bool,

    /// Turn the post-processing master switch off
    #[arg(long)]
    no_post: bool,

    /// Debug view slot, 1 to 6
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=6))]
    debug_view: Option<u8>,
}

/// A camera and one draw call per geometry pass
struct DemoScene {
    camera: Camera,
    orbit: bool,
    angle: f32,
}

impl SceneGraph for DemoScene {
    fn update(&mut self) {
        self.camera.begin_frame();
        if self.orbit {
            self.angle += 0.05;
            let radius = 5.0;
            self.camera
                .set_position(Vec3::new(self.angle.cos() * radius, 2.0, self.angle.sin() * radius));
        }
    }

    fn render_shadows(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        cascades: u32,
    ) -> BackendResult<()> {
        for layer in 0..cascades {
            backend.set_attachment_layer(layer);
            backend.draw_indexed(0..36, 0, 0..1);
        }
        Ok(())
    }

    fn render(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        backend.draw_indexed(0..36, 0, 0..1);
        Ok(())
    }

    fn render_transparent_objects(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        backend.draw_indexed(0..6, 0, 0..1);
        Ok(())
    }

    fn camera(&self) -> &dyn CameraView {
        &self.camera
    }
}

/// Sun fixed in the upper middle of the screen
struct DemoSun {
    visibility: f32,
}

impl LightingService for DemoSun {
    fn update(&mut self, _camera: &dyn CameraView) {}

    fn do_occlusion_queries(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        let samples = backend.occlusion_query_results()?;
        if let Some(visible) = samples.first() {
            self.visibility = (*visible as f32).min(1.0);
        }
        backend.begin_occlusion_query(0);
        backend.draw(0..4, 0..1);
        backend.end_occlusion_query();
        Ok(())
    }

    fn sun_screen_position(&self) -> Option<Vec2> {
        Some(Vec2::new(0.5, 0.25))
    }

    fn sun_visibility(&self) -> f32 {
        self.visibility
    }
}

fn main() -> BackendResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let toggles = FeatureToggles {
        fxaa: args.fxaa,
        ambient_occlusion: !args.no_ambient_occlusion,
        post_processing: !args.no_post,
        ..FeatureToggles::default()
    };
    let config = RendererConfig {
        toggles,
        ..RendererConfig::new(args.width, args.height, args.samples)
    };

    // The dummy backend never compiles shaders
    let shaders = ProgramId::ALL
        .into_iter()
        .fold(ShaderRegistry::new(), |registry, program| {
            registry.with(program, format!("// {}", program.name()))
        });
    let context = RenderContext::new(Box::new(DemoSun { visibility: 1.0 }), Box::new(shaders));
    let scene = DemoScene {
        camera: Camera::new(Vec3::new(5.0, 2.0, 0.0), Vec3::ZERO),
        orbit: args.orbit,
        angle: 0.0,
    };

    let mut renderer = DeferredRenderer::new(
        config,
        DummyBackend::new(args.width, args.height),
        scene,
        context,
    );
    renderer.init()?;
    if let Some(view) = args.debug_view.and_then(|slot| DebugView::from_slot(slot as usize)) {
        renderer.select_debug_view(view);
    }

    // No window, so no key events ever arrive
    let mut input = KeyEdgeTracker::new();
    for _ in 0..args.frames {
        renderer.update(&input);
        input.end_frame();
        renderer.render()?;

        let state = renderer.frame_state().copied();
        let stages: Vec<String> = renderer
            .last_frame_trace()
            .iter()
            .map(|stage| stage.to_string())
            .collect();
        if let Some(state) = state {
            println!(
                "frame {} (motion blur eligible: {}): {}",
                state.index,
                state.motion_blur_eligible,
                stages.join(" -> ")
            );
        }
    }

    let commands = renderer.backend().commands().len();
    renderer.shutdown();
    log::info!("{} backend commands recorded", commands);
    Ok(())
}
