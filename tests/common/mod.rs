//! Shared collaborators for frame pipeline integration tests.
//!
//! Every collaborator records what the renderer asked of it through shared counters, so
//! tests can inspect calls after handing ownership to the renderer.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};
use winit::keyboard::KeyCode;

use deferred_renderer::backend::{
    BackendCommand, BackendResult, DummyBackend, GraphicsBackend, RenderConfig,
    RenderPassDescriptor, TextureViewHandle,
};
use deferred_renderer::{
    CameraView, DeferredRenderer, InputState, LightingService, Overlay, ProgramId, RenderContext,
    RendererConfig, SceneGraph, ShaderRegistry, Terrain, TerrainPicking, WorkerSignal,
};

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 180;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Scene
// ============================================================================

/// Camera with fixed per-frame motion
#[derive(Debug, Clone, Copy)]
pub struct MockCamera {
    pub position: Vec3,
    pub previous_position: Vec3,
    pub forward: Vec3,
    pub previous_forward: Vec3,
}

impl MockCamera {
    pub fn still() -> Self {
        Self {
            position: Vec3::ZERO,
            previous_position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            previous_forward: Vec3::NEG_Z,
        }
    }

    /// Camera translated by `position_delta` along X and turned by `forward_delta`.
    pub fn moving(position_delta: f32, forward_delta: f32) -> Self {
        Self {
            position: Vec3::new(position_delta, 0.0, 0.0),
            forward: Vec3::new(forward_delta, 0.0, -1.0),
            ..Self::still()
        }
    }
}

impl CameraView for MockCamera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn previous_position(&self) -> Vec3 {
        self.previous_position
    }

    fn forward(&self) -> Vec3 {
        self.forward
    }

    fn previous_forward(&self) -> Vec3 {
        self.previous_forward
    }

    fn view_projection(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    fn previous_view_projection(&self) -> Mat4 {
        Mat4::IDENTITY
    }
}

pub struct MockTerrain {
    pub signal: WorkerSignal,
}

impl Terrain for MockTerrain {
    fn quadtree_signal(&self) -> &WorkerSignal {
        &self.signal
    }
}

/// Scene drawing one call per geometry pass and one per shadow cascade
pub struct MockScene {
    pub camera: MockCamera,
    pub terrain: Option<MockTerrain>,
    pub updates: usize,
    pub shadow_draws: usize,
    pub opaque_draws: usize,
    pub transparent_draws: usize,
    /// Raster configuration active while shadows were drawn
    pub shadow_config: Option<RenderConfig>,
}

impl MockScene {
    pub fn new(camera: MockCamera) -> Self {
        Self {
            camera,
            terrain: None,
            updates: 0,
            shadow_draws: 0,
            opaque_draws: 0,
            transparent_draws: 0,
            shadow_config: None,
        }
    }

    pub fn with_terrain(mut self, signal: WorkerSignal) -> Self {
        self.terrain = Some(MockTerrain { signal });
        self
    }
}

impl SceneGraph for MockScene {
    fn update(&mut self) {
        self.updates += 1;
    }

    fn render_shadows(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        cascades: u32,
    ) -> BackendResult<()> {
        self.shadow_config = backend.render_config();
        for layer in 0..cascades {
            backend.set_attachment_layer(layer);
            backend.draw_indexed(0..36, 0, 0..1);
            self.shadow_draws += 1;
        }
        Ok(())
    }

    fn render(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        backend.draw_indexed(0..36, 0, 0..1);
        self.opaque_draws += 1;
        Ok(())
    }

    fn render_transparent_objects(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        backend.draw_indexed(0..6, 0, 0..1);
        self.transparent_draws += 1;
        Ok(())
    }

    fn camera(&self) -> &dyn CameraView {
        &self.camera
    }

    fn terrain(&self) -> Option<&dyn Terrain> {
        self.terrain.as_ref().map(|t| t as &dyn Terrain)
    }
}

// ============================================================================
// Services
// ============================================================================

/// Call counters shared between a test and the collaborators it handed away
#[derive(Debug, Clone, Default)]
pub struct Probes {
    pub light_updates: Rc<Cell<usize>>,
    pub occlusion_queries: Rc<Cell<usize>>,
    pub overlay_inits: Rc<Cell<usize>>,
    pub overlay_updates: Rc<Cell<usize>>,
    pub overlay_renders: Rc<Cell<usize>>,
    pub picked_depth: Rc<RefCell<Vec<TextureViewHandle>>>,
}

pub struct MockLights {
    probes: Probes,
    pub sun: Option<Vec2>,
}

impl LightingService for MockLights {
    fn update(&mut self, _camera: &dyn CameraView) {
        self.probes.light_updates.set(self.probes.light_updates.get() + 1);
    }

    fn do_occlusion_queries(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        backend.begin_occlusion_query(0);
        backend.draw(0..4, 0..1);
        backend.end_occlusion_query();
        self.probes
            .occlusion_queries
            .set(self.probes.occlusion_queries.get() + 1);
        Ok(())
    }

    fn sun_screen_position(&self) -> Option<Vec2> {
        self.sun
    }

    /// Halves with every resolved round of queries
    fn sun_visibility(&self) -> f32 {
        0.5_f32.powi(self.probes.occlusion_queries.get() as i32)
    }
}

/// Lighting with nothing to update or query
pub struct NoLights;

impl LightingService for NoLights {
    fn update(&mut self, _camera: &dyn CameraView) {}

    fn do_occlusion_queries(&mut self, _backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        Ok(())
    }
}

pub struct MockOverlay {
    probes: Probes,
}

impl MockOverlay {
    pub fn new(probes: &Probes) -> Self {
        Self {
            probes: probes.clone(),
        }
    }
}

impl Overlay for MockOverlay {
    fn init(&mut self, _backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        self.probes.overlay_inits.set(self.probes.overlay_inits.get() + 1);
        Ok(())
    }

    fn update(&mut self) {
        self.probes
            .overlay_updates
            .set(self.probes.overlay_updates.get() + 1);
    }

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        target: TextureViewHandle,
    ) -> BackendResult<()> {
        backend.begin_render_pass(&RenderPassDescriptor::single("overlay", target));
        backend.draw(0..6, 0..1);
        backend.end_render_pass();
        self.probes
            .overlay_renders
            .set(self.probes.overlay_renders.get() + 1);
        Ok(())
    }
}

pub struct MockPicking {
    probes: Probes,
}

impl TerrainPicking for MockPicking {
    fn update(&mut self, _camera: &dyn CameraView, scene_depth: TextureViewHandle) {
        self.probes.picked_depth.borrow_mut().push(scene_depth);
    }
}

/// A source for every program the pipeline compiles.
pub fn shaders() -> ShaderRegistry {
    ProgramId::ALL
        .into_iter()
        .fold(ShaderRegistry::new(), |registry, program| {
            registry.with(
                program,
                format!("// {}\n@fragment fn fs_main() {{}}\n", program.name()),
            )
        })
}

// ============================================================================
// Input
// ============================================================================

/// Keys pushed this frame
#[derive(Debug, Default)]
pub struct Pushed(pub HashSet<KeyCode>);

impl Pushed {
    pub fn keys(keys: &[KeyCode]) -> Self {
        Self(keys.iter().copied().collect())
    }
}

impl InputState for Pushed {
    fn is_key_pushed(&self, key: KeyCode) -> bool {
        self.0.contains(&key)
    }
}

// ============================================================================
// Renderer
// ============================================================================

pub type TestRenderer = DeferredRenderer<DummyBackend, MockScene>;

pub struct Harness {
    pub renderer: TestRenderer,
    pub probes: Probes,
    pub instancing: WorkerSignal,
}

/// Small configuration so the tests stay quick.
pub fn config() -> RendererConfig {
    RendererConfig {
        shadow_resolution: 256,
        ..RendererConfig::new(WIDTH, HEIGHT, 4)
    }
}

/// An uninitialized renderer over `scene`.
pub fn harness(config: RendererConfig, scene: MockScene) -> Harness {
    init_logging();
    let probes = Probes::default();
    let instancing = WorkerSignal::new();
    let lights = MockLights {
        probes: probes.clone(),
        sun: Some(Vec2::new(0.5, 0.5)),
    };
    let context = RenderContext::new(Box::new(lights), Box::new(shaders()))
        .with_instancing(instancing.clone())
        .with_terrain_picking(Box::new(MockPicking {
            probes: probes.clone(),
        }));
    let renderer = DeferredRenderer::new(config, DummyBackend::new(WIDTH, HEIGHT), scene, context);
    Harness {
        renderer,
        probes,
        instancing,
    }
}

/// An initialized renderer with a still camera and the given configuration.
pub fn initialized(config: RendererConfig) -> Harness {
    let mut harness = harness(config, MockScene::new(MockCamera::still()));
    harness.renderer.init().unwrap();
    harness
}

pub fn count(commands: &[BackendCommand], matches: impl Fn(&BackendCommand) -> bool) -> usize {
    commands.iter().filter(|c| matches(c)).count()
}
