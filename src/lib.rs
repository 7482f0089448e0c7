//! Deferred Renderer - per-frame orchestration of a multisampled deferred pipeline
//!
//! The renderer sequences shadow cascades, the opaque G-buffer, forward transparency,
//! ambient occlusion, coverage masking, the deferred lighting resolve, transparency
//! compositing and a post-processing chain, and owns every texture flowing between them.
//!
//! Two backends implement [`GraphicsBackend`]:
//! - **wgpu**: windowed or headless rendering (feature `wgpu-backend`, on by default)
//! - **Dummy**: records every call without a GPU, for tests and headless runs
//!
//! Scene traversal, lighting, overlay UI and shader sources are collaborators behind the
//! traits in [`scene`] and [`pipeline::ShaderLibrary`].

pub mod backend;
pub mod chain;
pub mod config;
pub mod context;
pub mod debug_view;
pub mod frame;
pub mod input;
pub mod pipeline;
pub mod render_target;
pub mod renderer;
pub mod scene;
pub mod workers;

pub use backend::{BackendError, BackendResult, DummyBackend, GraphicsBackend};
#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuBackend;
pub use chain::{PostEffect, PostInputs, PostProcessChain, PostStage};
pub use config::{FeatureToggles, RendererConfig};
pub use context::RenderContext;
pub use debug_view::{DebugView, DebugViewSelector};
pub use frame::{
    FrameStage, FrameState, FrameTrace, MotionThresholds, MOTION_BLUR_FORWARD_THRESHOLD,
    MOTION_BLUR_POSITION_THRESHOLD,
};
pub use input::{InputState, KeyBindings, KeyEdgeTracker, ToggleEvent};
pub use pipeline::{ProgramId, ShaderLibrary, ShaderRegistry};
pub use render_target::{Attachment, RenderTarget, RenderTargetDescriptor};
pub use renderer::DeferredRenderer;
pub use scene::{CameraView, LightingService, Overlay, SceneGraph, Terrain, TerrainPicking};
pub use workers::WorkerSignal;
