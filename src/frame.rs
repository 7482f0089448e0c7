//! Per-frame snapshot and stage trace

use std::fmt;

use glam::{Mat4, Vec2};

use crate::chain::PostStage;
use crate::config::FeatureToggles;
use crate::debug_view::DebugView;
use crate::scene::CameraView;

/// Camera translation per frame above which motion blur replaces FXAA.
///
/// Empirical tuning value, kept exact.
pub const MOTION_BLUR_POSITION_THRESHOLD: f32 = 0.04;

/// Change of the camera forward vector per frame above which motion blur replaces FXAA.
pub const MOTION_BLUR_FORWARD_THRESHOLD: f32 = 0.01;

/// Motion blur eligibility thresholds, both compared with a strict `>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionThresholds {
    pub position: f32,
    pub forward: f32,
}

impl MotionThresholds {
    /// Whether the camera moved enough this frame for motion blur to apply.
    pub fn is_exceeded(&self, motion: &CameraMotion) -> bool {
        motion.position_delta > self.position || motion.forward_delta > self.forward
    }
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self {
            position: MOTION_BLUR_POSITION_THRESHOLD,
            forward: MOTION_BLUR_FORWARD_THRESHOLD,
        }
    }
}

/// Camera movement between the previous and the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMotion {
    pub position_delta: f32,
    pub forward_delta: f32,
    pub moved: bool,
    pub view_projection: Mat4,
    pub previous_view_projection: Mat4,
}

impl CameraMotion {
    pub fn capture(camera: &dyn CameraView) -> Self {
        Self {
            position_delta: (camera.position() - camera.previous_position()).length(),
            forward_delta: (camera.forward() - camera.previous_forward()).length(),
            moved: camera.has_moved(),
            view_projection: camera.view_projection(),
            previous_view_projection: camera.previous_view_projection(),
        }
    }

    /// A camera that did not move.
    pub fn still() -> Self {
        Self {
            position_delta: 0.0,
            forward_delta: 0.0,
            moved: false,
            view_projection: Mat4::IDENTITY,
            previous_view_projection: Mat4::IDENTITY,
        }
    }
}

/// Read-only state every stage of one frame sees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub camera: CameraMotion,
    pub motion_blur_eligible: bool,
    pub toggles: FeatureToggles,
    pub debug_view: DebugView,
    pub sun_screen_position: Option<Vec2>,
    pub sun_visibility: f32,
}

impl FrameState {
    pub fn new(
        index: u64,
        (width, height): (u32, u32),
        camera: CameraMotion,
        toggles: FeatureToggles,
        debug_view: DebugView,
        thresholds: &MotionThresholds,
    ) -> Self {
        Self {
            index,
            width,
            height,
            motion_blur_eligible: thresholds.is_exceeded(&camera),
            camera,
            toggles,
            debug_view,
            sun_screen_position: None,
            sun_visibility: 1.0,
        }
    }
}

/// A stage the orchestrator executed, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStage {
    Clear,
    Shadow,
    Opaque,
    Transparency,
    AmbientOcclusion,
    CoverageMask,
    LightingResolve { ambient_occlusion: bool },
    Composite,
    WorkerSignal,
    Post(PostStage),
    DebugView(DebugView),
    Present,
    OcclusionQueries,
    LensFlare,
    Overlay,
    Synchronize,
}

impl FrameStage {
    pub fn name(&self) -> &'static str {
        match self {
            FrameStage::Clear => "clear",
            FrameStage::Shadow => "shadow",
            FrameStage::Opaque => "opaque",
            FrameStage::Transparency => "transparency",
            FrameStage::AmbientOcclusion => "ambient-occlusion",
            FrameStage::CoverageMask => "coverage-mask",
            FrameStage::LightingResolve { .. } => "lighting-resolve",
            FrameStage::Composite => "composite",
            FrameStage::WorkerSignal => "worker-signal",
            FrameStage::Post(stage) => stage.name(),
            FrameStage::DebugView(_) => "debug-view",
            FrameStage::Present => "present",
            FrameStage::OcclusionQueries => "occlusion-queries",
            FrameStage::LensFlare => "lens-flare",
            FrameStage::Overlay => "overlay",
            FrameStage::Synchronize => "synchronize",
        }
    }
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameStage::LightingResolve {
                ambient_occlusion: false,
            } => write!(f, "lighting-resolve(no-ao)"),
            FrameStage::DebugView(view) => write!(f, "debug-view({view:?})"),
            stage => f.write_str(stage.name()),
        }
    }
}

/// Ordered stages of one frame
pub type FrameTrace = Vec<FrameStage>;
