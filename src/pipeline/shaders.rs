//! Shader program sources
//!
//! Lighting and effect shading is not part of this crate. Passes ask a [`ShaderLibrary`]
//! for the fragment source of their program when they are created; the shared fullscreen
//! vertex stage is prepended by [`super::fullscreen::FullscreenProgram`].

use std::borrow::Cow;
use std::collections::HashMap;

use crate::backend::{BackendError, BackendResult};

/// Fragment programs the frame pipeline needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramId {
    AmbientOcclusion,
    AmbientOcclusionBlur,
    CoverageMask,
    DeferredLighting,
    TransparencyBlend,
    Fxaa,
    DepthOfFieldHorizontal,
    DepthOfFieldVertical,
    BloomExtract,
    BloomBlur,
    BloomComposite,
    Underwater,
    MotionBlur,
    LightScattering,
    LensFlare,
}

impl ProgramId {
    pub const ALL: [ProgramId; 15] = [
        ProgramId::AmbientOcclusion,
        ProgramId::AmbientOcclusionBlur,
        ProgramId::CoverageMask,
        ProgramId::DeferredLighting,
        ProgramId::TransparencyBlend,
        ProgramId::Fxaa,
        ProgramId::DepthOfFieldHorizontal,
        ProgramId::DepthOfFieldVertical,
        ProgramId::BloomExtract,
        ProgramId::BloomBlur,
        ProgramId::BloomComposite,
        ProgramId::Underwater,
        ProgramId::MotionBlur,
        ProgramId::LightScattering,
        ProgramId::LensFlare,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProgramId::AmbientOcclusion => "ambient-occlusion",
            ProgramId::AmbientOcclusionBlur => "ambient-occlusion-blur",
            ProgramId::CoverageMask => "coverage-mask",
            ProgramId::DeferredLighting => "deferred-lighting",
            ProgramId::TransparencyBlend => "transparency-blend",
            ProgramId::Fxaa => "fxaa",
            ProgramId::DepthOfFieldHorizontal => "depth-of-field-horizontal",
            ProgramId::DepthOfFieldVertical => "depth-of-field-vertical",
            ProgramId::BloomExtract => "bloom-extract",
            ProgramId::BloomBlur => "bloom-blur",
            ProgramId::BloomComposite => "bloom-composite",
            ProgramId::Underwater => "underwater",
            ProgramId::MotionBlur => "motion-blur",
            ProgramId::LightScattering => "light-scattering",
            ProgramId::LensFlare => "lens-flare",
        }
    }
}

/// Source of WGSL fragment programs.
///
/// Each program declares its inputs in `@group(0)`: the pass's textures at bindings
/// `0..n`, a sampler at `n` and, when the pass has parameters, a uniform at `n + 1`.
/// The fragment entry point is `fs_main`, taking the `VertexOutput` of the fullscreen
/// vertex stage.
pub trait ShaderLibrary {
    fn source(&self, program: ProgramId) -> Option<Cow<'_, str>>;
}

/// Look up `program`, failing pass creation when the library lacks it.
pub fn require_source(
    shaders: &dyn ShaderLibrary,
    program: ProgramId,
) -> BackendResult<Cow<'_, str>> {
    shaders.source(program).ok_or_else(|| {
        BackendError::ShaderCreationFailed(format!("no source for program {}", program.name()))
    })
}

/// In-memory [`ShaderLibrary`]
#[derive(Debug, Clone, Default)]
pub struct ShaderRegistry {
    sources: HashMap<ProgramId, String>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, program: ProgramId, source: impl Into<String>) -> Option<String> {
        self.sources.insert(program, source.into())
    }

    pub fn with(mut self, program: ProgramId, source: impl Into<String>) -> Self {
        self.insert(program, source);
        self
    }

    pub fn contains(&self, program: ProgramId) -> bool {
        self.sources.contains_key(&program)
    }

    /// Programs the frame pipeline needs that have no source yet.
    pub fn missing(&self) -> Vec<ProgramId> {
        ProgramId::ALL
            .into_iter()
            .filter(|program| !self.contains(*program))
            .collect()
    }
}

impl ShaderLibrary for ShaderRegistry {
    fn source(&self, program: ProgramId) -> Option<Cow<'_, str>> {
        self.sources.get(&program).map(|s| Cow::Borrowed(s.as_str()))
    }
}
