//! Post-processing chain
//!
//! The display texture is folded through an ordered list of stages. Each stage has a
//! pure predicate over the [`FrameState`] and a transform producing the next display
//! texture; a disabled stage passes the texture through untouched.

use crate::backend::{BackendResult, GraphicsBackend, TextureViewHandle};
use crate::frame::{FrameStage, FrameState, FrameTrace};

/// Post-processing stages in chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostStage {
    Fxaa,
    DepthOfField,
    Bloom,
    Underwater,
    MotionBlur,
    LightScattering,
}

impl PostStage {
    pub const ORDER: [PostStage; 6] = [
        PostStage::Fxaa,
        PostStage::DepthOfField,
        PostStage::Bloom,
        PostStage::Underwater,
        PostStage::MotionBlur,
        PostStage::LightScattering,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PostStage::Fxaa => "fxaa",
            PostStage::DepthOfField => "depth-of-field",
            PostStage::Bloom => "bloom",
            PostStage::Underwater => "underwater",
            PostStage::MotionBlur => "motion-blur",
            PostStage::LightScattering => "light-scattering",
        }
    }

    /// Whether the stage runs this frame.
    ///
    /// FXAA is independent of the post-processing master switch but yields to motion
    /// blur eligibility; every other stage needs the master switch and its own toggle.
    pub fn is_enabled(&self, frame: &FrameState) -> bool {
        let toggles = &frame.toggles;
        match self {
            PostStage::Fxaa => !frame.motion_blur_eligible && toggles.fxaa,
            PostStage::DepthOfField => toggles.post_processing && toggles.depth_of_field,
            PostStage::Bloom => toggles.post_processing && toggles.bloom,
            PostStage::Underwater => toggles.post_processing && toggles.underwater,
            PostStage::MotionBlur => {
                toggles.post_processing && frame.motion_blur_eligible && toggles.motion_blur
            }
            PostStage::LightScattering => toggles.post_processing && toggles.light_scattering,
        }
    }
}

/// Stages enabled for `frame`, in chain order.
pub fn enabled_stages(frame: &FrameState) -> Vec<PostStage> {
    PostStage::ORDER
        .into_iter()
        .filter(|stage| stage.is_enabled(frame))
        .collect()
}

/// Textures post effects read besides the display texture
#[derive(Debug, Clone, Copy)]
pub struct PostInputs<'a> {
    pub frame: &'a FrameState,
    /// Multisampled opaque depth
    pub depth: TextureViewHandle,
    /// Blended light-scattering mask
    pub light_scattering: TextureViewHandle,
}

/// Transform of one post-processing stage
pub trait PostEffect {
    /// Render the effect over `input` and return the texture holding the result.
    fn apply(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        input: TextureViewHandle,
        inputs: &PostInputs<'_>,
    ) -> BackendResult<TextureViewHandle>;

    fn destroy(self: Box<Self>, backend: &mut dyn GraphicsBackend);
}

/// Ordered `(stage, effect)` list folded over the display texture
#[derive(Default)]
pub struct PostProcessChain {
    stages: Vec<(PostStage, Box<dyn PostEffect>)>,
}

impl PostProcessChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. Stages must be pushed in [`PostStage::ORDER`], each at most once.
    pub fn push(&mut self, stage: PostStage, effect: Box<dyn PostEffect>) {
        let position = |s: PostStage| PostStage::ORDER.iter().position(|o| *o == s);
        if let Some((last, _)) = self.stages.last() {
            assert!(
                position(*last) < position(stage),
                "post stage {} pushed after {}",
                stage.name(),
                last.name()
            );
        }
        self.stages.push((stage, effect));
    }

    pub fn stages(&self) -> impl Iterator<Item = PostStage> + '_ {
        self.stages.iter().map(|(stage, _)| *stage)
    }

    /// Fold `seed` through every enabled stage, appending each executed stage to `trace`.
    pub fn run(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        seed: TextureViewHandle,
        inputs: &PostInputs<'_>,
        trace: &mut FrameTrace,
    ) -> BackendResult<TextureViewHandle> {
        self.stages
            .iter_mut()
            .filter(|(stage, _)| stage.is_enabled(inputs.frame))
            .try_fold(seed, |display, (stage, effect)| {
                log::trace!("post stage {}", stage.name());
                let next = effect.apply(backend, display, inputs)?;
                trace.push(FrameStage::Post(*stage));
                Ok(next)
            })
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for (_, effect) in self.stages {
            effect.destroy(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::config::FeatureToggles;
    use crate::debug_view::DebugView;
    use crate::frame::{CameraMotion, MotionThresholds};

    fn frame(toggles: FeatureToggles, moving: bool) -> FrameState {
        let camera = CameraMotion {
            position_delta: if moving { 1.0 } else { 0.0 },
            ..CameraMotion::still()
        };
        FrameState::new(
            0,
            (8, 8),
            camera,
            toggles,
            DebugView::None,
            &MotionThresholds::default(),
        )
    }

    /// Returns a fresh handle per application so the fold is observable.
    struct Tag(u64);

    impl PostEffect for Tag {
        fn apply(
            &mut self,
            _backend: &mut dyn GraphicsBackend,
            _input: TextureViewHandle,
            _inputs: &PostInputs<'_>,
        ) -> BackendResult<TextureViewHandle> {
            Ok(TextureViewHandle(self.0))
        }

        fn destroy(self: Box<Self>, _backend: &mut dyn GraphicsBackend) {}
    }

    fn tagged_chain() -> PostProcessChain {
        let mut chain = PostProcessChain::new();
        for (i, stage) in PostStage::ORDER.into_iter().enumerate() {
            chain.push(stage, Box::new(Tag(100 + i as u64)));
        }
        chain
    }

    #[test]
    fn test_fxaa_yields_to_motion_blur() {
        let toggles = FeatureToggles {
            fxaa: true,
            ..FeatureToggles::default()
        };
        assert!(PostStage::Fxaa.is_enabled(&frame(toggles, false)));
        assert!(!PostStage::Fxaa.is_enabled(&frame(toggles, true)));
        assert!(PostStage::MotionBlur.is_enabled(&frame(toggles, true)));
    }

    #[test]
    fn test_master_switch_leaves_fxaa_alone() {
        let toggles = FeatureToggles {
            fxaa: true,
            post_processing: false,
            ..FeatureToggles::default()
        };
        assert_eq!(enabled_stages(&frame(toggles, false)), vec![PostStage::Fxaa]);
    }

    #[test]
    fn test_disabled_chain_returns_seed() {
        let mut backend = DummyBackend::new(8, 8);
        let state = frame(FeatureToggles::none(), true);
        let inputs = PostInputs {
            frame: &state,
            depth: TextureViewHandle(1),
            light_scattering: TextureViewHandle(2),
        };
        let mut trace = FrameTrace::new();

        let display = tagged_chain()
            .run(&mut backend, TextureViewHandle(42), &inputs, &mut trace)
            .unwrap();

        assert_eq!(display, TextureViewHandle(42));
        assert!(trace.is_empty());
    }

    #[test]
    fn test_last_enabled_stage_wins() {
        let mut backend = DummyBackend::new(8, 8);
        let toggles = FeatureToggles {
            light_scattering: false,
            ..FeatureToggles::default()
        };
        let state = frame(toggles, true);
        let inputs = PostInputs {
            frame: &state,
            depth: TextureViewHandle(1),
            light_scattering: TextureViewHandle(2),
        };
        let mut trace = FrameTrace::new();

        let display = tagged_chain()
            .run(&mut backend, TextureViewHandle(42), &inputs, &mut trace)
            .unwrap();

        // Motion blur is the fifth stage
        assert_eq!(display, TextureViewHandle(104));
        assert_eq!(
            trace,
            vec![
                FrameStage::Post(PostStage::DepthOfField),
                FrameStage::Post(PostStage::Bloom),
                FrameStage::Post(PostStage::MotionBlur),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "pushed after")]
    fn test_out_of_order_push_panics() {
        let mut chain = PostProcessChain::new();
        chain.push(PostStage::Bloom, Box::new(Tag(0)));
        chain.push(PostStage::Fxaa, Box::new(Tag(1)));
    }
}
