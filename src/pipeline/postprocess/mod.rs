//! Post-processing effects
//!
//! Each effect renders into textures it owns and hands the result on as the next display
//! texture of the [`PostProcessChain`].

mod bloom;
mod depth_of_field;
mod fxaa;
mod lens_flare;
mod light_scattering;
mod motion_blur;
mod underwater;

pub use bloom::Bloom;
pub use depth_of_field::DepthOfField;
pub use fxaa::Fxaa;
pub use lens_flare::{LensFlareInputs, LensFlarePass};
pub use light_scattering::LightScattering;
pub use motion_blur::MotionBlur;
pub use underwater::Underwater;

use crate::backend::{
    BackendResult, ColorTargetState, GraphicsBackend, TextureFormat, TextureViewHandle,
};
use crate::chain::{PostProcessChain, PostStage};

use super::fullscreen::{FullscreenProgram, FullscreenProgramDescriptor, InputKind};
use super::shaders::{require_source, ProgramId, ShaderLibrary};
use super::PassTexture;

/// Format of every post-processing output
pub const POST_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// One fullscreen program writing one texture it owns
#[derive(Debug)]
pub(crate) struct ScreenEffect {
    program: FullscreenProgram,
    output: PassTexture,
}

impl ScreenEffect {
    pub(crate) fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        program: ProgramId,
        inputs: &[InputKind],
        uniform_size: Option<u64>,
        (width, height): (u32, u32),
    ) -> BackendResult<Self> {
        let program = FullscreenProgram::new(
            backend,
            &FullscreenProgramDescriptor {
                label: program.name(),
                fragment: &require_source(shaders, program)?,
                inputs,
                uniform_size,
                targets: vec![ColorTargetState::replace(POST_FORMAT)],
            },
        )?;
        let output = PassTexture::create(backend, program.label(), width, height, POST_FORMAT)?;
        Ok(Self { program, output })
    }

    pub(crate) fn program(&self) -> &FullscreenProgram {
        &self.program
    }

    pub(crate) fn output(&self) -> TextureViewHandle {
        self.output.view()
    }

    pub(crate) fn resolution(&self) -> (u32, u32) {
        self.output.resolution()
    }

    pub(crate) fn draw(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: &[TextureViewHandle],
    ) -> BackendResult<TextureViewHandle> {
        let pass = self.output.pass(self.program.label());
        self.program
            .draw(backend, &pass, &self.output.viewport(), inputs)?;
        Ok(self.output.view())
    }

    pub(crate) fn destroy(self, backend: &mut dyn GraphicsBackend) {
        self.program.destroy(backend);
        self.output.destroy(backend);
    }
}

/// Every chain stage, in [`PostStage::ORDER`].
pub fn standard_chain(
    backend: &mut dyn GraphicsBackend,
    shaders: &dyn ShaderLibrary,
    resolution: (u32, u32),
    samples: u32,
) -> BackendResult<PostProcessChain> {
    let mut chain = PostProcessChain::new();
    chain.push(
        PostStage::Fxaa,
        Box::new(Fxaa::new(backend, shaders, resolution)?),
    );
    chain.push(
        PostStage::DepthOfField,
        Box::new(DepthOfField::new(backend, shaders, resolution, samples)?),
    );
    chain.push(
        PostStage::Bloom,
        Box::new(Bloom::new(backend, shaders, resolution)?),
    );
    chain.push(
        PostStage::Underwater,
        Box::new(Underwater::new(backend, shaders, resolution, samples)?),
    );
    chain.push(
        PostStage::MotionBlur,
        Box::new(MotionBlur::new(backend, shaders, resolution, samples)?),
    );
    chain.push(
        PostStage::LightScattering,
        Box::new(LightScattering::new(backend, shaders, resolution)?),
    );
    Ok(chain)
}
