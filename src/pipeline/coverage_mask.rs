//! Sample coverage mask
//!
//! Marks pixels whose samples disagree (geometry edges) so deferred lighting only shades
//! per sample where it matters. Also downsamples the light-scattering attachment for the
//! transparency blend.

use bytemuck::{Pod, Zeroable};

use crate::backend::{
    BackendResult, ColorTargetState, GraphicsBackend, TextureFormat, TextureViewHandle,
};
use crate::frame::FrameState;

use super::blit::{Blit, BlitMode};
use super::fullscreen::{FullscreenProgram, FullscreenProgramDescriptor, InputKind};
use super::shaders::{require_source, ProgramId, ShaderLibrary};
use super::{half, Pass, PassTexture};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CoverageParams {
    sample_count: u32,
    /// Position difference above which two samples count as different surfaces
    threshold: f32,
    _pad: [u32; 2],
}

pub struct CoverageMaskInputs<'a> {
    pub frame: &'a FrameState,
    pub position: TextureViewHandle,
    pub light_scattering: TextureViewHandle,
}

pub struct CoverageMaskPass {
    samples: u32,
    mask_program: FullscreenProgram,
    downsample: Blit,
    mask: PassTexture,
    light_scattering: PassTexture,
    last_rendered: Option<u64>,
}

impl CoverageMaskPass {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        (width, height): (u32, u32),
        samples: u32,
    ) -> BackendResult<Self> {
        let mask_program = FullscreenProgram::new(
            backend,
            &FullscreenProgramDescriptor {
                label: "coverage mask",
                fragment: &require_source(shaders, ProgramId::CoverageMask)?,
                inputs: &[InputKind::gbuffer(samples)],
                uniform_size: Some(std::mem::size_of::<CoverageParams>() as u64),
                targets: vec![ColorTargetState::replace(TextureFormat::R8Unorm)],
            },
        )?;
        let downsample = Blit::new(
            backend,
            "light scattering downsample",
            BlitMode::gbuffer(samples),
            TextureFormat::Rgba16Float,
            false,
        )?;

        Ok(Self {
            samples,
            mask_program,
            downsample,
            mask: PassTexture::create(
                backend,
                "coverage mask",
                width,
                height,
                TextureFormat::R8Unorm,
            )?,
            light_scattering: PassTexture::create(
                backend,
                "light scattering downsampled",
                half(width),
                half(height),
                TextureFormat::Rgba16Float,
            )?,
            last_rendered: None,
        })
    }

    /// 1.0 where a pixel needs per-sample shading
    pub fn mask(&self) -> TextureViewHandle {
        self.mask.view()
    }

    /// Light-scattering attachment resolved at half resolution
    pub fn light_scattering(&self) -> TextureViewHandle {
        self.light_scattering.view()
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        self.mask_program.destroy(backend);
        self.downsample.destroy(backend);
        self.mask.destroy(backend);
        self.light_scattering.destroy(backend);
    }
}

impl Pass for CoverageMaskPass {
    type Inputs<'a> = CoverageMaskInputs<'a>;

    fn name(&self) -> &'static str {
        "coverage-mask"
    }

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: CoverageMaskInputs<'_>,
    ) -> BackendResult<()> {
        self.mask_program.write_uniform(
            backend,
            &CoverageParams {
                sample_count: self.samples,
                threshold: 0.01,
                _pad: [0; 2],
            },
        );
        self.mask_program.draw(
            backend,
            &self.mask.pass("coverage mask"),
            &self.mask.viewport(),
            &[inputs.position],
        )?;
        self.downsample.copy(
            backend,
            inputs.light_scattering,
            self.light_scattering.view(),
            &self.light_scattering.viewport(),
        )?;
        self.last_rendered = Some(inputs.frame.index);
        Ok(())
    }

    fn last_rendered(&self) -> Option<u64> {
        self.last_rendered
    }
}
