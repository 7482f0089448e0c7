//! Opaque and transparent layer compositing
//!
//! Blends the forward-shaded transparency target over the lit opaque scene, depth tested
//! against the opaque depth, and merges both light-scattering masks.

use crate::backend::{
    BackendResult, ColorAttachment, ColorTargetState, GraphicsBackend, RenderPassDescriptor,
    TextureFormat, TextureViewHandle,
};
use crate::frame::FrameState;

use super::fullscreen::{FullscreenProgram, FullscreenProgramDescriptor, InputKind};
use super::shaders::{require_source, ProgramId, ShaderLibrary};
use super::{Pass, PassTexture};

pub struct TransparencyBlendInputs<'a> {
    pub frame: &'a FrameState,
    pub lit_scene: TextureViewHandle,
    /// Multisampled opaque depth
    pub opaque_depth: TextureViewHandle,
    /// Downsampled opaque light-scattering mask
    pub light_scattering_mask: TextureViewHandle,
    pub albedo: TextureViewHandle,
    pub depth: TextureViewHandle,
    pub alpha: TextureViewHandle,
    pub light_scattering: TextureViewHandle,
}

pub struct TransparencyBlendPass {
    program: FullscreenProgram,
    scene: PassTexture,
    light_scattering: PassTexture,
    last_rendered: Option<u64>,
}

impl TransparencyBlendPass {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        (width, height): (u32, u32),
        samples: u32,
    ) -> BackendResult<Self> {
        let format = TextureFormat::Rgba16Float;
        let program = FullscreenProgram::new(
            backend,
            &FullscreenProgramDescriptor {
                label: "transparency blend",
                fragment: &require_source(shaders, ProgramId::TransparencyBlend)?,
                inputs: &[
                    InputKind::Color,
                    InputKind::depth(samples),
                    InputKind::Color,
                    InputKind::Color,
                    InputKind::depth(1),
                    InputKind::Color,
                    InputKind::Color,
                ],
                uniform_size: None,
                targets: vec![
                    ColorTargetState::replace(format),
                    ColorTargetState::replace(format),
                ],
            },
        )?;

        Ok(Self {
            program,
            scene: PassTexture::create(backend, "blended scene", width, height, format)?,
            light_scattering: PassTexture::create(
                backend,
                "blended light scattering",
                width,
                height,
                format,
            )?,
            last_rendered: None,
        })
    }

    /// Opaque and transparent geometry composited, the seed of the post-processing chain
    pub fn scene(&self) -> TextureViewHandle {
        self.scene.view()
    }

    pub fn light_scattering(&self) -> TextureViewHandle {
        self.light_scattering.view()
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        self.program.destroy(backend);
        self.scene.destroy(backend);
        self.light_scattering.destroy(backend);
    }
}

impl Pass for TransparencyBlendPass {
    type Inputs<'a> = TransparencyBlendInputs<'a>;

    fn name(&self) -> &'static str {
        "transparency-blend"
    }

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: TransparencyBlendInputs<'_>,
    ) -> BackendResult<()> {
        let pass = RenderPassDescriptor {
            label: Some("transparency blend".into()),
            color_attachments: vec![
                ColorAttachment::clear(self.scene.view(), [0.0; 4]),
                ColorAttachment::clear(self.light_scattering.view(), [0.0; 4]),
            ],
            depth_stencil_attachment: None,
        };
        self.program.draw(
            backend,
            &pass,
            &self.scene.viewport(),
            &[
                inputs.lit_scene,
                inputs.opaque_depth,
                inputs.light_scattering_mask,
                inputs.albedo,
                inputs.depth,
                inputs.alpha,
                inputs.light_scattering,
            ],
        )?;
        self.last_rendered = Some(inputs.frame.index);
        Ok(())
    }

    fn last_rendered(&self) -> Option<u64> {
        self.last_rendered
    }
}
