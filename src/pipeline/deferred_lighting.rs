//! Deferred lighting resolve
//!
//! Shades the multisampled G-buffer once per pixel, or once per sample where the coverage
//! mask marks an edge, and writes the single-sampled lit scene.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

use crate::backend::{
    BackendResult, ColorTargetState, GraphicsBackend, TextureDescriptor, TextureFormat,
    TextureHandle, TextureViewDescriptor, TextureViewHandle,
};
use crate::frame::FrameState;

use super::fullscreen::{FullscreenProgram, FullscreenProgramDescriptor, InputKind};
use super::shaders::{require_source, ProgramId, ShaderLibrary};
use super::{Pass, PassTexture};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightingParams {
    view_projection: Mat4,
    screen_size: Vec2,
    shadow_cascades: u32,
    sample_count: u32,
}

pub struct DeferredLightingInputs<'a> {
    pub frame: &'a FrameState,
    pub coverage_mask: TextureViewHandle,
    /// Blurred ambient occlusion, `None` when ambient occlusion is off this frame
    pub occlusion: Option<TextureViewHandle>,
    pub shadow_cascades: TextureViewHandle,
    pub albedo: TextureViewHandle,
    pub position: TextureViewHandle,
    pub normal: TextureViewHandle,
    pub specular_emission: TextureViewHandle,
}

pub struct DeferredLightingPass {
    samples: u32,
    cascades: u32,
    program: FullscreenProgram,
    output: PassTexture,
    neutral_occlusion: (TextureHandle, TextureViewHandle),
    last_rendered: Option<u64>,
}

impl DeferredLightingPass {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        (width, height): (u32, u32),
        samples: u32,
        cascades: u32,
    ) -> BackendResult<Self> {
        let output_format = TextureFormat::Rgba16Float;
        let gbuffer = InputKind::gbuffer(samples);
        let program = FullscreenProgram::new(
            backend,
            &FullscreenProgramDescriptor {
                label: "deferred lighting",
                fragment: &require_source(shaders, ProgramId::DeferredLighting)?,
                inputs: &[
                    InputKind::Color,
                    InputKind::Color,
                    InputKind::DepthArray,
                    gbuffer,
                    gbuffer,
                    gbuffer,
                    gbuffer,
                ],
                uniform_size: Some(std::mem::size_of::<LightingParams>() as u64),
                targets: vec![ColorTargetState::replace(output_format)],
            },
        )?;

        // Sampled in place of the occlusion texture when ambient occlusion is off
        let neutral = backend.create_texture(&TextureDescriptor {
            label: Some("neutral occlusion".into()),
            format: TextureFormat::R8Unorm,
            ..Default::default()
        })?;
        backend.write_texture(neutral, &[u8::MAX], 1, 1);
        let neutral_view = backend.create_texture_view(neutral, &TextureViewDescriptor::default())?;

        Ok(Self {
            samples,
            cascades,
            program,
            output: PassTexture::create(backend, "deferred lighting", width, height, output_format)?,
            neutral_occlusion: (neutral, neutral_view),
            last_rendered: None,
        })
    }

    /// Lit opaque scene
    pub fn scene(&self) -> TextureViewHandle {
        self.output.view()
    }

    /// 1x1 white texture standing in for disabled ambient occlusion
    pub fn neutral_occlusion(&self) -> TextureViewHandle {
        self.neutral_occlusion.1
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        self.program.destroy(backend);
        self.output.destroy(backend);
        let (texture, view) = self.neutral_occlusion;
        backend.destroy_texture_view(view);
        backend.destroy_texture(texture);
    }
}

impl Pass for DeferredLightingPass {
    type Inputs<'a> = DeferredLightingInputs<'a>;

    fn name(&self) -> &'static str {
        "deferred-lighting"
    }

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: DeferredLightingInputs<'_>,
    ) -> BackendResult<()> {
        let (width, height) = self.output.resolution();
        self.program.write_uniform(
            backend,
            &LightingParams {
                view_projection: inputs.frame.camera.view_projection,
                screen_size: Vec2::new(width as f32, height as f32),
                shadow_cascades: self.cascades,
                sample_count: self.samples,
            },
        );
        let occlusion = inputs.occlusion.unwrap_or(self.neutral_occlusion.1);
        self.program.draw(
            backend,
            &self.output.pass("deferred lighting"),
            &self.output.viewport(),
            &[
                inputs.coverage_mask,
                occlusion,
                inputs.shadow_cascades,
                inputs.albedo,
                inputs.position,
                inputs.normal,
                inputs.specular_emission,
            ],
        )?;
        self.last_rendered = Some(inputs.frame.index);
        Ok(())
    }

    fn last_rendered(&self) -> Option<u64> {
        self.last_rendered
    }
}
