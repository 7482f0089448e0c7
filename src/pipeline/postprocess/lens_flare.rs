//! Lens flare
//!
//! Drawn additively over the presented image after the sun's occlusion queries ran
//! against the opaque depth. Flare strength follows the visible fraction of the sun.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::backend::{
    BackendResult, BlendState, ColorTargetState, ColorWrites, GraphicsBackend,
    RenderPassDescriptor, TextureFormat, TextureViewHandle, Viewport,
};
use crate::frame::FrameState;
use crate::pipeline::fullscreen::{FullscreenProgram, FullscreenProgramDescriptor};
use crate::pipeline::shaders::{require_source, ProgramId, ShaderLibrary};
use crate::pipeline::Pass;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FlareParams {
    sun_position: Vec2,
    visibility: f32,
    aspect: f32,
}

pub struct LensFlareInputs<'a> {
    pub frame: &'a FrameState,
    /// Presented image the flare is added onto
    pub target: TextureViewHandle,
}

pub struct LensFlarePass {
    program: FullscreenProgram,
    last_rendered: Option<u64>,
}

impl LensFlarePass {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        format: TextureFormat,
    ) -> BackendResult<Self> {
        let program = FullscreenProgram::new(
            backend,
            &FullscreenProgramDescriptor {
                label: "lens flare",
                fragment: &require_source(shaders, ProgramId::LensFlare)?,
                inputs: &[],
                uniform_size: Some(std::mem::size_of::<FlareParams>() as u64),
                targets: vec![ColorTargetState {
                    format,
                    blend: Some(BlendState::additive()),
                    write_mask: ColorWrites::ALL,
                }],
            },
        )?;
        Ok(Self {
            program,
            last_rendered: None,
        })
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        self.program.destroy(backend);
    }
}

impl Pass for LensFlarePass {
    type Inputs<'a> = LensFlareInputs<'a>;

    fn name(&self) -> &'static str {
        "lens-flare"
    }

    /// Draws nothing while the sun is off screen or fully occluded.
    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: LensFlareInputs<'_>,
    ) -> BackendResult<()> {
        let frame = inputs.frame;
        self.last_rendered = Some(frame.index);
        let Some(sun_position) = frame.sun_screen_position else {
            return Ok(());
        };
        if frame.sun_visibility <= 0.0 {
            return Ok(());
        }

        self.program.write_uniform(
            backend,
            &FlareParams {
                sun_position,
                visibility: frame.sun_visibility,
                aspect: frame.width as f32 / frame.height as f32,
            },
        );
        self.program.draw(
            backend,
            &RenderPassDescriptor::single("lens flare", inputs.target),
            &Viewport::new(frame.width, frame.height),
            &[],
        )
    }

    fn last_rendered(&self) -> Option<u64> {
        self.last_rendered
    }
}
