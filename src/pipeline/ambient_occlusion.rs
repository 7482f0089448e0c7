//! Screen-space ambient occlusion
//!
//! Samples a hemisphere kernel around each G-buffer position, then blurs the raw
//! occlusion to hide the kernel's noise pattern.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

use crate::backend::{
    BackendResult, ColorTargetState, GraphicsBackend, TextureFormat, TextureViewHandle,
};
use crate::frame::FrameState;

use super::fullscreen::{FullscreenProgram, FullscreenProgramDescriptor, InputKind};
use super::shaders::{require_source, ProgramId, ShaderLibrary};
use super::{Pass, PassTexture};

/// Number of hemisphere samples per pixel
pub const KERNEL_SIZE: u32 = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AmbientOcclusionParams {
    view_projection: Mat4,
    screen_size: Vec2,
    kernel_size: u32,
    radius: f32,
}

pub struct AmbientOcclusionInputs<'a> {
    pub frame: &'a FrameState,
    /// Multisampled world-space positions
    pub position: TextureViewHandle,
    /// Multisampled world-space normals
    pub normal: TextureViewHandle,
}

pub struct AmbientOcclusionPass {
    /// World-space sampling radius
    pub radius: f32,
    occlusion: FullscreenProgram,
    blur: FullscreenProgram,
    raw: PassTexture,
    blurred: PassTexture,
    last_rendered: Option<u64>,
}

impl AmbientOcclusionPass {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        (width, height): (u32, u32),
        samples: u32,
    ) -> BackendResult<Self> {
        let format = TextureFormat::R8Unorm;
        let occlusion = FullscreenProgram::new(
            backend,
            &FullscreenProgramDescriptor {
                label: "ambient occlusion",
                fragment: &require_source(shaders, ProgramId::AmbientOcclusion)?,
                inputs: &[InputKind::gbuffer(samples), InputKind::gbuffer(samples)],
                uniform_size: Some(std::mem::size_of::<AmbientOcclusionParams>() as u64),
                targets: vec![ColorTargetState::replace(format)],
            },
        )?;
        let blur = FullscreenProgram::new(
            backend,
            &FullscreenProgramDescriptor {
                label: "ambient occlusion blur",
                fragment: &require_source(shaders, ProgramId::AmbientOcclusionBlur)?,
                inputs: &[InputKind::Color],
                uniform_size: None,
                targets: vec![ColorTargetState::replace(format)],
            },
        )?;

        Ok(Self {
            radius: 1.5,
            occlusion,
            blur,
            raw: PassTexture::create(backend, "ambient occlusion", width, height, format)?,
            blurred: PassTexture::create(backend, "ambient occlusion blurred", width, height, format)?,
            last_rendered: None,
        })
    }

    /// Blurred occlusion, 1.0 meaning unoccluded
    pub fn occlusion(&self) -> TextureViewHandle {
        self.blurred.view()
    }

    pub fn raw_occlusion(&self) -> TextureViewHandle {
        self.raw.view()
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        self.occlusion.destroy(backend);
        self.blur.destroy(backend);
        self.raw.destroy(backend);
        self.blurred.destroy(backend);
    }
}

impl Pass for AmbientOcclusionPass {
    type Inputs<'a> = AmbientOcclusionInputs<'a>;

    fn name(&self) -> &'static str {
        "ambient-occlusion"
    }

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: AmbientOcclusionInputs<'_>,
    ) -> BackendResult<()> {
        let (width, height) = self.raw.resolution();
        self.occlusion.write_uniform(
            backend,
            &AmbientOcclusionParams {
                view_projection: inputs.frame.camera.view_projection,
                screen_size: Vec2::new(width as f32, height as f32),
                kernel_size: KERNEL_SIZE,
                radius: self.radius,
            },
        );
        self.occlusion.draw(
            backend,
            &self.raw.pass("ambient occlusion"),
            &self.raw.viewport(),
            &[inputs.position, inputs.normal],
        )?;
        self.blur.draw(
            backend,
            &self.blurred.pass("ambient occlusion blur"),
            &self.blurred.viewport(),
            &[self.raw.view()],
        )?;
        self.last_rendered = Some(inputs.frame.index);
        Ok(())
    }

    fn last_rendered(&self) -> Option<u64> {
        self.last_rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::pipeline::ShaderRegistry;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<AmbientOcclusionParams>(), 80);
    }

    #[test]
    fn test_missing_shader_fails_creation() {
        let mut backend = DummyBackend::new(8, 8);
        let shaders = ShaderRegistry::new().with(ProgramId::AmbientOcclusion, "");
        assert!(AmbientOcclusionPass::new(&mut backend, &shaders, (8, 8), 4).is_err());
    }
}
