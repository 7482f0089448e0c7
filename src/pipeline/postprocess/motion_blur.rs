//! Camera motion blur
//!
//! Reconstructs each pixel's world position from depth, reprojects it with the previous
//! frame's view-projection and blurs along the screen-space velocity.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

use crate::backend::{BackendResult, GraphicsBackend, TextureViewHandle};
use crate::chain::{PostEffect, PostInputs};
use crate::pipeline::fullscreen::InputKind;
use crate::pipeline::shaders::{ProgramId, ShaderLibrary};

use super::ScreenEffect;

/// Samples taken along the velocity vector
pub const MOTION_BLUR_SAMPLES: u32 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MotionBlurParams {
    inverse_view_projection: Mat4,
    previous_view_projection: Mat4,
    screen_size: Vec2,
    sample_count: u32,
    _pad: u32,
}

pub struct MotionBlur {
    effect: ScreenEffect,
}

impl MotionBlur {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        resolution: (u32, u32),
        samples: u32,
    ) -> BackendResult<Self> {
        let effect = ScreenEffect::new(
            backend,
            shaders,
            ProgramId::MotionBlur,
            &[InputKind::Color, InputKind::depth(samples)],
            Some(std::mem::size_of::<MotionBlurParams>() as u64),
            resolution,
        )?;
        Ok(Self { effect })
    }
}

impl PostEffect for MotionBlur {
    fn apply(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        input: TextureViewHandle,
        inputs: &PostInputs<'_>,
    ) -> BackendResult<TextureViewHandle> {
        let camera = &inputs.frame.camera;
        let (width, height) = self.effect.resolution();
        self.effect.program().write_uniform(
            backend,
            &MotionBlurParams {
                inverse_view_projection: camera.view_projection.inverse(),
                previous_view_projection: camera.previous_view_projection,
                screen_size: Vec2::new(width as f32, height as f32),
                sample_count: MOTION_BLUR_SAMPLES,
                _pad: 0,
            },
        );
        self.effect.draw(backend, &[input, inputs.depth])
    }

    fn destroy(self: Box<Self>, backend: &mut dyn GraphicsBackend) {
        self.effect.destroy(backend);
    }
}
