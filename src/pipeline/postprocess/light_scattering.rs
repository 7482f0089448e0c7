//! Sun light scattering (god rays)
//!
//! Radial blur of the light-scattering mask towards the sun's screen position, added over
//! the display texture.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::backend::{BackendResult, GraphicsBackend, TextureViewHandle};
use crate::chain::{PostEffect, PostInputs};
use crate::pipeline::fullscreen::InputKind;
use crate::pipeline::shaders::{ProgramId, ShaderLibrary};

use super::ScreenEffect;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ScatteringParams {
    sun_position: Vec2,
    exposure: f32,
    /// 0 when the sun is off screen and only the input is copied
    sun_on_screen: u32,
}

pub struct LightScattering {
    /// Strength of the scattered light
    pub exposure: f32,
    effect: ScreenEffect,
}

impl LightScattering {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        resolution: (u32, u32),
    ) -> BackendResult<Self> {
        let effect = ScreenEffect::new(
            backend,
            shaders,
            ProgramId::LightScattering,
            &[InputKind::Color, InputKind::Color],
            Some(std::mem::size_of::<ScatteringParams>() as u64),
            resolution,
        )?;
        Ok(Self {
            exposure: 0.6,
            effect,
        })
    }
}

impl PostEffect for LightScattering {
    fn apply(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        input: TextureViewHandle,
        inputs: &PostInputs<'_>,
    ) -> BackendResult<TextureViewHandle> {
        let sun = inputs.frame.sun_screen_position;
        self.effect.program().write_uniform(
            backend,
            &ScatteringParams {
                sun_position: sun.unwrap_or(Vec2::ZERO),
                exposure: self.exposure,
                sun_on_screen: sun.is_some() as u32,
            },
        );
        self.effect.draw(backend, &[input, inputs.light_scattering])
    }

    fn destroy(self: Box<Self>, backend: &mut dyn GraphicsBackend) {
        self.effect.destroy(backend);
    }
}
