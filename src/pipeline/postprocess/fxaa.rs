//! Fast approximate anti-aliasing

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::backend::{BackendResult, GraphicsBackend, TextureViewHandle};
use crate::chain::{PostEffect, PostInputs};
use crate::pipeline::fullscreen::InputKind;
use crate::pipeline::shaders::{ProgramId, ShaderLibrary};

use super::ScreenEffect;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FxaaParams {
    inverse_screen_size: Vec2,
    edge_threshold: f32,
    edge_threshold_min: f32,
}

pub struct Fxaa {
    effect: ScreenEffect,
}

impl Fxaa {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        resolution: (u32, u32),
    ) -> BackendResult<Self> {
        let effect = ScreenEffect::new(
            backend,
            shaders,
            ProgramId::Fxaa,
            &[InputKind::Color],
            Some(std::mem::size_of::<FxaaParams>() as u64),
            resolution,
        )?;
        Ok(Self { effect })
    }
}

impl PostEffect for Fxaa {
    fn apply(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        input: TextureViewHandle,
        _inputs: &PostInputs<'_>,
    ) -> BackendResult<TextureViewHandle> {
        let (width, height) = self.effect.resolution();
        self.effect.program().write_uniform(
            backend,
            &FxaaParams {
                inverse_screen_size: Vec2::new(1.0 / width as f32, 1.0 / height as f32),
                edge_threshold: 0.125,
                edge_threshold_min: 0.0312,
            },
        );
        self.effect.draw(backend, &[input])
    }

    fn destroy(self: Box<Self>, backend: &mut dyn GraphicsBackend) {
        self.effect.destroy(backend);
    }
}
