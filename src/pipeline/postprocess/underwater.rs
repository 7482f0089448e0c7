//! Underwater tint and distortion

use crate::backend::{BackendResult, GraphicsBackend, TextureViewHandle};
use crate::chain::{PostEffect, PostInputs};
use crate::pipeline::fullscreen::InputKind;
use crate::pipeline::shaders::{ProgramId, ShaderLibrary};

use super::ScreenEffect;

pub struct Underwater {
    effect: ScreenEffect,
}

impl Underwater {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        resolution: (u32, u32),
        samples: u32,
    ) -> BackendResult<Self> {
        let effect = ScreenEffect::new(
            backend,
            shaders,
            ProgramId::Underwater,
            &[InputKind::Color, InputKind::depth(samples)],
            None,
            resolution,
        )?;
        Ok(Self { effect })
    }
}

impl PostEffect for Underwater {
    fn apply(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        input: TextureViewHandle,
        inputs: &PostInputs<'_>,
    ) -> BackendResult<TextureViewHandle> {
        self.effect.draw(backend, &[input, inputs.depth])
    }

    fn destroy(self: Box<Self>, backend: &mut dyn GraphicsBackend) {
        self.effect.destroy(backend);
    }
}
