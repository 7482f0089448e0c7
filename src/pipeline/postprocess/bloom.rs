//! Bloom post-processing effect
//!
//! Bright areas are extracted at half resolution, blurred and added back over the scene.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::backend::{BackendResult, GraphicsBackend, TextureViewHandle};
use crate::chain::{PostEffect, PostInputs};
use crate::pipeline::fullscreen::InputKind;
use crate::pipeline::half;
use crate::pipeline::shaders::{ProgramId, ShaderLibrary};

use super::ScreenEffect;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BloomParams {
    texel_size: Vec2,
    threshold: f32,
    intensity: f32,
}

/// Bloom post-processing pass
pub struct Bloom {
    pub threshold: f32,
    pub intensity: f32,
    extract: ScreenEffect,
    blur: ScreenEffect,
    composite: ScreenEffect,
}

impl Bloom {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        (width, height): (u32, u32),
    ) -> BackendResult<Self> {
        let uniform_size = Some(std::mem::size_of::<BloomParams>() as u64);
        let half_resolution = (half(width), half(height));
        Ok(Self {
            threshold: 1.0,
            intensity: 0.5,
            extract: ScreenEffect::new(
                backend,
                shaders,
                ProgramId::BloomExtract,
                &[InputKind::Color],
                uniform_size,
                half_resolution,
            )?,
            blur: ScreenEffect::new(
                backend,
                shaders,
                ProgramId::BloomBlur,
                &[InputKind::Color],
                uniform_size,
                half_resolution,
            )?,
            composite: ScreenEffect::new(
                backend,
                shaders,
                ProgramId::BloomComposite,
                &[InputKind::Color, InputKind::Color],
                uniform_size,
                (width, height),
            )?,
        })
    }

    fn params(&self, (width, height): (u32, u32)) -> BloomParams {
        BloomParams {
            texel_size: Vec2::new(1.0 / width as f32, 1.0 / height as f32),
            threshold: self.threshold,
            intensity: self.intensity,
        }
    }
}

impl PostEffect for Bloom {
    fn apply(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        input: TextureViewHandle,
        _inputs: &PostInputs<'_>,
    ) -> BackendResult<TextureViewHandle> {
        for effect in [&self.extract, &self.blur, &self.composite] {
            effect
                .program()
                .write_uniform(backend, &self.params(effect.resolution()));
        }

        let bright = self.extract.draw(backend, &[input])?;
        let blurred = self.blur.draw(backend, &[bright])?;
        self.composite.draw(backend, &[input, blurred])
    }

    fn destroy(self: Box<Self>, backend: &mut dyn GraphicsBackend) {
        self.extract.destroy(backend);
        self.blur.destroy(backend);
        self.composite.destroy(backend);
    }
}
