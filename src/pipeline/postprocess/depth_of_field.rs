//! Depth of field blur
//!
//! Separable blur weighted by distance from the focal plane: a horizontal pass into a
//! working texture, then a vertical pass into the output.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::backend::{BackendResult, GraphicsBackend, TextureViewHandle};
use crate::chain::{PostEffect, PostInputs};
use crate::pipeline::fullscreen::InputKind;
use crate::pipeline::shaders::{ProgramId, ShaderLibrary};

use super::ScreenEffect;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BlurParams {
    screen_size: Vec2,
    /// Linear depth in focus
    focal_depth: f32,
    /// Blur radius in pixels at full defocus
    max_radius: f32,
}

pub struct DepthOfField {
    pub focal_depth: f32,
    pub max_radius: f32,
    horizontal: ScreenEffect,
    vertical: ScreenEffect,
}

impl DepthOfField {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        shaders: &dyn ShaderLibrary,
        resolution: (u32, u32),
        samples: u32,
    ) -> BackendResult<Self> {
        let inputs = [InputKind::Color, InputKind::depth(samples), InputKind::Color];
        let uniform_size = Some(std::mem::size_of::<BlurParams>() as u64);
        let horizontal = ScreenEffect::new(
            backend,
            shaders,
            ProgramId::DepthOfFieldHorizontal,
            &inputs,
            uniform_size,
            resolution,
        )?;
        let vertical = ScreenEffect::new(
            backend,
            shaders,
            ProgramId::DepthOfFieldVertical,
            &inputs,
            uniform_size,
            resolution,
        )?;
        Ok(Self {
            focal_depth: 100.0,
            max_radius: 4.0,
            horizontal,
            vertical,
        })
    }
}

impl PostEffect for DepthOfField {
    fn apply(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        input: TextureViewHandle,
        inputs: &PostInputs<'_>,
    ) -> BackendResult<TextureViewHandle> {
        let (width, height) = self.horizontal.resolution();
        let params = BlurParams {
            screen_size: Vec2::new(width as f32, height as f32),
            focal_depth: self.focal_depth,
            max_radius: self.max_radius,
        };
        self.horizontal.program().write_uniform(backend, &params);
        self.vertical.program().write_uniform(backend, &params);

        let blurred = self
            .horizontal
            .draw(backend, &[input, inputs.depth, inputs.light_scattering])?;
        self.vertical
            .draw(backend, &[blurred, inputs.depth, inputs.light_scattering])
    }

    fn destroy(self: Box<Self>, backend: &mut dyn GraphicsBackend) {
        self.horizontal.destroy(backend);
        self.vertical.destroy(backend);
    }
}
