//! Screen-space passes of the deferred pipeline
//!
//! Geometry passes (shadows, opaque, transparency) are drawn by the scene graph into
//! bound render targets. Everything after them is a fullscreen pass owned here:
//! 1. Ambient occlusion - occlusion from G-buffer positions and normals, then blurred
//! 2. Coverage mask - marks edge pixels that need per-sample lighting
//! 3. Deferred lighting - resolves the multisampled G-buffer into the lit scene
//! 4. Transparency blend - composites the forward-shaded transparent layer
//! 5. Post-processing - see [`postprocess`]

pub mod ambient_occlusion;
pub mod blit;
pub mod coverage_mask;
pub mod deferred_lighting;
pub mod fullscreen;
pub mod postprocess;
pub mod shaders;
pub mod transparency_blend;

pub use ambient_occlusion::{AmbientOcclusionInputs, AmbientOcclusionPass};
pub use blit::{Blit, BlitMode};
pub use coverage_mask::{CoverageMaskInputs, CoverageMaskPass};
pub use deferred_lighting::{DeferredLightingInputs, DeferredLightingPass};
pub use fullscreen::{FullscreenProgram, FullscreenProgramDescriptor, InputKind};
pub use shaders::{require_source, ProgramId, ShaderLibrary, ShaderRegistry};
pub use transparency_blend::{TransparencyBlendInputs, TransparencyBlendPass};

use crate::backend::{
    BackendResult, ColorAttachment, GraphicsBackend, RenderPassDescriptor, TextureDescriptor,
    TextureFormat, TextureHandle, TextureViewDescriptor, TextureViewHandle, Viewport,
};

/// A stage of the frame that reads input textures and writes textures it owns.
///
/// Outputs are retrieved through accessors on the concrete pass and are only meaningful
/// for the frame reported by [`Pass::last_rendered`]. A pass may be skipped for any
/// number of frames.
pub trait Pass {
    /// Input textures and per-frame parameters
    type Inputs<'a>;

    fn name(&self) -> &'static str;

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: Self::Inputs<'_>,
    ) -> BackendResult<()>;

    /// Index of the last frame rendered, `None` before the first one.
    fn last_rendered(&self) -> Option<u64>;
}

/// Single-sampled working texture owned by a pass
#[derive(Debug)]
pub struct PassTexture {
    texture: TextureHandle,
    view: TextureViewHandle,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl PassTexture {
    pub fn create(
        backend: &mut dyn GraphicsBackend,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<Self> {
        let texture = backend.create_texture(&TextureDescriptor::render_target(
            label, width, height, format,
        ))?;
        let view = backend.create_texture_view(texture, &TextureViewDescriptor::default())?;
        Ok(Self {
            texture,
            view,
            width,
            height,
            format,
        })
    }

    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }

    /// Pass that overwrites the whole texture.
    pub fn pass(&self, label: &str) -> RenderPassDescriptor {
        RenderPassDescriptor {
            label: Some(label.to_string()),
            color_attachments: vec![ColorAttachment::clear(self.view, [0.0; 4])],
            depth_stencil_attachment: None,
        }
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_texture_view(self.view);
        backend.destroy_texture(self.texture);
    }
}

/// Half of `extent`, never below one pixel.
pub(crate) fn half(extent: u32) -> u32 {
    (extent / 2).max(1)
}
