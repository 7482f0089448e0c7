//! Texture copies to another target
//!
//! Used to present the display texture, to overlay G-buffer attachments in debug views
//! and to downsample the light-scattering mask.

use crate::backend::{
    BackendResult, BlendState, ColorAttachment, ColorTargetState, ColorWrites, GraphicsBackend,
    RenderPassDescriptor, TextureFormat, TextureViewHandle, Viewport,
};

use super::fullscreen::{FullscreenProgram, FullscreenProgramDescriptor, InputKind};

const COPY_SHADER: &str = r#"
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source, source_sampler, input.uv);
}
"#;

const TEXEL_COPY_SHADER: &str = r#"
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(source));
    let coord = min(vec2<i32>(input.uv * vec2<f32>(size)), size - vec2<i32>(1));
    return textureLoad(source, coord, 0);
}
"#;

const MULTISAMPLE_COPY_SHADER: &str = r#"
@group(0) @binding(0) var source: texture_multisampled_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(source));
    let coord = min(vec2<i32>(input.uv * vec2<f32>(size)), size - vec2<i32>(1));
    let samples = i32(textureNumSamples(source));
    var color = vec4<f32>(0.0);
    for (var i = 0; i < samples; i = i + 1) {
        color = color + textureLoad(source, coord, i);
    }
    return color / f32(samples);
}
"#;

/// Source layout a blit reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitMode {
    /// Filtered copy of a single-sampled texture
    Copy,
    /// Unfiltered copy of a single-sampled texture, for formats that cannot be filtered
    Texel,
    /// Average of every sample of a multisampled texture
    Multisampled,
}

impl BlitMode {
    /// Mode reading a G-buffer attachment with `samples` samples.
    pub fn gbuffer(samples: u32) -> Self {
        if samples > 1 {
            BlitMode::Multisampled
        } else {
            BlitMode::Texel
        }
    }
}

/// Fullscreen copy from one texture to a color target
#[derive(Debug)]
pub struct Blit {
    mode: BlitMode,
    additive: bool,
    program: FullscreenProgram,
}

impl Blit {
    /// A blit writing `format`. Additive blits add onto the destination instead of
    /// replacing it.
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        label: &str,
        mode: BlitMode,
        format: TextureFormat,
        additive: bool,
    ) -> BackendResult<Self> {
        let (fragment, input) = match mode {
            BlitMode::Copy => (COPY_SHADER, InputKind::Color),
            BlitMode::Texel => (TEXEL_COPY_SHADER, InputKind::Texel { multisampled: false }),
            BlitMode::Multisampled => (
                MULTISAMPLE_COPY_SHADER,
                InputKind::Texel { multisampled: true },
            ),
        };
        let target = ColorTargetState {
            format,
            blend: additive.then(BlendState::additive),
            write_mask: ColorWrites::ALL,
        };
        let program = FullscreenProgram::new(
            backend,
            &FullscreenProgramDescriptor {
                label,
                fragment,
                inputs: &[input],
                uniform_size: None,
                targets: vec![target],
            },
        )?;
        Ok(Self {
            mode,
            additive,
            program,
        })
    }

    pub fn mode(&self) -> BlitMode {
        self.mode
    }

    pub fn is_additive(&self) -> bool {
        self.additive
    }

    /// Copy `source` over the whole of `destination`.
    pub fn copy(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        source: TextureViewHandle,
        destination: TextureViewHandle,
        viewport: &Viewport,
    ) -> BackendResult<()> {
        let attachment = if self.additive {
            ColorAttachment::load(destination)
        } else {
            ColorAttachment::clear(destination, [0.0, 0.0, 0.0, 1.0])
        };
        let pass = RenderPassDescriptor {
            label: Some(self.program.label().to_string()),
            color_attachments: vec![attachment],
            depth_stencil_attachment: None,
        };
        self.program.draw(backend, &pass, viewport, &[source])
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        self.program.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, DummyBackend};

    #[test]
    fn test_additive_blit_keeps_destination() {
        let mut backend = DummyBackend::new(8, 8);
        let mut blit = Blit::new(
            &mut backend,
            "overlay",
            BlitMode::Multisampled,
            TextureFormat::Bgra8UnormSrgb,
            true,
        )
        .unwrap();
        let frame = backend.begin_frame().unwrap();
        backend.take_commands();

        blit.copy(
            &mut backend,
            TextureViewHandle(999),
            frame.swapchain_view,
            &Viewport::new(8, 8),
        )
        .unwrap();

        assert!(matches!(
            backend.commands()[0],
            BackendCommand::BeginRenderPass { clears: false, .. }
        ));
    }

    #[test]
    fn test_mode_follows_sample_count() {
        assert_eq!(BlitMode::gbuffer(1), BlitMode::Texel);
        assert_eq!(BlitMode::gbuffer(8), BlitMode::Multisampled);
    }
}
