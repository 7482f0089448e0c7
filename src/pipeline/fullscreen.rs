//! Fullscreen triangle programs
//!
//! Every screen-space pass of the pipeline draws one fullscreen triangle with a fragment
//! program reading a fixed set of input textures.

use std::collections::HashMap;

use bytemuck::Pod;

use crate::backend::{
    BackendResult, BindGroupEntry, BindGroupHandle, BindGroupLayoutEntry,
    BindGroupLayoutHandle, BindingType, BufferDescriptor, BufferHandle, ColorTargetState,
    GraphicsBackend, RenderPassDescriptor, RenderPipelineDescriptor,
    RenderPipelineHandle, SamplerDescriptor, SamplerHandle, ShaderStageFlags,
    TextureSampleType, TextureViewDimension, TextureViewHandle, Viewport,
};

/// Common fullscreen triangle vertex stage
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;

/// How a program reads one of its input textures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Filterable single-sampled color
    Color,
    /// Color read texel by texel with `textureLoad`, never through the sampler.
    ///
    /// G-buffer attachments are read this way at every sample count: positions are
    /// `Rgba32Float`, which devices only filter behind an optional feature.
    Texel { multisampled: bool },
    Depth { multisampled: bool },
    /// Layered depth, one layer per shadow cascade
    DepthArray,
}

impl InputKind {
    /// G-buffer attachment of a target with `samples` samples.
    pub fn gbuffer(samples: u32) -> Self {
        InputKind::Texel {
            multisampled: samples > 1,
        }
    }

    pub fn depth(samples: u32) -> Self {
        InputKind::Depth {
            multisampled: samples > 1,
        }
    }

    pub(crate) fn binding_type(&self) -> BindingType {
        match *self {
            InputKind::Color => BindingType::color_texture(),
            InputKind::Texel { multisampled } => BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: false },
                dimension: TextureViewDimension::D2,
                multisampled,
            },
            InputKind::Depth { multisampled } => BindingType::Texture {
                sample_type: TextureSampleType::Depth,
                dimension: TextureViewDimension::D2,
                multisampled,
            },
            InputKind::DepthArray => BindingType::Texture {
                sample_type: TextureSampleType::Depth,
                dimension: TextureViewDimension::D2Array,
                multisampled: false,
            },
        }
    }
}

pub struct FullscreenProgramDescriptor<'a> {
    pub label: &'a str,
    /// WGSL fragment stage, entry point `fs_main`
    pub fragment: &'a str,
    pub inputs: &'a [InputKind],
    /// Size of the parameter uniform, `None` for programs without parameters
    pub uniform_size: Option<u64>,
    pub targets: Vec<ColorTargetState>,
}

/// A fullscreen pipeline with its bind group layout, sampler and parameter buffer.
///
/// Bind groups are cached per set of input views. Pipeline textures live from `init` to
/// `shutdown`, so the cache stays bounded by the number of distinct input combinations.
#[derive(Debug)]
pub struct FullscreenProgram {
    label: String,
    layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
    sampler: SamplerHandle,
    uniform: Option<BufferHandle>,
    inputs: Vec<InputKind>,
    bind_groups: HashMap<Vec<TextureViewHandle>, BindGroupHandle>,
}

impl FullscreenProgram {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        desc: &FullscreenProgramDescriptor<'_>,
    ) -> BackendResult<Self> {
        let sampler_binding = desc.inputs.len() as u32;

        let mut entries: Vec<BindGroupLayoutEntry> = desc
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| BindGroupLayoutEntry {
                binding: i as u32,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: input.binding_type(),
            })
            .collect();
        entries.push(BindGroupLayoutEntry {
            binding: sampler_binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Sampler { comparison: false },
        });
        if desc.uniform_size.is_some() {
            entries.push(BindGroupLayoutEntry {
                binding: sampler_binding + 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            });
        }
        let layout = backend.create_bind_group_layout(&entries)?;

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(desc.label.to_string()),
            shader: format!("{}\n{}", FULLSCREEN_VERTEX_SHADER, desc.fragment),
            bind_group_layouts: vec![layout],
            color_targets: desc.targets.clone(),
            ..Default::default()
        })?;

        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some(format!("{} sampler", desc.label)),
            ..Default::default()
        })?;

        let uniform = match desc.uniform_size {
            Some(size) => Some(backend.create_buffer(&BufferDescriptor::uniform(
                &format!("{} params", desc.label),
                size,
            ))?),
            None => None,
        };

        Ok(Self {
            label: desc.label.to_string(),
            layout,
            pipeline,
            sampler,
            uniform,
            inputs: desc.inputs.to_vec(),
            bind_groups: HashMap::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Upload this frame's parameters.
    pub fn write_uniform<T: Pod>(&self, backend: &mut dyn GraphicsBackend, params: &T) {
        match self.uniform {
            Some(buffer) => backend.write_buffer(buffer, 0, bytemuck::bytes_of(params)),
            None => panic!("program {} has no parameter uniform", self.label),
        }
    }

    fn bind_group(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: &[TextureViewHandle],
    ) -> BackendResult<BindGroupHandle> {
        if let Some(bind_group) = self.bind_groups.get(inputs) {
            return Ok(*bind_group);
        }

        let sampler_binding = inputs.len() as u32;
        let mut entries: Vec<(u32, BindGroupEntry)> = inputs
            .iter()
            .enumerate()
            .map(|(i, view)| (i as u32, BindGroupEntry::Texture(*view)))
            .collect();
        entries.push((sampler_binding, BindGroupEntry::Sampler(self.sampler)));
        if let Some(buffer) = self.uniform {
            entries.push((
                sampler_binding + 1,
                BindGroupEntry::Buffer {
                    buffer,
                    offset: 0,
                    size: None,
                },
            ));
        }

        let bind_group = backend.create_bind_group(self.layout, &entries)?;
        self.bind_groups.insert(inputs.to_vec(), bind_group);
        Ok(bind_group)
    }

    /// Draw the fullscreen triangle in a pass of its own.
    pub fn draw(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        pass: &RenderPassDescriptor,
        viewport: &Viewport,
        inputs: &[TextureViewHandle],
    ) -> BackendResult<()> {
        assert_eq!(
            inputs.len(),
            self.inputs.len(),
            "program {} takes {} inputs",
            self.label,
            self.inputs.len()
        );
        let bind_group = self.bind_group(backend, inputs)?;

        backend.begin_render_pass(pass);
        backend.set_viewport(viewport);
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, bind_group);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();
        Ok(())
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for bind_group in self.bind_groups.into_values() {
            backend.destroy_bind_group(bind_group);
        }
        if let Some(buffer) = self.uniform {
            backend.destroy_buffer(buffer);
        }
        backend.destroy_sampler(self.sampler);
        backend.destroy_render_pipeline(self.pipeline);
    }
}
