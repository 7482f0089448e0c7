//! Conversions from backend-neutral types to wgpu types

use crate::backend::traits::*;
use crate::backend::types::*;

/// Every format the pipeline creates, used to map surface formats back
const FORMATS: [TextureFormat; 8] = [
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba8UnormSrgb,
    TextureFormat::Bgra8Unorm,
    TextureFormat::Bgra8UnormSrgb,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba32Float,
    TextureFormat::R8Unorm,
    TextureFormat::Depth32Float,
];

const TEXTURE_USAGES: [(TextureUsage, wgpu::TextureUsages); 3] = [
    (TextureUsage::COPY_DST, wgpu::TextureUsages::COPY_DST),
    (TextureUsage::TEXTURE_BINDING, wgpu::TextureUsages::TEXTURE_BINDING),
    (TextureUsage::RENDER_ATTACHMENT, wgpu::TextureUsages::RENDER_ATTACHMENT),
];

const BUFFER_USAGES: [(BufferUsage, wgpu::BufferUsages); 4] = [
    (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
    (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
    (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
    (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
];

pub(super) fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    use wgpu::TextureFormat as W;
    match format {
        TextureFormat::Rgba8Unorm => W::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => W::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => W::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => W::Bgra8UnormSrgb,
        TextureFormat::Rgba16Float => W::Rgba16Float,
        TextureFormat::Rgba32Float => W::Rgba32Float,
        TextureFormat::R8Unorm => W::R8Unorm,
        TextureFormat::Depth32Float => W::Depth32Float,
    }
}

/// Surfaces in a format the pipeline never creates are treated as plain RGBA8.
pub(super) fn texture_format_back(format: wgpu::TextureFormat) -> TextureFormat {
    FORMATS
        .into_iter()
        .find(|ours| texture_format(*ours) == format)
        .unwrap_or(TextureFormat::Rgba8Unorm)
}

pub(super) fn texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    TEXTURE_USAGES
        .iter()
        .filter(|(ours, _)| usage.contains(*ours))
        .fold(wgpu::TextureUsages::empty(), |acc, (_, theirs)| acc | *theirs)
}

pub(super) fn buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    BUFFER_USAGES
        .iter()
        .filter(|(ours, _)| usage.contains(*ours))
        .fold(wgpu::BufferUsages::empty(), |acc, (_, theirs)| acc | *theirs)
}

pub(super) fn shader_stages(flags: ShaderStageFlags) -> wgpu::ShaderStages {
    [
        (ShaderStageFlags::VERTEX, wgpu::ShaderStages::VERTEX),
        (ShaderStageFlags::FRAGMENT, wgpu::ShaderStages::FRAGMENT),
    ]
    .into_iter()
    .filter(|(ours, _)| flags.contains(*ours))
    .fold(wgpu::ShaderStages::empty(), |acc, (_, theirs)| acc | theirs)
}

pub(super) fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        VertexFormat::Uint32 => wgpu::VertexFormat::Uint32,
    }
}

pub(super) fn compare_function(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub(super) fn blend_state(state: &BlendState) -> wgpu::BlendState {
    let factor = |factor: BlendFactor| match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    };
    let component = |c: BlendComponent| wgpu::BlendComponent {
        src_factor: factor(c.src_factor),
        dst_factor: factor(c.dst_factor),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component(state.color),
        alpha: component(state.alpha),
    }
}

pub(super) fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub(super) fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
    }
}

pub(super) fn binding_type(ty: &BindingType) -> wgpu::BindingType {
    match ty {
        BindingType::UniformBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingType::Texture {
            sample_type,
            dimension,
            multisampled,
        } => wgpu::BindingType::Texture {
            sample_type: match sample_type {
                TextureSampleType::Float { filterable } => wgpu::TextureSampleType::Float {
                    filterable: *filterable,
                },
                TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
            },
            view_dimension: match dimension {
                TextureViewDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureViewDimension::D2Array => wgpu::TextureViewDimension::D2Array,
            },
            multisampled: *multisampled,
        },
        BindingType::Sampler { comparison } => wgpu::BindingType::Sampler(if *comparison {
            wgpu::SamplerBindingType::Comparison
        } else {
            wgpu::SamplerBindingType::Filtering
        }),
    }
}

pub(super) fn primitive_state(desc: &RenderPipelineDescriptor) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: match desc.primitive_topology {
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        },
        strip_index_format: None,
        front_face: match desc.front_face {
            FrontFace::Ccw => wgpu::FrontFace::Ccw,
            FrontFace::Cw => wgpu::FrontFace::Cw,
        },
        cull_mode: match desc.cull_mode {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        },
        ..Default::default()
    }
}

pub(super) fn load_op_color(op: &LoadOp) -> wgpu::LoadOp<wgpu::Color> {
    match op {
        LoadOp::Clear(color) => wgpu::LoadOp::Clear(wgpu::Color {
            r: color[0] as f64,
            g: color[1] as f64,
            b: color[2] as f64,
            a: color[3] as f64,
        }),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

pub(super) fn store_op(op: StoreOp) -> wgpu::StoreOp {
    match op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::Discard => wgpu::StoreOp::Discard,
    }
}
