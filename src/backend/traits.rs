//! Core backend abstraction traits
//!
//! The frame pipeline records all GPU work through [`GraphicsBackend`]. The trait is
//! object safe so passes and scene collaborators can take `&mut dyn GraphicsBackend`.

use crate::backend::types::*;
use thiserror::Error;

/// Failures surfaced by a [`GraphicsBackend`]
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to create bind group: {0}")]
    BindGroupCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Failed to read back query results: {0}")]
    QueryReadbackFailed(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

macro_rules! handles {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(pub(crate) u64);
        )*
    };
}

handles! {
    BufferHandle,
    TextureHandle,
    /// View over some layers of a texture; passes attach views, never textures
    TextureViewHandle,
    SamplerHandle,
    RenderPipelineHandle,
    BindGroupHandle,
    BindGroupLayoutHandle,
}

/// Resource bound at one slot of a bind group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureViewHandle),
    Sampler(SamplerHandle),
}

#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStageFlags,
    pub ty: BindingType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStageFlags(u32);

impl ShaderStageFlags {
    pub const VERTEX: Self = Self(1 << 0);
    pub const FRAGMENT: Self = Self(1 << 1);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingType {
    UniformBuffer,
    Texture {
        sample_type: TextureSampleType,
        dimension: TextureViewDimension,
        multisampled: bool,
    },
    Sampler { comparison: bool },
}

impl BindingType {
    /// Filterable single-sampled 2D color texture.
    pub const fn color_texture() -> Self {
        Self::Texture {
            sample_type: TextureSampleType::Float { filterable: true },
            dimension: TextureViewDimension::D2,
            multisampled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSampleType {
    Float { filterable: bool },
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureViewDimension {
    D2,
    D2Array,
}

/// `shader` holds a single WGSL module; `fragment_entry` is `None` for depth-only
/// pipelines.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub shader: String,
    pub vertex_entry: String,
    pub fragment_entry: Option<String>,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
    pub primitive_topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetState>,
    pub sample_count: u32,
}

impl Default for RenderPipelineDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            shader: String::new(),
            vertex_entry: "vs_main".to_string(),
            fragment_entry: Some("fs_main".to_string()),
            vertex_layouts: Vec::new(),
            bind_group_layouts: Vec::new(),
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: Vec::new(),
            sample_count: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendState>,
    pub write_mask: ColorWrites,
}

impl ColorTargetState {
    pub fn replace(format: TextureFormat) -> Self {
        Self {
            format,
            blend: None,
            write_mask: ColorWrites::ALL,
        }
    }
}

/// RGBA write mask, one bit per channel in that order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorWrites(pub u32);

impl ColorWrites {
    pub const ALL: Self = Self(0xF);
}

/// Color view written by a pass, with an optional multisample resolve target
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub resolve_target: Option<TextureViewHandle>,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

impl ColorAttachment {
    /// Attachment that keeps the existing contents.
    pub fn load(view: TextureViewHandle) -> Self {
        Self {
            view,
            resolve_target: None,
            load_op: LoadOp::Load,
            store_op: StoreOp::Store,
        }
    }

    /// Attachment that is cleared to `color` when the pass begins.
    pub fn clear(view: TextureViewHandle, color: [f32; 4]) -> Self {
        Self {
            view,
            resolve_target: None,
            load_op: LoadOp::Clear(color),
            store_op: StoreOp::Store,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilAttachment {
    pub view: TextureViewHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

impl RenderPassDescriptor {
    /// Pass that draws into a single color view, keeping its contents.
    pub fn single(label: &str, view: TextureViewHandle) -> Self {
        Self {
            label: Some(label.to_string()),
            color_attachments: vec![ColorAttachment::load(view)],
            depth_stencil_attachment: None,
        }
    }
}

/// Swapchain image acquired for one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub swapchain_view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

/// Recording interface every pipeline stage draws through
pub trait GraphicsBackend {
    /// Name shown in logs
    fn name(&self) -> &'static str;

    /// Recreate the swapchain at a new size
    fn resize(&mut self, width: u32, height: u32);

    /// Size frames are rendered at, after clamping to device limits
    fn surface_size(&self) -> (u32, u32);

    /// Acquire the next swapchain image
    fn begin_frame(&mut self) -> BackendResult<FrameContext>;

    /// Submit the recorded work and present
    fn end_frame(&mut self) -> BackendResult<()>;

    /// Block until all submitted GPU work has completed
    fn wait_idle(&mut self) -> BackendResult<()>;

    fn swapchain_format(&self) -> TextureFormat;

    // Resources

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a view over a range of a texture's layers
    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle>;

    /// Write tightly packed pixel data into layer 0 of a texture
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32);

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    // Pipelines

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle>;

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle>;

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle>;

    // Pass recording

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// Close the pass opened by [`GraphicsBackend::begin_render_pass`]
    fn end_render_pass(&mut self);

    /// Redirect the attachments of the current pass to one array layer.
    ///
    /// Used to draw each shadow cascade into its own layer of the cascade texture.
    /// The viewport carries over; pipeline and bind groups must be set again.
    fn set_attachment_layer(&mut self, layer: u32);

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle);

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    fn set_viewport(&mut self, viewport: &Viewport);

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>);

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    );

    // Occlusion queries

    /// Start counting samples that pass the depth test for query slot `index`
    fn begin_occlusion_query(&mut self, index: u32);

    /// Stop the active occlusion query
    fn end_occlusion_query(&mut self);

    /// Sample counts of the queries issued in the most recently submitted frame
    fn occlusion_query_results(&mut self) -> BackendResult<Vec<u64>>;

    // Global render state

    /// Switch the global raster configuration, `None` restores the default state.
    ///
    /// Pipelines are immutable, so collaborators read [`GraphicsBackend::render_config`]
    /// to pick the matching pipeline variant.
    fn set_render_config(&mut self, config: Option<RenderConfig>);

    /// Currently active raster configuration
    fn render_config(&self) -> Option<RenderConfig>;

    // Teardown

    fn destroy_buffer(&mut self, buffer: BufferHandle);
    fn destroy_texture(&mut self, texture: TextureHandle);
    fn destroy_texture_view(&mut self, view: TextureViewHandle);
    fn destroy_sampler(&mut self, sampler: SamplerHandle);
    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle);
    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle);
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}
