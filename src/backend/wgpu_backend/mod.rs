//! wgpu backend implementation
//!
//! Render pass commands are buffered and replayed into a real `wgpu::RenderPass` when
//! the pass ends, which lets the pipeline use bind/unbind style recording on top of
//! wgpu's scoped passes.

mod convert;

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Occlusion query slots available per frame
pub const MAX_OCCLUSION_QUERIES: u32 = 64;

/// Buffered render pass command
#[derive(Clone)]
enum RenderCommand {
    SetPipeline(RenderPipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle, offset: u64 },
    SetIndexBuffer { buffer: BufferHandle, offset: u64, format: IndexFormat },
    SetViewport(Viewport),
    Draw { vertices: std::ops::Range<u32>, instances: std::ops::Range<u32> },
    DrawIndexed { indices: std::ops::Range<u32>, base_vertex: i32, instances: std::ops::Range<u32> },
    BeginOcclusionQuery(u32),
    EndOcclusionQuery,
}

/// Pending render pass with buffered commands
struct PendingRenderPass {
    descriptor: RenderPassDescriptor,
    layer: Option<u32>,
    commands: Vec<RenderCommand>,
}

struct ViewEntry {
    view: wgpu::TextureView,
    texture: u64,
}

/// Where the frame is presented
enum Presentation {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        current: Option<wgpu::SurfaceTexture>,
    },
    Offscreen {
        texture: wgpu::Texture,
        format: wgpu::TextureFormat,
    },
}

struct OcclusionQueries {
    set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    slots: QuerySlots,
    submitted: u32,
}

/// Occlusion query slots used by the frame in flight.
///
/// A rejected begin also swallows its matching end, so a pass never ends a query it
/// did not open.
#[derive(Debug, Default, PartialEq, Eq)]
struct QuerySlots {
    /// Highest slot begun plus one
    recorded: u32,
    open: bool,
}

impl QuerySlots {
    fn begin(&mut self, index: u32) -> bool {
        if index >= MAX_OCCLUSION_QUERIES {
            log::warn!("Occlusion query {index} exceeds the {MAX_OCCLUSION_QUERIES} available slots");
            return false;
        }
        if self.open {
            log::warn!("Occlusion query {index} begun while another query is open");
            return false;
        }
        self.open = true;
        self.recorded = self.recorded.max(index + 1);
        true
    }

    fn end(&mut self) -> bool {
        std::mem::take(&mut self.open)
    }
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    presentation: Presentation,
    width: u32,
    height: u32,
    frame_view: Option<wgpu::TextureView>,
    frame_view_id: u64,

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, wgpu::Texture>,
    texture_views: HashMap<u64, ViewEntry>,
    samplers: HashMap<u64, wgpu::Sampler>,
    bind_group_layouts: HashMap<u64, wgpu::BindGroupLayout>,
    bind_groups: HashMap<u64, wgpu::BindGroup>,
    render_pipelines: HashMap<u64, wgpu::RenderPipeline>,

    // Single counter shared by every handle kind
    next_id: u64,

    queries: OcclusionQueries,
    render_config: Option<RenderConfig>,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,

    // Pending pass - commands are buffered here and executed on end_render_pass
    pending_render_pass: Option<PendingRenderPass>,
}

impl WgpuBackend {
    /// Create a backend presenting to `window`, blocking on adapter and device requests.
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    /// Create a backend that renders into an offscreen presentation texture.
    pub fn headless(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(Self::headless_async(width, height))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let (adapter, device, queue) = Self::request_device(&instance, Some(&surface)).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let (width, height) = Self::clamp_to_limits(&device, size.width, size.height);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let presentation = Presentation::Surface {
            surface,
            config,
            current: None,
        };
        Ok(Self::from_parts(instance, adapter, device, queue, presentation, width, height))
    }

    pub async fn headless_async(width: u32, height: u32) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let (adapter, device, queue) = Self::request_device(&instance, None).await?;

        let (width, height) = Self::clamp_to_limits(&device, width, height);
        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let texture = Self::create_offscreen_target(&device, width, height, format);

        let presentation = Presentation::Offscreen { texture, format };
        Ok(Self::from_parts(instance, adapter, device, queue, presentation, width, height))
    }

    async fn request_device(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'static>>,
    ) -> BackendResult<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Deferred Renderer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((adapter, device, queue))
    }

    fn from_parts(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        presentation: Presentation,
        width: u32,
        height: u32,
    ) -> Self {
        let queries = OcclusionQueries {
            set: device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("Occlusion Queries"),
                ty: wgpu::QueryType::Occlusion,
                count: MAX_OCCLUSION_QUERIES,
            }),
            resolve: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Occlusion Resolve"),
                size: MAX_OCCLUSION_QUERIES as u64 * 8,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Occlusion Readback"),
                size: MAX_OCCLUSION_QUERIES as u64 * 8,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            slots: QuerySlots::default(),
            submitted: 0,
        };

        Self {
            instance,
            adapter,
            device,
            queue,
            presentation,
            width,
            height,
            frame_view: None,
            frame_view_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            next_id: 1,
            queries,
            render_config: None,
            encoder: None,
            pending_render_pass: None,
        }
    }

    fn create_offscreen_target(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Presentation Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_to_limits(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
        let max_size = device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Replay a buffered pass into the frame encoder.
    fn flush_pass(&mut self, pending: PendingRenderPass) {
        let Some(mut encoder) = self.encoder.take() else {
            log::warn!(
                "Render pass {:?} recorded outside of a frame, dropped",
                pending.descriptor.label
            );
            return;
        };

        // Layered passes draw into single-layer views of the attachment textures
        let mut layer_views: HashMap<u64, wgpu::TextureView> = HashMap::new();
        if let Some(layer) = pending.layer {
            let handles = pending
                .descriptor
                .color_attachments
                .iter()
                .map(|a| a.view.0)
                .chain(pending.descriptor.depth_stencil_attachment.iter().map(|d| d.view.0));
            for handle in handles {
                let Some(texture) = self
                    .texture_views
                    .get(&handle)
                    .and_then(|entry| self.textures.get(&entry.texture))
                else {
                    continue;
                };
                let view = texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Attachment Layer"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                layer_views.insert(handle, view);
            }
        }

        let frame_view_id = self.frame_view_id;
        let resolve = |handle: TextureViewHandle| {
            if handle.0 == frame_view_id {
                self.frame_view.as_ref()
            } else if let Some(view) = layer_views.get(&handle.0) {
                Some(view)
            } else {
                self.texture_views.get(&handle.0).map(|entry| &entry.view)
            }
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pending
            .descriptor
            .color_attachments
            .iter()
            .map(|att| {
                resolve(att.view).map(|view| wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: att.resolve_target.and_then(resolve),
                    ops: wgpu::Operations {
                        load: convert::load_op_color(&att.load_op),
                        store: convert::store_op(att.store_op),
                    },
                })
            })
            .collect();

        let depth_attachment = pending
            .descriptor
            .depth_stencil_attachment
            .as_ref()
            .and_then(|att| {
                let view = resolve(att.view)?;
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match &att.depth_load_op {
                            LoadOp::Clear(_) => wgpu::LoadOp::Clear(att.depth_clear_value),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: convert::store_op(att.depth_store_op),
                    }),
                    stencil_ops: None,
                })
            });

        let uses_queries = pending
            .commands
            .iter()
            .any(|cmd| matches!(cmd, RenderCommand::BeginOcclusionQuery(_)));

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pending.descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: uses_queries.then_some(&self.queries.set),
            });

            for cmd in &pending.commands {
                match cmd {
                    RenderCommand::SetPipeline(handle) => {
                        if let Some(pipeline) = self.render_pipelines.get(&handle.0) {
                            render_pass.set_pipeline(pipeline);
                        }
                    }
                    RenderCommand::SetBindGroup { index, bind_group } => {
                        if let Some(bg) = self.bind_groups.get(&bind_group.0) {
                            render_pass.set_bind_group(*index, bg, &[]);
                        }
                    }
                    RenderCommand::SetVertexBuffer { slot, buffer, offset } => {
                        if let Some(buf) = self.buffers.get(&buffer.0) {
                            render_pass.set_vertex_buffer(*slot, buf.slice(*offset..));
                        }
                    }
                    RenderCommand::SetIndexBuffer { buffer, offset, format } => {
                        if let Some(buf) = self.buffers.get(&buffer.0) {
                            let wgpu_format = match format {
                                IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
                                IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
                            };
                            render_pass.set_index_buffer(buf.slice(*offset..), wgpu_format);
                        }
                    }
                    RenderCommand::SetViewport(v) => {
                        render_pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
                    }
                    RenderCommand::Draw { vertices, instances } => {
                        render_pass.draw(vertices.clone(), instances.clone());
                    }
                    RenderCommand::DrawIndexed { indices, base_vertex, instances } => {
                        render_pass.draw_indexed(indices.clone(), *base_vertex, instances.clone());
                    }
                    RenderCommand::BeginOcclusionQuery(index) => {
                        render_pass.begin_occlusion_query(*index);
                    }
                    RenderCommand::EndOcclusionQuery => {
                        render_pass.end_occlusion_query();
                    }
                }
            }
        }

        self.encoder = Some(encoder);
    }

    fn push_command(&mut self, command: RenderCommand) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(command);
        }
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to the wgpu queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (width, height) = Self::clamp_to_limits(&self.device, width, height);
        self.width = width;
        self.height = height;
        match &mut self.presentation {
            Presentation::Surface { surface, config, .. } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Presentation::Offscreen { texture, format } => {
                *texture = Self::create_offscreen_target(&self.device, width, height, *format);
            }
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let view = match &mut self.presentation {
            Presentation::Surface { surface, current, .. } => {
                let output = surface.get_current_texture().map_err(|e| match e {
                    wgpu::SurfaceError::Lost => BackendError::SurfaceLost,
                    wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
                    _ => BackendError::AcquireImageFailed(e.to_string()),
                })?;
                let view = output
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                *current = Some(output);
                view
            }
            Presentation::Offscreen { texture, .. } => {
                texture.create_view(&wgpu::TextureViewDescriptor::default())
            }
        };

        let view_id = self.next_handle();
        self.frame_view_id = view_id;
        self.frame_view = Some(view);
        self.queries.slots = QuerySlots::default();

        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );

        Ok(FrameContext {
            swapchain_view: TextureViewHandle(view_id),
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if let Some(pending) = self.pending_render_pass.take() {
            log::warn!(
                "Render pass {:?} still open at end of frame, flushing",
                pending.descriptor.label
            );
            self.flush_pass(pending);
        }

        if let Some(mut encoder) = self.encoder.take() {
            let recorded = self.queries.slots.recorded;
            if recorded > 0 {
                let bytes = recorded as u64 * 8;
                encoder.resolve_query_set(&self.queries.set, 0..recorded, &self.queries.resolve, 0);
                encoder.copy_buffer_to_buffer(&self.queries.resolve, 0, &self.queries.readback, 0, bytes);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
            self.queries.submitted = recorded;
        }

        self.frame_view = None;
        if let Presentation::Surface { current, .. } = &mut self.presentation {
            if let Some(texture) = current.take() {
                texture.present();
            }
        }

        Ok(())
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        let _ = self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        match &self.presentation {
            Presentation::Surface { config, .. } => convert::texture_format_back(config.format),
            Presentation::Offscreen { format, .. } => convert::texture_format_back(*format),
        }
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: convert::buffer_usage(desc.usage),
            mapped_at_creation: false,
        });

        let id = self.next_handle();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buf) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, offset, data);
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.layers == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: 1,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage: convert::texture_usage(desc.usage),
            view_formats: &[],
        });

        let id = self.next_handle();
        self.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::TextureCreationFailed("Texture not found".into()))?;

        let layers = desc
            .layer_count
            .unwrap_or_else(|| tex.depth_or_array_layers().saturating_sub(desc.base_layer));
        let dimension = if desc.array || layers > 1 {
            wgpu::TextureViewDimension::D2Array
        } else {
            wgpu::TextureViewDimension::D2
        };

        let view = tex.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            base_array_layer: desc.base_layer,
            array_layer_count: desc.layer_count,
            ..Default::default()
        });

        let id = self.next_handle();
        self.texture_views.insert(
            id,
            ViewEntry {
                view,
                texture: texture.0,
            },
        );
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        if let Some(tex) = self.textures.get(&texture.0) {
            let bytes_per_pixel = tex.format().block_copy_size(None).unwrap_or(4);
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: tex,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(width * bytes_per_pixel),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: convert::address_mode(desc.address_mode),
            address_mode_v: convert::address_mode(desc.address_mode),
            address_mode_w: convert::address_mode(desc.address_mode),
            mag_filter: convert::filter_mode(desc.filter),
            min_filter: convert::filter_mode(desc.filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            compare: desc.compare.map(convert::compare_function),
            anisotropy_clamp: 1,
            border_color: None,
        });

        let id = self.next_handle();
        self.samplers.insert(id, sampler);
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let wgpu_entries: Vec<wgpu::BindGroupLayoutEntry> = entries
            .iter()
            .map(|e| wgpu::BindGroupLayoutEntry {
                binding: e.binding,
                visibility: convert::shader_stages(e.visibility),
                ty: convert::binding_type(&e.ty),
                count: None,
            })
            .collect();

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &wgpu_entries,
            });

        let id = self.next_handle();
        self.bind_group_layouts.insert(id, layout);
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout_ref = self
            .bind_group_layouts
            .get(&layout.0)
            .ok_or_else(|| BackendError::PipelineCreationFailed("Layout not found".into()))?;

        let mut wgpu_entries = Vec::with_capacity(entries.len());
        for (binding, entry) in entries {
            let resource = match entry {
                BindGroupEntry::Buffer { buffer, offset, size } => {
                    let buf = self.buffers.get(&buffer.0).ok_or_else(|| {
                        BackendError::PipelineCreationFailed(format!("Buffer for binding {binding} not found"))
                    })?;
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: buf,
                        offset: *offset,
                        size: size.and_then(std::num::NonZeroU64::new),
                    })
                }
                BindGroupEntry::Texture(view) => {
                    let entry = self.texture_views.get(&view.0).ok_or_else(|| {
                        BackendError::PipelineCreationFailed(format!("View for binding {binding} not found"))
                    })?;
                    wgpu::BindingResource::TextureView(&entry.view)
                }
                BindGroupEntry::Sampler(sampler) => {
                    let s = self.samplers.get(&sampler.0).ok_or_else(|| {
                        BackendError::PipelineCreationFailed(format!("Sampler for binding {binding} not found"))
                    })?;
                    wgpu::BindingResource::Sampler(s)
                }
            };
            wgpu_entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource,
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: layout_ref,
            entries: &wgpu_entries,
        });

        let id = self.next_handle();
        self.bind_groups.insert(id, bind_group);
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.shader.as_str().into()),
            });

        let layouts = desc
            .bind_group_layouts
            .iter()
            .map(|h| {
                self.bind_group_layouts.get(&h.0).ok_or_else(|| {
                    BackendError::PipelineCreationFailed(format!("{:?}: layout not found", desc.label))
                })
            })
            .collect::<BackendResult<Vec<&wgpu::BindGroupLayout>>>()?;

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        // Attribute vectors must outlive the layouts borrowing them
        let vertex_attrs: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: convert::vertex_format(a.format),
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();

        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layouts
            .iter()
            .zip(vertex_attrs.iter())
            .map(|(layout, attrs)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: if layout.per_instance {
                    wgpu::VertexStepMode::Instance
                } else {
                    wgpu::VertexStepMode::Vertex
                },
                attributes: attrs,
            })
            .collect();

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: convert::texture_format(target.format),
                    blend: target.blend.as_ref().map(convert::blend_state),
                    write_mask: wgpu::ColorWrites::from_bits_truncate(target.write_mask.0),
                })
            })
            .collect();

        let depth_stencil = desc.depth_stencil.as_ref().map(|ds| wgpu::DepthStencilState {
            format: convert::texture_format(ds.format),
            depth_write_enabled: ds.depth_write_enabled,
            depth_compare: convert::compare_function(ds.depth_compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: &desc.vertex_entry,
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: desc.fragment_entry.as_deref().map(|entry_point| wgpu::FragmentState {
                    module: &shader,
                    entry_point,
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: convert::primitive_state(desc),
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: desc.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            });

        let id = self.next_handle();
        self.render_pipelines.insert(id, pipeline);
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if let Some(previous) = self.pending_render_pass.take() {
            log::warn!(
                "Render pass {:?} begun before {:?} ended",
                desc.label,
                previous.descriptor.label
            );
            self.flush_pass(previous);
        }
        self.pending_render_pass = Some(PendingRenderPass {
            descriptor: desc.clone(),
            layer: None,
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        if let Some(pending) = self.pending_render_pass.take() {
            self.flush_pass(pending);
        }
    }

    fn set_attachment_layer(&mut self, layer: u32) {
        let Some(pending) = self.pending_render_pass.take() else {
            return;
        };
        let descriptor = pending.descriptor.clone();
        let viewport = pending
            .commands
            .iter()
            .rev()
            .find(|cmd| matches!(cmd, RenderCommand::SetViewport(_)))
            .cloned();
        // A layer switch ends the wgpu pass; the next layer continues in a fresh one.
        // Layered passes always run so their load ops (clears) take effect.
        if pending.layer.is_some() || !pending.commands.is_empty() {
            self.flush_pass(pending);
        }
        self.pending_render_pass = Some(PendingRenderPass {
            descriptor,
            layer: Some(layer),
            commands: viewport.into_iter().collect(),
        });
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.push_command(RenderCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.push_command(RenderCommand::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.push_command(RenderCommand::SetVertexBuffer { slot, buffer, offset });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.push_command(RenderCommand::SetIndexBuffer { buffer, offset, format });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.push_command(RenderCommand::SetViewport(*viewport));
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        self.push_command(RenderCommand::Draw { vertices, instances });
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        self.push_command(RenderCommand::DrawIndexed { indices, base_vertex, instances });
    }

    fn begin_occlusion_query(&mut self, index: u32) {
        if self.queries.slots.begin(index) {
            self.push_command(RenderCommand::BeginOcclusionQuery(index));
        }
    }

    fn end_occlusion_query(&mut self) {
        if self.queries.slots.end() {
            self.push_command(RenderCommand::EndOcclusionQuery);
        }
    }

    fn occlusion_query_results(&mut self) -> BackendResult<Vec<u64>> {
        let count = self.queries.submitted;
        if count == 0 {
            return Ok(Vec::new());
        }

        let slice = self.queries.readback.slice(0..count as u64 * 8);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::QueryReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::QueryReadbackFailed(e.to_string()))?;

        let results = {
            let data = slice.get_mapped_range();
            data.chunks_exact(8)
                .map(|chunk| {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(chunk);
                    u64::from_le_bytes(bytes)
                })
                .collect()
        };
        self.queries.readback.unmap();
        Ok(results)
    }

    fn set_render_config(&mut self, config: Option<RenderConfig>) {
        self.render_config = config;
    }

    fn render_config(&self) -> Option<RenderConfig> {
        self.render_config
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.buffers.remove(&buffer.0) {
            buf.destroy();
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(tex) = self.textures.remove(&texture.0) {
            tex.destroy();
        }
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.texture_views.remove(&view.0);
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.render_pipelines.remove(&pipeline.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_beyond_last_slot_drops_its_end() {
        let mut slots = QuerySlots::default();
        assert!(!slots.begin(MAX_OCCLUSION_QUERIES));
        assert!(!slots.end());
        assert_eq!(slots.recorded, 0);
    }

    #[test]
    fn test_query_slots_track_highest_index() {
        let mut slots = QuerySlots::default();
        assert!(slots.begin(3));
        assert!(slots.end());
        assert!(slots.begin(MAX_OCCLUSION_QUERIES - 1));
        assert!(slots.end());
        assert_eq!(slots.recorded, MAX_OCCLUSION_QUERIES);
    }

    #[test]
    fn test_nested_query_is_rejected_until_end() {
        let mut slots = QuerySlots::default();
        assert!(slots.begin(0));
        assert!(!slots.begin(1));
        assert!(slots.end());
        assert!(!slots.end());
        assert_eq!(slots.recorded, 1);
    }
}
