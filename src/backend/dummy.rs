//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out handles,
//! records every call as a [`BackendCommand`] and checks render pass nesting, so the
//! frame pipeline can be exercised and inspected without GPU hardware.
//!
//! Bind groups are checked against their layouts the way a GPU validates them: a
//! filtering binding rejects views of formats that cannot be filtered.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    BeginFrame,
    EndFrame,
    WaitIdle,
    CreateTexture {
        label: Option<String>,
        width: u32,
        height: u32,
        layers: u32,
        sample_count: u32,
        format: TextureFormat,
    },
    BeginRenderPass {
        label: Option<String>,
        color_attachments: Vec<TextureViewHandle>,
        depth_attachment: Option<TextureViewHandle>,
        clears: bool,
    },
    EndRenderPass,
    SetAttachmentLayer(u32),
    SetPipeline(RenderPipelineHandle),
    SetViewport { width: f32, height: f32 },
    Draw { vertices: u32, instances: u32 },
    DrawIndexed { indices: u32, instances: u32 },
    BeginOcclusionQuery(u32),
    EndOcclusionQuery,
    SetRenderConfig(Option<RenderConfig>),
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    width: u32,
    height: u32,
    next_id: u64,
    in_render_pass: bool,
    in_frame: bool,
    frame_view: Option<TextureViewHandle>,
    render_config: Option<RenderConfig>,
    live_textures: HashMap<u64, TextureFormat>,
    view_formats: HashMap<u64, TextureFormat>,
    layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    pipeline_labels: Vec<(RenderPipelineHandle, Option<String>)>,
    commands: Vec<BackendCommand>,
    pending_queries: u64,
    submitted_queries: u64,
}

impl DummyBackend {
    /// Create a new dummy backend with a presentation surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_id: 1,
            in_render_pass: false,
            in_frame: false,
            frame_view: None,
            render_config: None,
            live_textures: HashMap::new(),
            view_formats: HashMap::new(),
            layouts: HashMap::new(),
            pipeline_labels: Vec::new(),
            commands: Vec::new(),
            pending_queries: 0,
            submitted_queries: 0,
        }
    }

    /// All calls recorded since creation or the last [`DummyBackend::take_commands`].
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Drain the recorded calls.
    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of textures created and not yet destroyed.
    pub fn live_texture_count(&self) -> usize {
        self.live_textures.len()
    }

    /// Label a pipeline was created with.
    pub fn pipeline_label(&self, pipeline: RenderPipelineHandle) -> Option<&str> {
        self.pipeline_labels
            .iter()
            .find(|(handle, _)| *handle == pipeline)
            .and_then(|(_, label)| label.as_deref())
    }

    /// View handle of the presentation target for the frame in flight.
    pub fn frame_view(&self) -> Option<TextureViewHandle> {
        self.frame_view
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: BackendCommand) {
        log::trace!("DummyBackend: {:?}", command);
        self.commands.push(command);
    }

    fn assert_in_pass(&self, call: &str) {
        assert!(
            self.in_render_pass,
            "DummyBackend: {call} recorded outside of a render pass"
        );
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl GraphicsBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        assert!(!self.in_frame, "DummyBackend: begin_frame while a frame is open");
        self.in_frame = true;
        let view = TextureViewHandle(self.next_handle());
        self.frame_view = Some(view);
        self.record(BackendCommand::BeginFrame);
        Ok(FrameContext {
            swapchain_view: view,
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        assert!(self.in_frame, "DummyBackend: end_frame without begin_frame");
        assert!(
            !self.in_render_pass,
            "DummyBackend: end_frame with an open render pass"
        );
        self.in_frame = false;
        self.frame_view = None;
        self.submitted_queries = std::mem::take(&mut self.pending_queries);
        self.record(BackendCommand::EndFrame);
        Ok(())
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        self.record(BackendCommand::WaitIdle);
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        Ok(BufferHandle(self.next_handle()))
    }

    fn write_buffer(&mut self, _buffer: BufferHandle, _offset: u64, _data: &[u8]) {}

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let id = self.next_handle();
        self.live_textures.insert(id, desc.format);
        self.record(BackendCommand::CreateTexture {
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            layers: desc.layers,
            sample_count: desc.sample_count,
            format: desc.format,
        });
        Ok(TextureHandle(id))
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        _desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let Some(format) = self.live_textures.get(&texture.0).copied() else {
            return Err(BackendError::TextureCreationFailed(
                "Texture not found".into(),
            ));
        };
        let id = self.next_handle();
        self.view_formats.insert(id, format);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, _texture: TextureHandle, _data: &[u8], _width: u32, _height: u32) {}

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        Ok(SamplerHandle(self.next_handle()))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.next_handle();
        self.layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout_entries = self.layouts.get(&layout.0).map(Vec::as_slice).unwrap_or(&[]);
        for (binding, entry) in entries {
            let BindGroupEntry::Texture(view) = entry else {
                continue;
            };
            // Views this backend never created (the swapchain, handles made up by tests) pass
            let Some(format) = self.view_formats.get(&view.0) else {
                continue;
            };
            let filtering = layout_entries.iter().any(|e| {
                e.binding == *binding
                    && matches!(
                        e.ty,
                        BindingType::Texture {
                            sample_type: TextureSampleType::Float { filterable: true },
                            ..
                        }
                    )
            });
            if filtering && !format.is_filterable() {
                return Err(BackendError::BindGroupCreationFailed(format!(
                    "binding {binding} filters a {format:?} view"
                )));
            }
        }
        Ok(BindGroupHandle(self.next_handle()))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("DummyBackend: creating pipeline {:?}", desc.label);
        let handle = RenderPipelineHandle(self.next_handle());
        self.pipeline_labels.push((handle, desc.label.clone()));
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        assert!(
            !self.in_render_pass,
            "DummyBackend: render pass {:?} begun while another pass is open",
            desc.label
        );
        self.in_render_pass = true;
        let clears = desc
            .color_attachments
            .iter()
            .any(|a| matches!(a.load_op, LoadOp::Clear(_)))
            || desc
                .depth_stencil_attachment
                .as_ref()
                .is_some_and(|d| matches!(d.depth_load_op, LoadOp::Clear(_)));
        self.record(BackendCommand::BeginRenderPass {
            label: desc.label.clone(),
            color_attachments: desc.color_attachments.iter().map(|a| a.view).collect(),
            depth_attachment: desc.depth_stencil_attachment.as_ref().map(|d| d.view),
            clears,
        });
    }

    fn end_render_pass(&mut self) {
        assert!(
            self.in_render_pass,
            "DummyBackend: end_render_pass without an open pass"
        );
        self.in_render_pass = false;
        self.record(BackendCommand::EndRenderPass);
    }

    fn set_attachment_layer(&mut self, layer: u32) {
        self.assert_in_pass("set_attachment_layer");
        self.record(BackendCommand::SetAttachmentLayer(layer));
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.assert_in_pass("set_render_pipeline");
        self.record(BackendCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, _index: u32, _bind_group: BindGroupHandle) {
        self.assert_in_pass("set_bind_group");
    }

    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: BufferHandle, _offset: u64) {
        self.assert_in_pass("set_vertex_buffer");
    }

    fn set_index_buffer(&mut self, _buffer: BufferHandle, _offset: u64, _format: IndexFormat) {
        self.assert_in_pass("set_index_buffer");
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.assert_in_pass("set_viewport");
        self.record(BackendCommand::SetViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        self.assert_in_pass("draw");
        self.record(BackendCommand::Draw {
            vertices: vertices.len() as u32,
            instances: instances.len() as u32,
        });
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        _base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        self.assert_in_pass("draw_indexed");
        self.record(BackendCommand::DrawIndexed {
            indices: indices.len() as u32,
            instances: instances.len() as u32,
        });
    }

    fn begin_occlusion_query(&mut self, index: u32) {
        self.assert_in_pass("begin_occlusion_query");
        self.pending_queries += 1;
        self.record(BackendCommand::BeginOcclusionQuery(index));
    }

    fn end_occlusion_query(&mut self) {
        self.assert_in_pass("end_occlusion_query");
        self.record(BackendCommand::EndOcclusionQuery);
    }

    fn occlusion_query_results(&mut self) -> BackendResult<Vec<u64>> {
        // Every query reports full visibility of a single sample.
        Ok(vec![1; self.submitted_queries as usize])
    }

    fn set_render_config(&mut self, config: Option<RenderConfig>) {
        self.render_config = config;
        self.record(BackendCommand::SetRenderConfig(config));
    }

    fn render_config(&self) -> Option<RenderConfig> {
        self.render_config
    }

    fn destroy_buffer(&mut self, _buffer: BufferHandle) {}

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.live_textures.remove(&texture.0);
    }

    fn destroy_texture_view(&mut self, _view: TextureViewHandle) {}

    fn destroy_sampler(&mut self, _sampler: SamplerHandle) {}

    fn destroy_bind_group(&mut self, _bind_group: BindGroupHandle) {}

    fn destroy_render_pipeline(&mut self, _pipeline: RenderPipelineHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_backend_records_passes() {
        let mut backend = DummyBackend::new(64, 32);
        let frame = backend.begin_frame().unwrap();
        assert_eq!((frame.width, frame.height), (64, 32));

        backend.begin_render_pass(&RenderPassDescriptor::single("test", frame.swapchain_view));
        backend.draw(0..3, 0..1);
        backend.end_render_pass();
        backend.end_frame().unwrap();

        assert_eq!(
            backend.commands().last(),
            Some(&BackendCommand::EndFrame)
        );
        assert!(backend
            .commands()
            .contains(&BackendCommand::Draw { vertices: 3, instances: 1 }));
    }

    #[test]
    #[should_panic(expected = "begun while another pass is open")]
    fn test_dummy_backend_rejects_nested_passes() {
        let mut backend = DummyBackend::default();
        let frame = backend.begin_frame().unwrap();
        backend.begin_render_pass(&RenderPassDescriptor::single("outer", frame.swapchain_view));
        backend.begin_render_pass(&RenderPassDescriptor::single("inner", frame.swapchain_view));
    }

    #[test]
    fn test_dummy_backend_tracks_live_textures() {
        let mut backend = DummyBackend::default();
        let texture = backend
            .create_texture(&TextureDescriptor::render_target(
                "color",
                4,
                4,
                TextureFormat::Rgba8Unorm,
            ))
            .unwrap();
        assert_eq!(backend.live_texture_count(), 1);
        backend.destroy_texture(texture);
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    fn test_dummy_backend_rejects_filtering_unfilterable_views() {
        let mut backend = DummyBackend::default();
        let positions = backend
            .create_texture(&TextureDescriptor::render_target(
                "positions",
                4,
                4,
                TextureFormat::Rgba32Float,
            ))
            .unwrap();
        let view = backend
            .create_texture_view(positions, &TextureViewDescriptor::default())
            .unwrap();
        let texture_entry = |filterable| BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable },
                dimension: TextureViewDimension::D2,
                multisampled: false,
            },
        };

        let filtered = backend.create_bind_group_layout(&[texture_entry(true)]).unwrap();
        let result = backend.create_bind_group(filtered, &[(0, BindGroupEntry::Texture(view))]);
        assert!(matches!(result, Err(BackendError::BindGroupCreationFailed(_))));

        let loaded = backend.create_bind_group_layout(&[texture_entry(false)]).unwrap();
        assert!(backend
            .create_bind_group(loaded, &[(0, BindGroupEntry::Texture(view))])
            .is_ok());
    }

    #[test]
    fn test_dummy_backend_query_results_follow_submission() {
        let mut backend = DummyBackend::default();
        let frame = backend.begin_frame().unwrap();
        backend.begin_render_pass(&RenderPassDescriptor::single("queries", frame.swapchain_view));
        backend.begin_occlusion_query(0);
        backend.end_occlusion_query();
        backend.end_render_pass();
        assert!(backend.occlusion_query_results().unwrap().is_empty());
        backend.end_frame().unwrap();
        assert_eq!(backend.occlusion_query_results().unwrap(), vec![1]);
    }
}
