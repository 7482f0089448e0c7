//! Multi-attachment render targets
//!
//! A [`RenderTarget`] owns every texture it renders into. Attachments are created eagerly
//! in [`RenderTarget::create`], so downstream passes can take views of them before the
//! first frame. Drawing happens through [`RenderTarget::bind`], which returns a guard that
//! holds the backend exclusively until it is dropped.

use crate::backend::{
    BackendResult, ColorAttachment, DepthStencilAttachment, GraphicsBackend, LoadOp,
    RenderPassDescriptor, StoreOp, TextureDescriptor, TextureFormat, TextureHandle,
    TextureUsage, TextureViewDescriptor, TextureViewHandle, Viewport,
};

/// Kind of an attachment within a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Albedo,
    Normal,
    Position,
    SpecularEmission,
    LightScattering,
    Alpha,
    Depth,
}

impl Attachment {
    pub fn format(&self) -> TextureFormat {
        match self {
            Attachment::Position => TextureFormat::Rgba32Float,
            Attachment::Depth => TextureFormat::Depth32Float,
            _ => TextureFormat::Rgba16Float,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Attachment::Albedo => "albedo",
            Attachment::Normal => "normal",
            Attachment::Position => "position",
            Attachment::SpecularEmission => "specular-emission",
            Attachment::LightScattering => "light-scattering",
            Attachment::Alpha => "alpha",
            Attachment::Depth => "depth",
        }
    }
}

/// One texture owned by a render target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetTexture {
    pub kind: Attachment,
    pub texture: TextureHandle,
    /// View over every layer
    pub view: TextureViewHandle,
    pub format: TextureFormat,
    pub sample_count: u32,
}

/// Layout of a render target
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    /// Array layers of every attachment
    pub layers: u32,
    /// Drawn one layer at a time and sampled as a 2D array
    pub layered: bool,
    /// Color attachments in shader output order, plus at most one depth attachment
    pub attachments: Vec<Attachment>,
}

impl RenderTargetDescriptor {
    /// Opaque G-buffer target, multisampled at `samples`.
    pub fn offscreen(width: u32, height: u32, samples: u32) -> Self {
        Self {
            label: "offscreen".into(),
            width,
            height,
            sample_count: samples,
            layers: 1,
            layered: false,
            attachments: vec![
                Attachment::Albedo,
                Attachment::Normal,
                Attachment::Position,
                Attachment::SpecularEmission,
                Attachment::LightScattering,
                Attachment::Depth,
            ],
        }
    }

    /// Single-sampled forward target for transparent geometry.
    pub fn transparency(width: u32, height: u32) -> Self {
        Self {
            label: "transparency".into(),
            width,
            height,
            sample_count: 1,
            layers: 1,
            layered: false,
            attachments: vec![
                Attachment::Albedo,
                Attachment::Alpha,
                Attachment::LightScattering,
                Attachment::Depth,
            ],
        }
    }

    /// Square depth-only target with one layer per shadow cascade.
    pub fn shadow_cascades(resolution: u32, cascades: u32) -> Self {
        Self {
            label: "shadow-cascades".into(),
            width: resolution,
            height: resolution,
            sample_count: 1,
            layers: cascades,
            layered: true,
            attachments: vec![Attachment::Depth],
        }
    }
}

/// A set of attachments drawn into together
#[derive(Debug)]
pub struct RenderTarget {
    label: String,
    width: u32,
    height: u32,
    sample_count: u32,
    layers: u32,
    layered: bool,
    attachments: Vec<TargetTexture>,
}

impl RenderTarget {
    /// Allocate every attachment of `desc`.
    ///
    /// Panics on an invalid layout: zero extent, a sample count outside {1, 2, 4, 8},
    /// no attachments, or the same attachment kind twice.
    pub fn create(
        backend: &mut dyn GraphicsBackend,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<Self> {
        assert!(
            desc.width > 0 && desc.height > 0 && desc.layers > 0,
            "render target {} must have a non-zero extent, got {}x{}x{}",
            desc.label,
            desc.width,
            desc.height,
            desc.layers
        );
        assert!(
            matches!(desc.sample_count, 1 | 2 | 4 | 8),
            "render target {} has invalid sample count {}",
            desc.label,
            desc.sample_count
        );
        assert!(
            desc.layered || desc.layers == 1,
            "render target {} has {} layers but is not layered",
            desc.label,
            desc.layers
        );
        assert!(
            !desc.attachments.is_empty(),
            "render target {} has no attachments",
            desc.label
        );
        for (i, kind) in desc.attachments.iter().enumerate() {
            assert!(
                !desc.attachments[..i].contains(kind),
                "render target {} lists the {} attachment twice",
                desc.label,
                kind.name()
            );
        }
        assert!(
            desc.attachments.iter().filter(|a| a.format().is_depth()).count() <= 1,
            "render target {} has more than one depth attachment",
            desc.label
        );

        let mut attachments = Vec::with_capacity(desc.attachments.len());
        for &kind in &desc.attachments {
            let format = kind.format();
            let texture = backend.create_texture(&TextureDescriptor {
                label: Some(format!("{} {}", desc.label, kind.name())),
                width: desc.width,
                height: desc.height,
                layers: desc.layers,
                sample_count: desc.sample_count,
                format,
                usage: TextureUsage::ATTACHMENT_SAMPLED,
            })?;
            let view_desc = if desc.layered {
                TextureViewDescriptor::array()
            } else {
                TextureViewDescriptor::default()
            };
            let view = backend.create_texture_view(texture, &view_desc)?;
            attachments.push(TargetTexture {
                kind,
                texture,
                view,
                format,
                sample_count: desc.sample_count,
            });
        }

        log::debug!(
            "Created render target {} ({}x{}, {} samples, {} layers, {} attachments)",
            desc.label,
            desc.width,
            desc.height,
            desc.sample_count,
            desc.layers,
            attachments.len()
        );

        Ok(Self {
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            sample_count: desc.sample_count,
            layers: desc.layers,
            layered: desc.layered,
            attachments,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn is_layered(&self) -> bool {
        self.layered
    }

    pub fn attachments(&self) -> &[TargetTexture] {
        &self.attachments
    }

    pub fn get(&self, kind: Attachment) -> Option<&TargetTexture> {
        self.attachments.iter().find(|a| a.kind == kind)
    }

    /// The attachment of kind `kind`.
    ///
    /// Asking a target for an attachment it was not created with is a pipeline wiring
    /// defect and panics.
    pub fn attachment(&self, kind: Attachment) -> &TargetTexture {
        match self.get(kind) {
            Some(texture) => texture,
            None => panic!(
                "render target {} has no {} attachment",
                self.label,
                kind.name()
            ),
        }
    }

    pub fn view(&self, kind: Attachment) -> TextureViewHandle {
        self.attachment(kind).view
    }

    /// Viewport covering the whole target.
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }

    fn pass_descriptor(
        &self,
        load_op: impl Fn(bool) -> LoadOp,
        purpose: &str,
    ) -> RenderPassDescriptor {
        let mut color_attachments = Vec::new();
        let mut depth_stencil_attachment = None;
        for attachment in &self.attachments {
            if attachment.format.is_depth() {
                depth_stencil_attachment = Some(DepthStencilAttachment {
                    view: attachment.view,
                    depth_load_op: load_op(true),
                    depth_store_op: StoreOp::Store,
                    depth_clear_value: 1.0,
                });
            } else {
                color_attachments.push(ColorAttachment {
                    view: attachment.view,
                    resolve_target: None,
                    load_op: load_op(false),
                    store_op: StoreOp::Store,
                });
            }
        }
        RenderPassDescriptor {
            label: Some(format!("{} {}", self.label, purpose)),
            color_attachments,
            depth_stencil_attachment,
        }
    }

    /// Make this target the draw destination until the returned guard is dropped.
    ///
    /// The viewport is set to the target's resolution. Layered targets start on layer 0.
    pub fn bind<'a>(&'a self, backend: &'a mut dyn GraphicsBackend) -> BoundTarget<'a> {
        log::trace!("bind {}", self.label);
        backend.begin_render_pass(&self.pass_descriptor(|_| LoadOp::Load, "draw"));
        if self.layered {
            backend.set_attachment_layer(0);
        }
        backend.set_viewport(&self.viewport());
        BoundTarget {
            target: self,
            backend,
        }
    }

    /// Reset color attachments to transparent black and depth to 1.0, on every layer.
    pub fn clear(&self, backend: &mut dyn GraphicsBackend) {
        let desc = self.pass_descriptor(
            |depth| {
                if depth {
                    LoadOp::Clear([1.0; 4])
                } else {
                    LoadOp::Clear([0.0; 4])
                }
            },
            "clear",
        );
        backend.begin_render_pass(&desc);
        if self.layered {
            for layer in 0..self.layers {
                backend.set_attachment_layer(layer);
            }
        }
        backend.end_render_pass();
    }

    /// Release every attachment.
    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for attachment in self.attachments {
            backend.destroy_texture_view(attachment.view);
            backend.destroy_texture(attachment.texture);
        }
        log::debug!("Destroyed render target {}", self.label);
    }
}

/// A bound render target. Dropping it ends the render pass.
///
/// The guard holds the exclusive borrow of the backend, so no other target can be bound
/// while it lives.
pub struct BoundTarget<'a> {
    target: &'a RenderTarget,
    backend: &'a mut dyn GraphicsBackend,
}

impl<'a> BoundTarget<'a> {
    pub fn target(&self) -> &RenderTarget {
        self.target
    }

    /// Backend recording into the bound target.
    pub fn backend(&mut self) -> &mut dyn GraphicsBackend {
        &mut *self.backend
    }

    pub fn unbind(self) {}
}

impl Drop for BoundTarget<'_> {
    fn drop(&mut self) {
        self.backend.end_render_pass();
        log::trace!("unbind {}", self.target.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, DummyBackend};

    fn pass_commands(backend: &DummyBackend) -> Vec<&BackendCommand> {
        backend
            .commands()
            .iter()
            .filter(|c| !matches!(c, BackendCommand::CreateTexture { .. }))
            .collect()
    }

    #[test]
    fn test_offscreen_layout() {
        let mut backend = DummyBackend::new(64, 64);
        let target =
            RenderTarget::create(&mut backend, &RenderTargetDescriptor::offscreen(64, 32, 4))
                .unwrap();

        assert_eq!(target.resolution(), (64, 32));
        assert_eq!(target.attachments().len(), 6);
        assert_eq!(target.attachment(Attachment::Position).format, TextureFormat::Rgba32Float);
        assert!(target.attachments().iter().all(|a| a.sample_count == 4));
        assert!(target.get(Attachment::Alpha).is_none());
        assert_eq!(backend.live_texture_count(), 6);
    }

    #[test]
    fn test_bind_sets_viewport_and_unbinds_on_drop() {
        let mut backend = DummyBackend::new(64, 64);
        let target =
            RenderTarget::create(&mut backend, &RenderTargetDescriptor::transparency(32, 16))
                .unwrap();
        backend.take_commands();

        {
            let mut bound = target.bind(&mut backend);
            bound.backend().draw(0..3, 0..1);
        }

        let commands = pass_commands(&backend);
        assert!(matches!(
            commands[0],
            BackendCommand::BeginRenderPass { clears: false, depth_attachment: Some(_), .. }
        ));
        assert_eq!(
            commands[1],
            &BackendCommand::SetViewport {
                width: 32.0,
                height: 16.0
            }
        );
        assert_eq!(commands.last(), Some(&&BackendCommand::EndRenderPass));
    }

    #[test]
    fn test_clear_visits_every_cascade_layer() {
        let mut backend = DummyBackend::new(64, 64);
        let target = RenderTarget::create(
            &mut backend,
            &RenderTargetDescriptor::shadow_cascades(128, 4),
        )
        .unwrap();
        backend.take_commands();

        target.clear(&mut backend);

        let layers: Vec<u32> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                BackendCommand::SetAttachmentLayer(layer) => Some(*layer),
                _ => None,
            })
            .collect();
        assert_eq!(layers, vec![0, 1, 2, 3]);
        assert!(matches!(
            backend.commands()[0],
            BackendCommand::BeginRenderPass { clears: true, .. }
        ));
    }

    #[test]
    fn test_single_cascade_is_still_layered() {
        let mut backend = DummyBackend::new(64, 64);
        let target =
            RenderTarget::create(&mut backend, &RenderTargetDescriptor::shadow_cascades(32, 1))
                .unwrap();
        assert!(target.is_layered());

        target.bind(&mut backend).unbind();
        assert!(backend
            .commands()
            .contains(&BackendCommand::SetAttachmentLayer(0)));
    }

    #[test]
    #[should_panic(expected = "not layered")]
    fn test_unlayered_target_needs_one_layer() {
        let mut backend = DummyBackend::new(64, 64);
        let mut desc = RenderTargetDescriptor::transparency(8, 8);
        desc.layers = 2;
        let _ = RenderTarget::create(&mut backend, &desc);
    }

    #[test]
    fn test_destroy_releases_textures() {
        let mut backend = DummyBackend::new(64, 64);
        let target =
            RenderTarget::create(&mut backend, &RenderTargetDescriptor::offscreen(8, 8, 1))
                .unwrap();
        target.destroy(&mut backend);
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    #[should_panic(expected = "has no alpha attachment")]
    fn test_missing_attachment_panics() {
        let mut backend = DummyBackend::new(64, 64);
        let target =
            RenderTarget::create(&mut backend, &RenderTargetDescriptor::offscreen(8, 8, 1))
                .unwrap();
        target.attachment(Attachment::Alpha);
    }

    #[test]
    #[should_panic(expected = "non-zero extent")]
    fn test_zero_resolution_panics() {
        let mut backend = DummyBackend::new(64, 64);
        let _ = RenderTarget::create(&mut backend, &RenderTargetDescriptor::transparency(0, 8));
    }

    #[test]
    #[should_panic(expected = "invalid sample count")]
    fn test_invalid_sample_count_panics() {
        let mut backend = DummyBackend::new(64, 64);
        let _ = RenderTarget::create(&mut backend, &RenderTargetDescriptor::offscreen(8, 8, 3));
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn test_duplicate_attachment_panics() {
        let mut backend = DummyBackend::new(64, 64);
        let mut desc = RenderTargetDescriptor::transparency(8, 8);
        desc.attachments.push(Attachment::Alpha);
        let _ = RenderTarget::create(&mut backend, &desc);
    }
}
