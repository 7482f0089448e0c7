//! Frame orchestrator of the deferred pipeline
//!
//! [`DeferredRenderer`] owns every render target and screen-space pass, allocated once in
//! [`DeferredRenderer::init`] at screen resolution, and sequences them each frame:
//!
//! 1. Clear the opaque, transparency and shadow targets
//! 2. Shadow cascades, opaque G-buffer and forward transparency, drawn by the scene
//! 3. Ambient occlusion (optional), coverage mask, deferred lighting, transparency blend
//! 4. Worker wake-up
//! 5. Post-processing chain over the blended scene
//! 6. Debug view or plain present, then lens flare and overlay
//! 7. Submit and wait for the GPU
//!
//! Every executed stage is appended to a [`FrameTrace`] readable after the frame.

use crate::backend::{
    BackendResult, GraphicsBackend, RenderConfig, TextureFormat, TextureViewHandle, Viewport,
};
use crate::chain::{PostInputs, PostProcessChain};
use crate::config::{FeatureToggles, RendererConfig};
use crate::context::RenderContext;
use crate::debug_view::{DebugSource, DebugView, DebugViewSelector};
use crate::frame::{CameraMotion, FrameStage, FrameState, FrameTrace};
use crate::input::{InputState, ToggleEvent};
use crate::pipeline::postprocess::{standard_chain, LensFlareInputs, LensFlarePass};
use crate::pipeline::{
    AmbientOcclusionInputs, AmbientOcclusionPass, Blit, BlitMode, CoverageMaskInputs,
    CoverageMaskPass, DeferredLightingInputs, DeferredLightingPass, Pass, ShaderLibrary,
    TransparencyBlendInputs, TransparencyBlendPass,
};
use crate::render_target::{Attachment, RenderTarget, RenderTargetDescriptor};
use crate::scene::{Overlay, SceneGraph};

/// Render targets and passes, alive from `init` until `shutdown`
struct PipelineResources {
    opaque: RenderTarget,
    transparency: RenderTarget,
    shadows: RenderTarget,
    ambient_occlusion: AmbientOcclusionPass,
    coverage_mask: CoverageMaskPass,
    lighting: DeferredLightingPass,
    transparency_blend: TransparencyBlendPass,
    post: PostProcessChain,
    lens_flare: LensFlarePass,
    /// Display texture to the presentation target
    present: Blit,
    /// Raw G-buffer attachment added over the presented frame
    gbuffer_overlay: Blit,
}

impl PipelineResources {
    fn create(
        backend: &mut dyn GraphicsBackend,
        config: &RendererConfig,
        shaders: &dyn ShaderLibrary,
    ) -> BackendResult<Self> {
        let (width, height) = (config.width, config.height);
        let samples = config.samples;
        let surface_format: TextureFormat = backend.swapchain_format();

        let opaque = RenderTarget::create(
            backend,
            &RenderTargetDescriptor::offscreen(width, height, samples),
        )?;
        let transparency =
            RenderTarget::create(backend, &RenderTargetDescriptor::transparency(width, height))?;
        let shadows = RenderTarget::create(
            backend,
            &RenderTargetDescriptor::shadow_cascades(
                config.shadow_resolution,
                config.shadow_cascades,
            ),
        )?;

        Ok(Self {
            opaque,
            transparency,
            shadows,
            ambient_occlusion: AmbientOcclusionPass::new(
                backend,
                shaders,
                (width, height),
                samples,
            )?,
            coverage_mask: CoverageMaskPass::new(backend, shaders, (width, height), samples)?,
            lighting: DeferredLightingPass::new(
                backend,
                shaders,
                (width, height),
                samples,
                config.shadow_cascades,
            )?,
            transparency_blend: TransparencyBlendPass::new(
                backend,
                shaders,
                (width, height),
                samples,
            )?,
            post: standard_chain(backend, shaders, (width, height), samples)?,
            lens_flare: LensFlarePass::new(backend, shaders, surface_format)?,
            present: Blit::new(backend, "present", BlitMode::Copy, surface_format, false)?,
            gbuffer_overlay: Blit::new(
                backend,
                "g-buffer debug view",
                BlitMode::gbuffer(samples),
                surface_format,
                true,
            )?,
        })
    }

    fn destroy(self, backend: &mut dyn GraphicsBackend) {
        self.opaque.destroy(backend);
        self.transparency.destroy(backend);
        self.shadows.destroy(backend);
        self.ambient_occlusion.destroy(backend);
        self.coverage_mask.destroy(backend);
        self.lighting.destroy(backend);
        self.transparency_blend.destroy(backend);
        self.post.destroy(backend);
        self.lens_flare.destroy(backend);
        self.present.destroy(backend);
        self.gbuffer_overlay.destroy(backend);
    }
}

fn record(trace: &mut FrameTrace, stage: FrameStage) {
    log::trace!("frame stage {}", stage);
    trace.push(stage);
}

/// Per-frame driver of the deferred pipeline.
///
/// Lifecycle: [`new`](Self::new), [`init`](Self::init) once, then
/// [`update`](Self::update) and [`render`](Self::render) every frame, and finally
/// [`shutdown`](Self::shutdown).
pub struct DeferredRenderer<B: GraphicsBackend, S: SceneGraph> {
    config: RendererConfig,
    backend: B,
    scene: S,
    context: RenderContext,
    overlay: Option<Box<dyn Overlay>>,
    toggles: FeatureToggles,
    debug: DebugViewSelector,
    resources: Option<PipelineResources>,
    initialized: bool,
    frame_index: u64,
    frame_state: Option<FrameState>,
    trace: FrameTrace,
}

impl<B: GraphicsBackend, S: SceneGraph> DeferredRenderer<B, S> {
    /// Panics if `config` is invalid. No GPU resources are created before `init`.
    pub fn new(config: RendererConfig, backend: B, scene: S, context: RenderContext) -> Self {
        config.validate();
        Self {
            toggles: config.toggles,
            config,
            backend,
            scene,
            context,
            overlay: None,
            debug: DebugViewSelector::new(),
            resources: None,
            initialized: false,
            frame_index: 0,
            frame_state: None,
            trace: FrameTrace::new(),
        }
    }

    /// Allocate every target and pass, then wait for the GPU.
    ///
    /// # Panics
    /// When called a second time.
    pub fn init(&mut self) -> BackendResult<()> {
        assert!(!self.initialized, "DeferredRenderer: init called twice");
        self.initialized = true;

        let resources =
            PipelineResources::create(&mut self.backend, &self.config, &*self.context.shaders)?;
        self.resources = Some(resources);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.init(&mut self.backend)?;
        }
        self.backend.wait_idle()?;

        log::info!(
            "Deferred renderer initialized on {} ({}x{}, {}x MSAA, {} shadow cascades at {})",
            self.backend.name(),
            self.config.width,
            self.config.height,
            self.config.samples,
            self.config.shadow_cascades,
            self.config.shadow_resolution
        );
        Ok(())
    }

    /// Per-tick update: scene and camera, key edges, overlay and terrain picking.
    pub fn update(&mut self, input: &dyn InputState) -> Vec<ToggleEvent> {
        self.scene.update();
        let events = self
            .config
            .bindings
            .apply(input, &mut self.toggles, &mut self.debug);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.update();
        }
        if self.scene.has_terrain() {
            if let (Some(picking), Some(resources)) =
                (self.context.terrain_picking.as_mut(), self.resources.as_ref())
            {
                picking.update(self.scene.camera(), resources.opaque.view(Attachment::Depth));
            }
        }
        events
    }

    /// Render one frame.
    ///
    /// # Panics
    /// When called before [`init`](Self::init) or after [`shutdown`](Self::shutdown).
    pub fn render(&mut self) -> BackendResult<()> {
        let Self {
            config,
            backend,
            scene,
            context,
            overlay,
            toggles,
            debug,
            resources,
            frame_index,
            ..
        } = self;
        let Some(resources) = resources.as_mut() else {
            panic!("DeferredRenderer: render called before init");
        };
        let backend: &mut dyn GraphicsBackend = backend;
        let mut trace = FrameTrace::new();

        let surface = backend.begin_frame()?;
        context.lights.update(scene.camera());
        let mut frame = FrameState::new(
            *frame_index,
            (config.width, config.height),
            CameraMotion::capture(scene.camera()),
            *toggles,
            debug.effective(toggles.wireframe),
            &config.motion,
        );
        frame.sun_screen_position = context.lights.sun_screen_position();
        frame.sun_visibility = context.lights.sun_visibility();
        log::trace!(
            "frame {}: debug view {:?}, motion blur eligible {}",
            frame.index,
            frame.debug_view,
            frame.motion_blur_eligible
        );

        resources.opaque.clear(backend);
        resources.transparency.clear(backend);
        resources.shadows.clear(backend);
        record(&mut trace, FrameStage::Clear);

        // Binding the shadow target switches to the cascade viewport and the opaque bind
        // below restores screen resolution. The screen viewport is never set while the
        // shadow target is bound: it can exceed the target's extent, which wgpu rejects.
        {
            let mut bound = resources.shadows.bind(backend);
            bound.backend().set_render_config(Some(RenderConfig::ShadowDepth));
            scene.render_shadows(bound.backend(), config.shadow_cascades)?;
            bound.backend().set_render_config(None);
        }
        record(&mut trace, FrameStage::Shadow);

        {
            let mut bound = resources.opaque.bind(backend);
            scene.render(bound.backend())?;
        }
        record(&mut trace, FrameStage::Opaque);

        {
            let mut bound = resources.transparency.bind(backend);
            scene.render_transparent_objects(bound.backend())?;
        }
        record(&mut trace, FrameStage::Transparency);

        let opaque = &resources.opaque;
        let ambient_occlusion = frame.toggles.ambient_occlusion;
        if ambient_occlusion {
            resources.ambient_occlusion.render(
                backend,
                AmbientOcclusionInputs {
                    frame: &frame,
                    position: opaque.view(Attachment::Position),
                    normal: opaque.view(Attachment::Normal),
                },
            )?;
            record(&mut trace, FrameStage::AmbientOcclusion);
        }

        resources.coverage_mask.render(
            backend,
            CoverageMaskInputs {
                frame: &frame,
                position: opaque.view(Attachment::Position),
                light_scattering: opaque.view(Attachment::LightScattering),
            },
        )?;
        record(&mut trace, FrameStage::CoverageMask);

        resources.lighting.render(
            backend,
            DeferredLightingInputs {
                frame: &frame,
                coverage_mask: resources.coverage_mask.mask(),
                occlusion: ambient_occlusion.then(|| resources.ambient_occlusion.occlusion()),
                shadow_cascades: resources.shadows.view(Attachment::Depth),
                albedo: opaque.view(Attachment::Albedo),
                position: opaque.view(Attachment::Position),
                normal: opaque.view(Attachment::Normal),
                specular_emission: opaque.view(Attachment::SpecularEmission),
            },
        )?;
        record(&mut trace, FrameStage::LightingResolve { ambient_occlusion });

        let transparency = &resources.transparency;
        resources.transparency_blend.render(
            backend,
            TransparencyBlendInputs {
                frame: &frame,
                lit_scene: resources.lighting.scene(),
                opaque_depth: opaque.view(Attachment::Depth),
                light_scattering_mask: resources.coverage_mask.light_scattering(),
                albedo: transparency.view(Attachment::Albedo),
                depth: transparency.view(Attachment::Depth),
                alpha: transparency.view(Attachment::Alpha),
                light_scattering: transparency.view(Attachment::LightScattering),
            },
        )?;
        record(&mut trace, FrameStage::Composite);

        context.instancing.notify_all();
        if let Some(terrain) = scene.terrain() {
            if frame.camera.moved {
                terrain.quadtree_signal().notify_all();
            }
        }
        record(&mut trace, FrameStage::WorkerSignal);

        let display = resources.post.run(
            backend,
            resources.transparency_blend.scene(),
            &PostInputs {
                frame: &frame,
                depth: opaque.view(Attachment::Depth),
                light_scattering: resources.transparency_blend.light_scattering(),
            },
            &mut trace,
        )?;

        let screen = surface.swapchain_view;
        let viewport = Viewport::new(surface.width, surface.height);
        match frame.debug_view.source() {
            Some(DebugSource::GBuffer(kind)) => {
                resources.present.copy(backend, display, screen, &viewport)?;
                record(&mut trace, FrameStage::Present);
                resources
                    .gbuffer_overlay
                    .copy(backend, opaque.view(kind), screen, &viewport)?;
                record(&mut trace, FrameStage::DebugView(frame.debug_view));
            }
            Some(source) => {
                let image = match source {
                    DebugSource::CoverageMask => resources.coverage_mask.mask(),
                    DebugSource::Occlusion if ambient_occlusion => {
                        resources.ambient_occlusion.occlusion()
                    }
                    DebugSource::Occlusion => resources.lighting.neutral_occlusion(),
                    _ => resources.lighting.scene(),
                };
                record(&mut trace, FrameStage::DebugView(frame.debug_view));
                resources.present.copy(backend, image, screen, &viewport)?;
                record(&mut trace, FrameStage::Present);
            }
            None => {
                resources.present.copy(backend, display, screen, &viewport)?;
                record(&mut trace, FrameStage::Present);
            }
        }

        // Wireframe alone does not suppress the flare, only an explicit selection does
        if frame.toggles.lens_flare && debug.active() == DebugView::None {
            {
                let mut bound = opaque.bind(backend);
                context.lights.do_occlusion_queries(bound.backend())?;
            }
            record(&mut trace, FrameStage::OcclusionQueries);

            resources.lens_flare.render(
                backend,
                LensFlareInputs {
                    frame: &frame,
                    target: screen,
                },
            )?;
            record(&mut trace, FrameStage::LensFlare);
        }

        if let Some(overlay) = overlay.as_mut() {
            overlay.render(backend, screen)?;
            record(&mut trace, FrameStage::Overlay);
        }

        backend.end_frame()?;
        backend.wait_idle()?;
        record(&mut trace, FrameStage::Synchronize);

        *frame_index += 1;
        self.frame_state = Some(frame);
        self.trace = trace;
        Ok(())
    }

    /// Release every target and pass and wake the worker groups one last time.
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        let Some(resources) = self.resources.take() else {
            log::warn!("DeferredRenderer: shutdown without live resources");
            return;
        };
        resources.destroy(&mut self.backend);

        self.context.instancing.notify_all();
        self.context.instancing.close();
        if let Some(terrain) = self.scene.terrain() {
            terrain.quadtree_signal().notify_all();
        }
        log::info!(
            "Deferred renderer shut down after {} frames",
            self.frame_index
        );
    }

    /// Attach the overlay UI. Initialized right away when the renderer already is.
    pub fn set_overlay(&mut self, mut overlay: Box<dyn Overlay>) -> BackendResult<()> {
        if self.resources.is_some() {
            overlay.init(&mut self.backend)?;
        }
        self.overlay = Some(overlay);
        Ok(())
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn toggles(&self) -> &FeatureToggles {
        &self.toggles
    }

    pub fn toggles_mut(&mut self) -> &mut FeatureToggles {
        &mut self.toggles
    }

    /// Explicitly selected debug view. Wireframe mode may still force one for the frame,
    /// see [`FrameState::debug_view`].
    pub fn debug_view(&self) -> DebugView {
        self.debug.active()
    }

    /// Select a debug view, or turn it off when it is already selected.
    pub fn select_debug_view(&mut self, view: DebugView) -> DebugView {
        self.debug.select(view)
    }

    /// Stages the last rendered frame executed, in order.
    pub fn last_frame_trace(&self) -> &[FrameStage] {
        &self.trace
    }

    /// Snapshot of the last rendered frame.
    pub fn frame_state(&self) -> Option<&FrameState> {
        self.frame_state.as_ref()
    }

    /// Multisampled depth of the opaque scene, `None` outside `init`..`shutdown`.
    pub fn scene_depth_map(&self) -> Option<TextureViewHandle> {
        self.resources
            .as_ref()
            .map(|resources| resources.opaque.view(Attachment::Depth))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}
