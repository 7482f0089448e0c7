//! Frame pipeline integration tests.
//!
//! Every test drives [`DeferredRenderer`] on the dummy backend and checks the stage
//! trace and the recorded backend commands.
//!
//! # Test Categories
//!
//! - **Ordering**: fixed stage order and determinism
//! - **Gating**: toggles, motion blur eligibility and the post-processing master switch
//! - **Debug views**: exclusivity and lens flare suppression
//! - **Resources**: binding discipline, synchronization, workers and shutdown

mod common;

use rstest::rstest;
use winit::event::ElementState;
use winit::keyboard::KeyCode;

use common::{config, count, harness, initialized, MockCamera, MockOverlay, MockScene, Pushed};
use deferred_renderer::backend::{BackendCommand, RenderConfig};
use deferred_renderer::{
    DebugView, FeatureToggles, FrameStage, GraphicsBackend, KeyEdgeTracker, PostStage,
    RendererConfig, ToggleEvent, WorkerSignal,
};

fn with_toggles(toggles: FeatureToggles) -> RendererConfig {
    RendererConfig {
        toggles,
        ..config()
    }
}

fn render_once(config: RendererConfig, camera: MockCamera) -> Vec<FrameStage> {
    let mut h = harness(config, MockScene::new(camera));
    h.renderer.init().unwrap();
    h.renderer.render().unwrap();
    h.renderer.last_frame_trace().to_vec()
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_default_frame_stage_order() {
    let trace = render_once(config(), MockCamera::still());

    assert_eq!(
        trace,
        vec![
            FrameStage::Clear,
            FrameStage::Shadow,
            FrameStage::Opaque,
            FrameStage::Transparency,
            FrameStage::AmbientOcclusion,
            FrameStage::CoverageMask,
            FrameStage::LightingResolve {
                ambient_occlusion: true
            },
            FrameStage::Composite,
            FrameStage::WorkerSignal,
            FrameStage::Post(PostStage::DepthOfField),
            FrameStage::Post(PostStage::Bloom),
            FrameStage::Post(PostStage::LightScattering),
            FrameStage::Present,
            FrameStage::OcclusionQueries,
            FrameStage::LensFlare,
            FrameStage::Synchronize,
        ]
    );
}

#[test]
fn test_minimal_pipeline_runs_mandatory_stages_only() {
    let trace = render_once(with_toggles(FeatureToggles::none()), MockCamera::moving(1.0, 1.0));

    assert_eq!(
        trace,
        vec![
            FrameStage::Clear,
            FrameStage::Shadow,
            FrameStage::Opaque,
            FrameStage::Transparency,
            FrameStage::CoverageMask,
            FrameStage::LightingResolve {
                ambient_occlusion: false
            },
            FrameStage::Composite,
            FrameStage::WorkerSignal,
            FrameStage::Present,
            FrameStage::Synchronize,
        ]
    );
}

#[test]
fn test_fxaa_frame_without_occlusion_on_a_still_camera() {
    let toggles = FeatureToggles {
        ambient_occlusion: false,
        fxaa: true,
        post_processing: true,
        motion_blur: true,
        ..FeatureToggles::none()
    };
    let trace = render_once(with_toggles(toggles), MockCamera::still());

    assert_eq!(
        trace,
        vec![
            FrameStage::Clear,
            FrameStage::Shadow,
            FrameStage::Opaque,
            FrameStage::Transparency,
            FrameStage::CoverageMask,
            FrameStage::LightingResolve {
                ambient_occlusion: false
            },
            FrameStage::Composite,
            FrameStage::WorkerSignal,
            FrameStage::Post(PostStage::Fxaa),
            FrameStage::Present,
            FrameStage::Synchronize,
        ]
    );
}

#[test]
fn test_identical_inputs_give_identical_frames() {
    let run = || {
        let mut h = harness(config(), MockScene::new(MockCamera::moving(0.1, 0.0)));
        h.renderer.init().unwrap();
        let mut traces = Vec::new();
        for _ in 0..3 {
            h.renderer.render().unwrap();
            traces.push(h.renderer.last_frame_trace().to_vec());
        }
        (traces, h.renderer.backend().commands().to_vec())
    };

    assert_eq!(run(), run());
}

#[test]
fn test_frame_state_tracks_frame_index() {
    let mut h = initialized(config());
    assert!(h.renderer.frame_state().is_none());

    h.renderer.render().unwrap();
    h.renderer.render().unwrap();

    let state = h.renderer.frame_state().unwrap();
    assert_eq!(state.index, 1);
    assert_eq!((state.width, state.height), (common::WIDTH, common::HEIGHT));
}

// ============================================================================
// Gating
// ============================================================================

#[rstest]
#[case::below_position_threshold(0.04, 0.0, false)]
#[case::above_position_threshold(0.05, 0.0, true)]
#[case::below_forward_threshold(0.0, 0.01, false)]
#[case::above_forward_threshold(0.0, 0.02, true)]
fn test_motion_blur_replaces_fxaa(
    #[case] position_delta: f32,
    #[case] forward_delta: f32,
    #[case] eligible: bool,
) {
    let toggles = FeatureToggles {
        fxaa: true,
        ..FeatureToggles::default()
    };
    let trace = render_once(
        with_toggles(toggles),
        MockCamera::moving(position_delta, forward_delta),
    );

    assert_eq!(trace.contains(&FrameStage::Post(PostStage::MotionBlur)), eligible);
    assert_eq!(trace.contains(&FrameStage::Post(PostStage::Fxaa)), !eligible);
}

#[test]
fn test_motion_blur_needs_its_toggle() {
    let toggles = FeatureToggles {
        motion_blur: false,
        ..FeatureToggles::default()
    };
    let trace = render_once(with_toggles(toggles), MockCamera::moving(1.0, 0.0));

    assert!(!trace.contains(&FrameStage::Post(PostStage::MotionBlur)));
}

#[test]
fn test_master_switch_disables_everything_but_fxaa() {
    let toggles = FeatureToggles {
        fxaa: true,
        underwater: true,
        post_processing: false,
        ..FeatureToggles::default()
    };
    let trace = render_once(with_toggles(toggles), MockCamera::still());

    let post: Vec<_> = trace
        .iter()
        .filter(|stage| matches!(stage, FrameStage::Post(_)))
        .collect();
    assert_eq!(post, vec![&FrameStage::Post(PostStage::Fxaa)]);
}

#[test]
fn test_post_stages_run_in_chain_order() {
    let toggles = FeatureToggles {
        underwater: true,
        ..FeatureToggles::default()
    };
    let trace = render_once(with_toggles(toggles), MockCamera::moving(1.0, 0.0));

    let post: Vec<_> = trace
        .iter()
        .filter_map(|stage| match stage {
            FrameStage::Post(stage) => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        post,
        vec![
            PostStage::DepthOfField,
            PostStage::Bloom,
            PostStage::Underwater,
            PostStage::MotionBlur,
            PostStage::LightScattering,
        ]
    );
}

#[test]
fn test_disabled_occlusion_resolves_with_neutral_texture() {
    let toggles = FeatureToggles {
        ambient_occlusion: false,
        ..FeatureToggles::default()
    };
    let trace = render_once(with_toggles(toggles), MockCamera::still());

    assert!(!trace.contains(&FrameStage::AmbientOcclusion));
    assert!(trace.contains(&FrameStage::LightingResolve {
        ambient_occlusion: false
    }));
}

#[test]
fn test_lens_flare_off_skips_occlusion_queries() {
    let toggles = FeatureToggles {
        lens_flare: false,
        ..FeatureToggles::default()
    };
    let mut h = initialized(with_toggles(toggles));
    h.renderer.render().unwrap();

    let trace = h.renderer.last_frame_trace();
    assert!(!trace.contains(&FrameStage::OcclusionQueries));
    assert!(!trace.contains(&FrameStage::LensFlare));
    assert_eq!(h.probes.occlusion_queries.get(), 0);
    assert_eq!(
        count(h.renderer.backend().commands(), |c| matches!(
            c,
            BackendCommand::BeginOcclusionQuery(_)
        )),
        0
    );
}

#[test]
fn test_flare_sees_visibility_of_the_previous_frame() {
    let mut h = initialized(config());

    h.renderer.render().unwrap();
    assert_eq!(h.renderer.frame_state().unwrap().sun_visibility, 1.0);

    h.renderer.render().unwrap();
    assert_eq!(h.probes.occlusion_queries.get(), 2);
    assert_eq!(h.renderer.frame_state().unwrap().sun_visibility, 0.5);
}

#[test]
fn test_toggles_apply_from_the_next_frame() {
    let mut h = initialized(config());
    h.renderer.render().unwrap();
    assert!(h.renderer.last_frame_trace().contains(&FrameStage::AmbientOcclusion));

    h.renderer.toggles_mut().ambient_occlusion = false;
    h.renderer.render().unwrap();
    assert!(!h.renderer.last_frame_trace().contains(&FrameStage::AmbientOcclusion));
}

// ============================================================================
// Debug views
// ============================================================================

#[rstest]
#[case::albedo(DebugView::Albedo)]
#[case::normal(DebugView::Normal)]
#[case::position(DebugView::Position)]
#[case::coverage_mask(DebugView::CoverageMask)]
#[case::occlusion(DebugView::Occlusion)]
#[case::deferred_lit(DebugView::DeferredLit)]
fn test_debug_view_is_exclusive_and_suppresses_flare(#[case] view: DebugView) {
    let mut h = initialized(config());
    h.renderer.select_debug_view(view);
    h.renderer.render().unwrap();

    let trace = h.renderer.last_frame_trace();
    let debug: Vec<_> = trace
        .iter()
        .filter(|stage| matches!(stage, FrameStage::DebugView(_)))
        .collect();
    assert_eq!(debug, vec![&FrameStage::DebugView(view)]);
    assert_eq!(count_present(trace), 1);
    assert!(!trace.contains(&FrameStage::LensFlare));
    assert!(!trace.contains(&FrameStage::OcclusionQueries));
}

fn count_present(trace: &[FrameStage]) -> usize {
    trace.iter().filter(|s| **s == FrameStage::Present).count()
}

#[rstest]
#[case::albedo(DebugView::Albedo, true)]
#[case::normal(DebugView::Normal, true)]
#[case::position(DebugView::Position, true)]
#[case::coverage_mask(DebugView::CoverageMask, false)]
#[case::occlusion(DebugView::Occlusion, false)]
#[case::deferred_lit(DebugView::DeferredLit, false)]
fn test_gbuffer_views_overlay_the_presented_frame(#[case] view: DebugView, #[case] overlay: bool) {
    let mut h = initialized(config());
    h.renderer.select_debug_view(view);
    h.renderer.render().unwrap();

    let trace = h.renderer.last_frame_trace();
    let present = trace.iter().position(|s| *s == FrameStage::Present);
    let debug = trace.iter().position(|s| *s == FrameStage::DebugView(view));
    assert_eq!(present < debug, overlay);
}

#[test]
fn test_selecting_a_view_twice_turns_it_off() {
    let mut h = initialized(config());
    h.renderer.select_debug_view(DebugView::Normal);
    assert_eq!(h.renderer.select_debug_view(DebugView::Normal), DebugView::None);
    h.renderer.render().unwrap();

    let trace = h.renderer.last_frame_trace();
    assert!(!trace
        .iter()
        .any(|stage| matches!(stage, FrameStage::DebugView(_))));
    assert!(trace.contains(&FrameStage::LensFlare));
}

#[test]
fn test_wireframe_forces_albedo_but_keeps_the_flare() {
    let toggles = FeatureToggles {
        wireframe: true,
        ..FeatureToggles::default()
    };
    let trace = render_once(with_toggles(toggles), MockCamera::still());

    assert!(trace.contains(&FrameStage::DebugView(DebugView::Albedo)));
    assert!(trace.contains(&FrameStage::LensFlare));
}

#[test]
fn test_explicit_view_wins_over_wireframe() {
    let toggles = FeatureToggles {
        wireframe: true,
        ..FeatureToggles::default()
    };
    let mut h = initialized(with_toggles(toggles));
    h.renderer.select_debug_view(DebugView::CoverageMask);
    h.renderer.render().unwrap();

    assert_eq!(
        h.renderer.frame_state().unwrap().debug_view,
        DebugView::CoverageMask
    );
}

// ============================================================================
// Input
// ============================================================================

#[test]
fn test_held_key_flips_a_toggle_once() {
    let mut h = initialized(config());
    let mut keys = KeyEdgeTracker::new();

    keys.handle_key(KeyCode::Numpad8, ElementState::Pressed);
    let events = h.renderer.update(&keys);
    keys.end_frame();
    assert_eq!(events, vec![ToggleEvent::AmbientOcclusion(false)]);

    // OS key repeat while held
    for _ in 0..5 {
        keys.handle_key(KeyCode::Numpad8, ElementState::Pressed);
        assert!(h.renderer.update(&keys).is_empty());
        keys.end_frame();
    }
    assert!(!h.renderer.toggles().ambient_occlusion);
}

#[test]
fn test_debug_keys_select_views() {
    let mut h = initialized(config());

    h.renderer.update(&Pushed::keys(&[KeyCode::Numpad5]));
    assert_eq!(h.renderer.debug_view(), DebugView::Occlusion);

    h.renderer.update(&Pushed::keys(&[KeyCode::Numpad5]));
    assert_eq!(h.renderer.debug_view(), DebugView::None);
}

#[test]
fn test_update_drives_scene_overlay_and_picking() {
    let signal = WorkerSignal::new();
    let mut h = harness(
        config(),
        MockScene::new(MockCamera::still()).with_terrain(signal),
    );
    h.renderer
        .set_overlay(Box::new(MockOverlay::new(&h.probes)))
        .unwrap();

    // Nothing to pick against before init
    h.renderer.update(&Pushed::default());
    assert!(h.probes.picked_depth.borrow().is_empty());

    h.renderer.init().unwrap();
    h.renderer.update(&Pushed::default());

    assert_eq!(h.renderer.scene().updates, 2);
    assert_eq!(h.probes.overlay_updates.get(), 2);
    assert_eq!(
        h.probes.picked_depth.borrow().last().copied(),
        h.renderer.scene_depth_map()
    );
}

// ============================================================================
// Resources
// ============================================================================

#[test]
fn test_render_passes_never_overlap() {
    let mut h = initialized(config());
    h.renderer
        .set_overlay(Box::new(MockOverlay::new(&h.probes)))
        .unwrap();
    h.renderer.render().unwrap();

    let mut open = false;
    for command in h.renderer.backend().commands() {
        match command {
            BackendCommand::BeginRenderPass { .. } => {
                assert!(!open, "render pass begun while another is open");
                open = true;
            }
            BackendCommand::EndRenderPass => {
                assert!(open, "render pass ended twice");
                open = false;
            }
            _ => {}
        }
    }
    assert!(!open);
}

#[test]
fn test_shadows_draw_every_cascade_in_shadow_configuration() {
    let mut h = initialized(config());
    h.renderer.render().unwrap();

    let scene = h.renderer.scene();
    assert_eq!(scene.shadow_draws, 4);
    assert_eq!(scene.shadow_config, Some(RenderConfig::ShadowDepth));
    assert_eq!(h.renderer.backend().render_config(), None);
}

#[test]
fn test_viewport_returns_to_screen_size_after_shadows() {
    let mut h = initialized(config());
    h.renderer.backend_mut().take_commands();
    h.renderer.render().unwrap();

    let viewport_of = |label: &str| {
        let commands = h.renderer.backend().commands();
        let begin = commands
            .iter()
            .position(|c| {
                matches!(c, BackendCommand::BeginRenderPass { label: Some(l), .. } if l == label)
            })
            .unwrap();
        commands[begin..]
            .iter()
            .find_map(|c| match c {
                BackendCommand::SetViewport { width, height } => Some((*width, *height)),
                _ => None,
            })
            .unwrap()
    };

    assert_eq!(viewport_of("shadow-cascades draw"), (256.0, 256.0));
    assert_eq!(
        viewport_of("offscreen draw"),
        (common::WIDTH as f32, common::HEIGHT as f32)
    );
}

#[test]
fn test_gpu_waits_once_at_init_and_once_per_frame() {
    let mut h = initialized(config());
    let waits = |h: &common::Harness| {
        count(h.renderer.backend().commands(), |c| {
            matches!(c, BackendCommand::WaitIdle)
        })
    };
    assert_eq!(waits(&h), 1);

    for _ in 0..3 {
        h.renderer.render().unwrap();
    }
    assert_eq!(waits(&h), 4);
}

#[test]
fn test_overlay_renders_last_before_synchronize() {
    let mut h = initialized(config());
    h.renderer
        .set_overlay(Box::new(MockOverlay::new(&h.probes)))
        .unwrap();
    assert_eq!(h.probes.overlay_inits.get(), 1);

    h.renderer.render().unwrap();

    let trace = h.renderer.last_frame_trace();
    assert_eq!(
        &trace[trace.len() - 2..],
        &[FrameStage::Overlay, FrameStage::Synchronize]
    );
    assert_eq!(h.probes.overlay_renders.get(), 1);
}

#[test]
fn test_workers_are_signalled_once_per_frame_and_at_shutdown() {
    let terrain = WorkerSignal::new();
    let mut h = harness(
        config(),
        MockScene::new(MockCamera::moving(0.5, 0.0)).with_terrain(terrain.clone()),
    );
    h.renderer.init().unwrap();
    for _ in 0..3 {
        h.renderer.render().unwrap();
    }
    assert_eq!(h.instancing.broadcasts(), 3);
    assert_eq!(terrain.broadcasts(), 3);
    assert_eq!(h.probes.light_updates.get(), 3);

    h.renderer.shutdown();
    assert_eq!(h.instancing.broadcasts(), 4);
    assert_eq!(terrain.broadcasts(), 4);
    assert!(h.instancing.is_closed());
}

#[test]
fn test_still_camera_leaves_terrain_workers_idle() {
    let terrain = WorkerSignal::new();
    let mut h = harness(
        config(),
        MockScene::new(MockCamera::still()).with_terrain(terrain.clone()),
    );
    h.renderer.init().unwrap();
    h.renderer.render().unwrap();

    assert_eq!(h.instancing.broadcasts(), 1);
    assert_eq!(terrain.broadcasts(), 0);
}

#[test]
fn test_shutdown_releases_every_texture() {
    let mut h = initialized(config());
    h.renderer.render().unwrap();
    assert!(h.renderer.backend().live_texture_count() > 0);

    h.renderer.shutdown();
    assert_eq!(h.renderer.backend().live_texture_count(), 0);
    assert!(h.renderer.scene_depth_map().is_none());

    // Second shutdown is a no-op
    h.renderer.shutdown();
    assert_eq!(h.instancing.broadcasts(), 2);
}

#[test]
#[should_panic(expected = "init called twice")]
fn test_double_init_panics() {
    let mut h = initialized(config());
    let _ = h.renderer.init();
}

#[test]
#[should_panic(expected = "render called before init")]
fn test_render_before_init_panics() {
    let mut h = harness(config(), MockScene::new(MockCamera::still()));
    let _ = h.renderer.render();
}

#[rstest]
#[case::lit(DebugView::None)]
#[case::positions(DebugView::Position)]
#[case::normals(DebugView::Normal)]
fn test_single_sampled_gbuffer_is_read_without_filtering(#[case] view: DebugView) {
    // The dummy backend rejects bind groups that filter Rgba32Float positions
    let mut h = initialized(RendererConfig {
        shadow_resolution: 256,
        ..RendererConfig::new(common::WIDTH, common::HEIGHT, 1)
    });
    if view != DebugView::None {
        h.renderer.select_debug_view(view);
    }

    h.renderer.render().unwrap();
    h.renderer.render().unwrap();

    let trace = h.renderer.last_frame_trace();
    assert!(trace.contains(&FrameStage::AmbientOcclusion));
    assert_eq!(
        trace.contains(&FrameStage::DebugView(view)),
        view != DebugView::None
    );
}

#[test]
fn test_missing_shader_fails_init() {
    use deferred_renderer::{BackendError, DummyBackend, RenderContext, ShaderRegistry};

    let context = RenderContext::new(
        Box::new(common::NoLights),
        Box::new(ShaderRegistry::new()),
    );
    let mut renderer = deferred_renderer::DeferredRenderer::new(
        config(),
        DummyBackend::new(common::WIDTH, common::HEIGHT),
        MockScene::new(MockCamera::still()),
        context,
    );

    assert!(matches!(
        renderer.init(),
        Err(BackendError::ShaderCreationFailed(_))
    ));
}
