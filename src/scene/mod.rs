//! Collaborators the frame pipeline drives but does not own the internals of

mod camera;

pub use camera::*;

use glam::{Mat4, Vec2, Vec3};

use crate::backend::{BackendResult, GraphicsBackend, TextureViewHandle};
use crate::workers::WorkerSignal;

/// Camera state as the pipeline sees it: this frame and the previous one.
pub trait CameraView {
    fn position(&self) -> Vec3;
    fn previous_position(&self) -> Vec3;
    fn forward(&self) -> Vec3;
    fn previous_forward(&self) -> Vec3;
    fn view_projection(&self) -> Mat4;
    fn previous_view_projection(&self) -> Mat4;

    fn has_moved(&self) -> bool {
        self.position() != self.previous_position() || self.forward() != self.previous_forward()
    }
}

/// Terrain owned by a scene graph
pub trait Terrain {
    /// Wakes the workers that rebuild the terrain quadtree.
    fn quadtree_signal(&self) -> &WorkerSignal;
}

/// The scene graph: traversal and drawing of everything in the world.
///
/// Draw calls record into whatever target the renderer bound before calling.
pub trait SceneGraph {
    /// Advance scene and camera state for the coming frame.
    fn update(&mut self);

    /// Draw shadow casters into each cascade layer, selecting a layer with
    /// [`GraphicsBackend::set_attachment_layer`].
    fn render_shadows(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        cascades: u32,
    ) -> BackendResult<()>;

    /// Draw opaque geometry into the G-buffer.
    fn render(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()>;

    /// Draw transparent geometry into the transparency target.
    fn render_transparent_objects(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()>;

    fn camera(&self) -> &dyn CameraView;

    fn terrain(&self) -> Option<&dyn Terrain> {
        None
    }

    fn has_terrain(&self) -> bool {
        self.terrain().is_some()
    }
}

/// Directional light, sun occlusion and flare visibility.
pub trait LightingService {
    /// Recompute light matrices (shadow cascade splits) for the coming frame.
    fn update(&mut self, camera: &dyn CameraView);

    /// Issue occlusion queries for light sources against the bound opaque target.
    fn do_occlusion_queries(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()>;

    /// Sun position in normalized screen coordinates, `None` when off screen.
    fn sun_screen_position(&self) -> Option<Vec2> {
        None
    }

    /// Fraction of the sun visible according to the last resolved occlusion queries.
    ///
    /// Queries resolve when their frame is submitted, so the renderer reads this before
    /// issuing the current frame's queries: the lens flare lags visibility by one frame.
    fn sun_visibility(&self) -> f32 {
        1.0
    }
}

/// Optional overlay UI drawn on top of the presented frame.
pub trait Overlay {
    fn init(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()>;

    fn update(&mut self);

    fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        target: TextureViewHandle,
    ) -> BackendResult<()>;
}

/// World-space picking on the terrain through the scene depth map.
pub trait TerrainPicking {
    fn update(&mut self, camera: &dyn CameraView, scene_depth: TextureViewHandle);
}
