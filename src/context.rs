//! Collaborators the renderer drives each frame, passed in explicitly

use crate::pipeline::ShaderLibrary;
use crate::scene::{LightingService, TerrainPicking};
use crate::workers::WorkerSignal;

/// Services shared between the renderer and the rest of the engine.
///
/// The instancing signal is a clone of the one the instanced-object workers listen on.
pub struct RenderContext {
    pub lights: Box<dyn LightingService>,
    pub shaders: Box<dyn ShaderLibrary>,
    pub instancing: WorkerSignal,
    pub terrain_picking: Option<Box<dyn TerrainPicking>>,
}

impl RenderContext {
    pub fn new(lights: Box<dyn LightingService>, shaders: Box<dyn ShaderLibrary>) -> Self {
        Self {
            lights,
            shaders,
            instancing: WorkerSignal::new(),
            terrain_picking: None,
        }
    }

    pub fn with_instancing(mut self, signal: WorkerSignal) -> Self {
        self.instancing = signal;
        self
    }

    pub fn with_terrain_picking(mut self, picking: Box<dyn TerrainPicking>) -> Self {
        self.terrain_picking = Some(picking);
        self
    }
}
