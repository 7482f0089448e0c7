//! Renderer configuration consumed at initialization

use crate::frame::MotionThresholds;
use crate::input::KeyBindings;

/// Edge length of each square shadow cascade layer
pub const DEFAULT_SHADOW_RESOLUTION: u32 = 4096;

/// Number of parallel-split shadow cascades
pub const DEFAULT_SHADOW_CASCADES: u32 = 4;

/// Upper bound on cascades, the size of the cascade array uniform in the lighting pass
pub const MAX_SHADOW_CASCADES: u32 = 8;

/// Runtime-switchable pipeline features.
///
/// `post_processing` is the master switch gating depth of field, bloom, underwater,
/// motion blur and light scattering. FXAA is independent of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureToggles {
    pub ambient_occlusion: bool,
    pub fxaa: bool,
    pub depth_of_field: bool,
    pub bloom: bool,
    pub underwater: bool,
    pub motion_blur: bool,
    pub light_scattering: bool,
    pub lens_flare: bool,
    pub wireframe: bool,
    pub post_processing: bool,
}

impl FeatureToggles {
    /// Every feature off, the minimal pipeline.
    pub fn none() -> Self {
        Self {
            ambient_occlusion: false,
            fxaa: false,
            depth_of_field: false,
            bloom: false,
            underwater: false,
            motion_blur: false,
            light_scattering: false,
            lens_flare: false,
            wireframe: false,
            post_processing: false,
        }
    }
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            ambient_occlusion: true,
            fxaa: false,
            depth_of_field: true,
            bloom: true,
            underwater: false,
            motion_blur: true,
            light_scattering: true,
            lens_flare: true,
            wireframe: false,
            post_processing: true,
        }
    }
}

/// Configuration for initializing the deferred renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Screen width in pixels, the resolution of every screen-sized target
    pub width: u32,
    /// Screen height in pixels
    pub height: u32,
    /// Multisample count of the opaque G-buffer
    pub samples: u32,
    /// Edge length of a shadow cascade
    pub shadow_resolution: u32,
    /// Number of shadow cascades
    pub shadow_cascades: u32,
    /// Initial feature toggles
    pub toggles: FeatureToggles,
    /// Camera motion above which motion blur replaces FXAA
    pub motion: MotionThresholds,
    /// Debug and toggle key table
    pub bindings: KeyBindings,
}

impl RendererConfig {
    pub fn new(width: u32, height: u32, samples: u32) -> Self {
        Self {
            width,
            height,
            samples,
            ..Default::default()
        }
    }

    /// Panics on configuration defects. A broken deferred pipeline produces no
    /// meaningful image, so there is nothing to recover to.
    pub fn validate(&self) {
        assert!(
            self.width > 0 && self.height > 0,
            "renderer resolution must be non-zero, got {}x{}",
            self.width,
            self.height
        );
        assert!(
            matches!(self.samples, 1 | 2 | 4 | 8),
            "multisample count must be 1, 2, 4 or 8, got {}",
            self.samples
        );
        assert!(self.shadow_resolution > 0, "shadow resolution must be non-zero");
        assert!(
            (1..=MAX_SHADOW_CASCADES).contains(&self.shadow_cascades),
            "shadow cascade count must be within 1..={MAX_SHADOW_CASCADES}, got {}",
            self.shadow_cascades
        );
        assert!(
            self.motion.position >= 0.0 && self.motion.forward >= 0.0,
            "motion blur thresholds must be non-negative"
        );
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            samples: 4,
            shadow_resolution: DEFAULT_SHADOW_RESOLUTION,
            shadow_cascades: DEFAULT_SHADOW_CASCADES,
            toggles: FeatureToggles::default(),
            motion: MotionThresholds::default(),
            bindings: KeyBindings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        RendererConfig::default().validate();
    }

    #[test]
    #[should_panic(expected = "resolution must be non-zero")]
    fn test_zero_resolution_is_fatal() {
        RendererConfig::new(0, 720, 4).validate();
    }

    #[test]
    #[should_panic(expected = "multisample count")]
    fn test_odd_sample_count_is_fatal() {
        RendererConfig::new(1280, 720, 3).validate();
    }

    #[test]
    #[should_panic(expected = "cascade count")]
    fn test_too_many_cascades_is_fatal() {
        let config = RendererConfig {
            shadow_cascades: MAX_SHADOW_CASCADES + 1,
            ..Default::default()
        };
        config.validate();
    }
}
