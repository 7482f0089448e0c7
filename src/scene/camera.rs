//! Perspective camera with previous-frame tracking

use glam::{Mat4, Vec3};

use crate::scene::CameraView;

/// Vertical field of view of a fresh camera, in radians
const DEFAULT_FOV_Y: f32 = std::f32::consts::FRAC_PI_4;

/// A look-at camera that remembers where it was at the start of the frame.
///
/// Call [`Camera::begin_frame`] once per frame before moving it; the renderer derives
/// camera motion from the difference between the two states.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    previous_position: Vec3,
    previous_forward: Vec3,
    previous_view_projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO)
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        let mut camera = Self {
            position,
            target,
            up: Vec3::Y,
            fov_y: DEFAULT_FOV_Y,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10_000.0,
            previous_position: position,
            previous_forward: Vec3::NEG_Z,
            previous_view_projection: Mat4::IDENTITY,
        };
        camera.begin_frame();
        camera
    }

    /// Snapshot the current state as the previous-frame state.
    pub fn begin_frame(&mut self) {
        self.previous_position = self.position;
        self.previous_forward = CameraView::forward(self);
        self.previous_view_projection = self.view_projection_matrix();
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Move camera and target together
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
        self.target += offset;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far) * self.view_matrix()
    }

    /// Match the projection to a resized surface.
    pub fn resize(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }
}

impl CameraView for Camera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn previous_position(&self) -> Vec3 {
        self.previous_position
    }

    fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    fn previous_forward(&self) -> Vec3 {
        self.previous_forward
    }

    fn view_projection(&self) -> Mat4 {
        self.view_projection_matrix()
    }

    fn previous_view_projection(&self) -> Mat4 {
        self.previous_view_projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_starts_still() {
        let camera = Camera::default();
        assert!(!camera.has_moved());
        assert_eq!(camera.previous_forward(), CameraView::forward(&camera));
    }

    #[test]
    fn test_camera_reports_motion_until_next_frame() {
        let mut camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z);
        camera.translate(Vec3::X);
        assert!(camera.has_moved());
        assert_eq!(camera.previous_position(), Vec3::ZERO);

        camera.begin_frame();
        assert!(!camera.has_moved());
    }

    #[test]
    fn test_resize_keeps_aspect_of_empty_surface() {
        let mut camera = Camera::default();
        camera.resize(1920, 1080);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
        camera.resize(800, 0);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_changes_forward_only() {
        let mut camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z);
        camera.look_at(Vec3::X);
        assert!(camera.has_moved());
        assert_eq!(camera.position(), camera.previous_position());
        assert!((CameraView::forward(&camera) - camera.previous_forward()).length() > 1.0);
    }
}
