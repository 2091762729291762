//! Camera system

use glam::{EulerRot, Mat3, Mat4, Vec3};

use crate::backend::CameraUniform;

const DEFAULT_FORWARD: Vec3 = Vec3::new(0.0, 0.0, 1.0);
const DEFAULT_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);
const DEFAULT_RIGHT: Vec3 = Vec3::new(-1.0, 0.0, 0.0);

/// Perspective settings and initial placement of the main camera
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub look_at: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 70.0,
            near: 0.01,
            far: 1000.0,
            position: Vec3::new(0.0, 0.0, 5.0),
            look_at: Vec3::ZERO,
        }
    }
}

/// Camera with an Euler rotation.
///
/// `rotation` holds (pitch, yaw, roll) in radians, applied roll first, then pitch about X,
/// then yaw about Y. The view matrix and the four cached direction vectors are rebuilt
/// together on every mutation.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    rotation: Vec3,
    view: Mat4,
    projection: Mat4,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    forward: Vec3,
    backward: Vec3,
    left: Vec3,
    right: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default(), 16.0 / 9.0)
    }
}

impl Camera {
    pub fn new(position: Vec3, rotation: Vec3) -> Self {
        let mut camera = Self {
            position,
            rotation,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            fov_y: 70f32.to_radians(),
            aspect: 1.0,
            near: 0.01,
            far: 1000.0,
            forward: DEFAULT_FORWARD,
            backward: -DEFAULT_FORWARD,
            left: -DEFAULT_RIGHT,
            right: DEFAULT_RIGHT,
        };
        camera.update_projection();
        camera.update_view_matrix();
        camera
    }

    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        let mut camera = Self::new(config.position, Vec3::ZERO);
        camera.set_projection(config.fov_y_degrees, aspect, config.near, config.far);
        camera.set_look_at_pos(config.look_at);
        camera
    }

    pub fn set_projection(&mut self, fov_y_degrees: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y_degrees.to_radians();
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.update_projection();
    }

    /// Update aspect ratio for the perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
            self.update_projection();
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// (pitch, yaw, roll) in radians
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_view_matrix();
    }

    pub fn adjust_position(&mut self, delta: Vec3) {
        self.position += delta;
        self.update_view_matrix();
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.update_view_matrix();
    }

    pub fn adjust_rotation(&mut self, delta: Vec3) {
        self.rotation += delta;
        self.update_view_matrix();
    }

    /// Point the camera at `target`, clearing roll. Ignored when `target` is the camera position.
    pub fn set_look_at_pos(&mut self, target: Vec3) {
        if target == self.position {
            return;
        }
        let d = self.position - target;
        let horizontal = (d.x * d.x + d.z * d.z).sqrt();
        let pitch = d.y.atan2(horizontal);
        let yaw = -d.x.atan2(-d.z);
        self.set_rotation(Vec3::new(pitch, yaw, 0.0));
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    pub fn backward(&self) -> Vec3 {
        self.backward
    }

    pub fn left(&self) -> Vec3 {
        self.left
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Build camera uniform data for shaders
    pub fn uniform_data(&self) -> CameraUniform {
        let view_proj = self.view_projection_matrix();
        CameraUniform {
            view: self.view,
            proj: self.projection,
            view_proj,
            inv_view_proj: view_proj.inverse(),
            position: self.position.extend(1.0),
        }
    }

    fn orientation(&self) -> Mat3 {
        Mat3::from_euler(EulerRot::YXZ, self.rotation.y, self.rotation.x, self.rotation.z)
    }

    fn update_projection(&mut self) {
        self.projection = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
    }

    fn update_view_matrix(&mut self) {
        let orientation = self.orientation();
        let forward = (orientation * DEFAULT_FORWARD).normalize();
        let up = (orientation * DEFAULT_UP).normalize();
        let right = (orientation * DEFAULT_RIGHT).normalize();

        self.view = Mat4::look_at_rh(self.position, self.position + forward, up);
        self.forward = forward;
        self.backward = -forward;
        self.right = right;
        self.left = -right;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!(a.abs_diff_eq(b, 1e-5), "{a:?} != {b:?}");
    }

    #[test]
    fn test_default_camera_looks_at_origin() {
        let camera = Camera::default();
        assert_vec_eq(camera.position(), Vec3::new(0.0, 0.0, 5.0));
        assert_vec_eq(camera.forward(), Vec3::new(0.0, 0.0, -1.0));
        assert_vec_eq(camera.right(), Vec3::X);

        let origin_in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert_vec_eq(origin_in_view, Vec3::new(0.0, 0.0, -5.0));
    }

    #[rstest]
    #[case(Vec3::new(3.0, 0.0, 0.0))]
    #[case(Vec3::new(0.0, 4.0, 1.0))]
    #[case(Vec3::new(-2.0, -1.0, -7.0))]
    fn test_look_at_points_forward_at_target(#[case] target: Vec3) {
        let mut camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO);
        camera.set_look_at_pos(target);
        let expected = (target - camera.position()).normalize();
        assert_vec_eq(camera.forward(), expected);
    }

    #[test]
    fn test_look_at_own_position_is_ignored() {
        let mut camera = Camera::new(Vec3::ONE, Vec3::new(0.2, 0.3, 0.0));
        camera.set_look_at_pos(Vec3::ONE);
        assert_vec_eq(camera.rotation(), Vec3::new(0.2, 0.3, 0.0));
    }

    #[rstest]
    #[case(Vec3::new(0.4, 1.1, 0.0))]
    #[case(Vec3::new(-1.2, 2.5, 0.7))]
    fn test_direction_vectors_stay_orthonormal(#[case] rotation: Vec3) {
        let mut camera = Camera::default();
        camera.set_rotation(rotation);

        for v in [camera.forward(), camera.backward(), camera.left(), camera.right()] {
            assert_relative_eq!(v.length(), 1.0, epsilon = 1e-5);
        }
        assert_relative_eq!(camera.forward().dot(camera.right()), 0.0, epsilon = 1e-5);
        assert_vec_eq(camera.backward(), -camera.forward());
        assert_vec_eq(camera.left(), -camera.right());
    }

    #[test]
    fn test_adjust_position_moves_view() {
        let mut camera = Camera::default();
        camera.adjust_position(camera.forward());
        let origin_in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin_in_view.z, -4.0, epsilon = 1e-5);
    }
}
