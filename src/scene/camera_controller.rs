//! Camera controller system
//!
//! Translates per-frame input into camera motion. [`FreeFlyController`] is the only mode:
//! WASD movement, mouse look while the right button is held.

use glam::{Vec2, Vec3};

use super::Camera;
use crate::input::{Key, Keyboard, Mouse, MouseEvent};

/// Input state for camera controllers
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD, Space/E up, Ctrl/Q down)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Sprint modifier (shift)
    pub sprint: bool,

    /// Accumulated raw mouse motion since the last frame
    pub mouse_delta: Vec2,

    /// Whether mouse look is active (right mouse button held)
    pub mouse_look_active: bool,
}

impl CameraInput {
    /// Snapshot the keyboard and drain the mouse event queue.
    pub fn gather(keyboard: &Keyboard, mouse: &mut Mouse) -> Self {
        let mut input = Self {
            forward: keyboard.is_down(Key::W),
            backward: keyboard.is_down(Key::S),
            left: keyboard.is_down(Key::A),
            right: keyboard.is_down(Key::D),
            up: keyboard.is_down(Key::Space) || keyboard.is_down(Key::E),
            down: keyboard.is_down(Key::Control) || keyboard.is_down(Key::Q),
            sprint: keyboard.is_down(Key::Shift),
            ..Default::default()
        };

        while let Some(event) = mouse.read_event() {
            if let MouseEvent::RawMove { dx, dy } = event {
                input.mouse_delta += Vec2::new(dx, dy);
            }
        }
        input.mouse_look_active = mouse.is_right_down();
        input
    }
}

/// Abstract camera controller trait
pub trait CameraController {
    /// Update the camera based on input and delta time
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32);

    fn name(&self) -> &'static str;
}

/// Free-fly camera controller (FPS-style)
///
/// - WASD: Move forward/backward/left/right
/// - Space/E and Ctrl/Q: Move up/down
/// - Right mouse + drag: Look around
/// - Shift: Sprint
#[derive(Debug, Clone)]
pub struct FreeFlyController {
    /// Base movement speed in units per second
    pub move_speed: f32,
    /// Mouse sensitivity (radians per pixel of raw motion)
    pub mouse_sensitivity: f32,
    /// Speed multiplier when sprinting
    pub sprint_multiplier: f32,
}

impl Default for FreeFlyController {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            mouse_sensitivity: 0.003,
            sprint_multiplier: 2.0,
        }
    }
}

impl FreeFlyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.move_speed = speed;
        self
    }
}

impl CameraController for FreeFlyController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.mouse_look_active && input.mouse_delta != Vec2::ZERO {
            let mut rotation = camera.rotation();
            rotation.y -= input.mouse_delta.x * self.mouse_sensitivity;
            rotation.x += input.mouse_delta.y * self.mouse_sensitivity;

            // Clamp pitch short of straight up/down
            let max_pitch = std::f32::consts::FRAC_PI_2 - 0.01;
            rotation.x = rotation.x.clamp(-max_pitch, max_pitch);
            rotation.y %= std::f32::consts::TAU;

            camera.set_rotation(rotation);
        }

        let mut velocity = Vec3::ZERO;

        if input.forward {
            velocity += camera.forward();
        }
        if input.backward {
            velocity += camera.backward();
        }
        if input.right {
            velocity += camera.right();
        }
        if input.left {
            velocity += camera.left();
        }
        if input.up {
            velocity += Vec3::Y;
        }
        if input.down {
            velocity -= Vec3::Y;
        }

        if velocity.length_squared() == 0.0 {
            return;
        }

        let speed = if input.sprint {
            self.move_speed * self.sprint_multiplier
        } else {
            self.move_speed
        };

        camera.adjust_position(velocity.normalize() * speed * dt);
    }

    fn name(&self) -> &'static str {
        "FreeFly"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_key_moves_along_view() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };

        controller.update(&mut camera, &input, 0.5);
        assert_relative_eq!(camera.position().z, 2.5, epsilon = 1e-5);
    }

    #[test]
    fn test_sprint_doubles_distance() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            up: true,
            sprint: true,
            ..Default::default()
        };

        controller.update(&mut camera, &input, 1.0);
        assert_relative_eq!(camera.position().y, 10.0, epsilon = 1e-5);
    }

    #[test]
    fn test_mouse_look_requires_right_button() {
        let mut camera = Camera::default();
        let before = camera.rotation();
        let mut controller = FreeFlyController::new();
        let mut input = CameraInput {
            mouse_delta: Vec2::new(100.0, 0.0),
            ..Default::default()
        };

        controller.update(&mut camera, &input, 0.016);
        assert_eq!(camera.rotation(), before);

        input.mouse_look_active = true;
        controller.update(&mut camera, &input, 0.016);
        assert_relative_eq!(camera.rotation().y, before.y - 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            mouse_delta: Vec2::new(0.0, 10_000.0),
            mouse_look_active: true,
            ..Default::default()
        };

        controller.update(&mut camera, &input, 0.016);
        assert!(camera.rotation().x < std::f32::consts::FRAC_PI_2);
        assert!(camera.forward().y < 0.0);
    }
}
