//! Keyboard and mouse state fed from winit events
//!
//! The keyboard tracks which keys are held and which were released since the last
//! [`Keyboard::end_frame`]. The mouse keeps a queue of events drained by the consumer.

use std::collections::{HashSet, VecDeque};

use winit::event::{DeviceEvent, ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Keys the renderer reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
    Q,
    E,
    Space,
    Shift,
    Control,
    Escape,
    Digit(u8),
}

impl Key {
    fn from_code(code: KeyCode) -> Option<Self> {
        let key = match code {
            KeyCode::KeyW => Key::W,
            KeyCode::KeyA => Key::A,
            KeyCode::KeyS => Key::S,
            KeyCode::KeyD => Key::D,
            KeyCode::KeyQ => Key::Q,
            KeyCode::KeyE => Key::E,
            KeyCode::Space => Key::Space,
            KeyCode::ShiftLeft | KeyCode::ShiftRight => Key::Shift,
            KeyCode::ControlLeft | KeyCode::ControlRight => Key::Control,
            KeyCode::Escape => Key::Escape,
            KeyCode::Digit0 => Key::Digit(0),
            KeyCode::Digit1 => Key::Digit(1),
            KeyCode::Digit2 => Key::Digit(2),
            KeyCode::Digit3 => Key::Digit(3),
            KeyCode::Digit4 => Key::Digit(4),
            KeyCode::Digit5 => Key::Digit(5),
            KeyCode::Digit6 => Key::Digit(6),
            KeyCode::Digit7 => Key::Digit(7),
            KeyCode::Digit8 => Key::Digit(8),
            KeyCode::Digit9 => Key::Digit(9),
            _ => return None,
        };
        Some(key)
    }
}

#[derive(Debug, Default)]
pub struct Keyboard {
    down: HashSet<Key>,
    released: HashSet<Key>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: Key) {
        self.down.insert(key);
    }

    pub fn release(&mut self, key: Key) {
        self.down.remove(&key);
        self.released.insert(key);
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.down.contains(&key)
    }

    /// True if `key` went up since the last `end_frame`.
    pub fn was_released(&self, key: Key) -> bool {
        self.released.contains(&key)
    }

    pub fn end_frame(&mut self) {
        self.released.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseEvent {
    LeftPress,
    LeftRelease,
    RightPress,
    RightRelease,
    MiddlePress,
    MiddleRelease,
    WheelUp,
    WheelDown,
    Move { x: f32, y: f32 },
    RawMove { dx: f32, dy: f32 },
}

#[derive(Debug, Default)]
pub struct Mouse {
    events: VecDeque<MouseEvent>,
    left_down: bool,
    right_down: bool,
    middle_down: bool,
    position: (f32, f32),
}

impl Mouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: MouseEvent) {
        match event {
            MouseEvent::LeftPress => self.left_down = true,
            MouseEvent::LeftRelease => self.left_down = false,
            MouseEvent::RightPress => self.right_down = true,
            MouseEvent::RightRelease => self.right_down = false,
            MouseEvent::MiddlePress => self.middle_down = true,
            MouseEvent::MiddleRelease => self.middle_down = false,
            MouseEvent::Move { x, y } => self.position = (x, y),
            MouseEvent::WheelUp | MouseEvent::WheelDown | MouseEvent::RawMove { .. } => {}
        }
        self.events.push_back(event);
    }

    pub fn read_event(&mut self) -> Option<MouseEvent> {
        self.events.pop_front()
    }

    pub fn is_left_down(&self) -> bool {
        self.left_down
    }

    pub fn is_right_down(&self) -> bool {
        self.right_down
    }

    pub fn is_middle_down(&self) -> bool {
        self.middle_down
    }

    pub fn position(&self) -> (f32, f32) {
        self.position
    }
}

/// Keyboard and mouse together, fed from the window loop.
#[derive(Debug, Default)]
pub struct InputState {
    pub keyboard: Keyboard,
    pub mouse: Mouse,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a window event. Returns true if it was an input event.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return false;
                };
                let Some(key) = Key::from_code(code) else {
                    return false;
                };
                match event.state {
                    ElementState::Pressed => self.keyboard.press(key),
                    ElementState::Released => self.keyboard.release(key),
                }
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let pressed = *state == ElementState::Pressed;
                let event = match (button, pressed) {
                    (MouseButton::Left, true) => MouseEvent::LeftPress,
                    (MouseButton::Left, false) => MouseEvent::LeftRelease,
                    (MouseButton::Right, true) => MouseEvent::RightPress,
                    (MouseButton::Right, false) => MouseEvent::RightRelease,
                    (MouseButton::Middle, true) => MouseEvent::MiddlePress,
                    (MouseButton::Middle, false) => MouseEvent::MiddleRelease,
                    _ => return false,
                };
                self.mouse.push(event);
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                if y > 0.0 {
                    self.mouse.push(MouseEvent::WheelUp);
                } else if y < 0.0 {
                    self.mouse.push(MouseEvent::WheelDown);
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse.push(MouseEvent::Move {
                    x: position.x as f32,
                    y: position.y as f32,
                });
                true
            }
            _ => false,
        }
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.mouse.push(MouseEvent::RawMove {
                dx: delta.0 as f32,
                dy: delta.1 as f32,
            });
        }
    }

    /// Forget per-frame keyboard state. Mouse events are drained by their consumer.
    pub fn end_frame(&mut self) {
        self.keyboard.end_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_is_visible_until_end_of_frame() {
        let mut keyboard = Keyboard::new();
        keyboard.press(Key::Digit(1));
        assert!(keyboard.is_down(Key::Digit(1)));
        assert!(!keyboard.was_released(Key::Digit(1)));

        keyboard.release(Key::Digit(1));
        assert!(!keyboard.is_down(Key::Digit(1)));
        assert!(keyboard.was_released(Key::Digit(1)));

        keyboard.end_frame();
        assert!(!keyboard.was_released(Key::Digit(1)));
    }

    #[test]
    fn test_mouse_queue_is_fifo_and_tracks_buttons() {
        let mut mouse = Mouse::new();
        mouse.push(MouseEvent::RightPress);
        mouse.push(MouseEvent::RawMove { dx: 2.0, dy: -1.0 });
        mouse.push(MouseEvent::Move { x: 10.0, y: 20.0 });

        assert!(mouse.is_right_down());
        assert_eq!(mouse.position(), (10.0, 20.0));
        assert_eq!(mouse.read_event(), Some(MouseEvent::RightPress));
        assert_eq!(mouse.read_event(), Some(MouseEvent::RawMove { dx: 2.0, dy: -1.0 }));
        assert_eq!(mouse.read_event(), Some(MouseEvent::Move { x: 10.0, y: 20.0 }));
        assert_eq!(mouse.read_event(), None);

        mouse.push(MouseEvent::RightRelease);
        assert!(!mouse.is_right_down());
    }

    #[test]
    fn test_raw_motion_from_device_event() {
        let mut input = InputState::new();
        input.handle_device_event(&DeviceEvent::MouseMotion { delta: (3.0, 4.0) });
        assert_eq!(
            input.mouse.read_event(),
            Some(MouseEvent::RawMove { dx: 3.0, dy: 4.0 })
        );
    }
}
