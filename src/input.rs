use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::PhysicalKey;

/// A press that moves further than this many pixels is a drag, not a click.
pub const CLICK_DRAG_TOLERANCE: f32 = 5.0;

/// Pixels of trackpad scrolling that count as one wheel notch.
const PIXELS_PER_WHEEL_STEP: f32 = 100.0;

/// Identifier for the keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Character(char),
    Digit(u8),
    Escape,
}

impl KeyCode {
    fn from_winit(code: winit::keyboard::KeyCode) -> Option<Self> {
        use winit::keyboard::KeyCode as Winit;
        let key = match code {
            Winit::KeyC => Self::Character('C'),
            Winit::KeyG => Self::Character('G'),
            Winit::KeyH => Self::Character('H'),
            Winit::Digit0 | Winit::Numpad0 => Self::Digit(0),
            Winit::Digit1 | Winit::Numpad1 => Self::Digit(1),
            Winit::Digit2 | Winit::Numpad2 => Self::Digit(2),
            Winit::Digit3 | Winit::Numpad3 => Self::Digit(3),
            Winit::Digit4 | Winit::Numpad4 => Self::Digit(4),
            Winit::Digit5 | Winit::Numpad5 => Self::Digit(5),
            Winit::Digit6 | Winit::Numpad6 => Self::Digit(6),
            Winit::Digit7 | Winit::Numpad7 => Self::Digit(7),
            Winit::Digit8 | Winit::Numpad8 => Self::Digit(8),
            Winit::Digit9 | Winit::Numpad9 => Self::Digit(9),
            Winit::Escape => Self::Escape,
            _ => return None,
        };
        Some(key)
    }
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        use winit::event::MouseButton as Winit;
        match button {
            Winit::Left => Some(Self::LEFT),
            Winit::Right => Some(Self::RIGHT),
            Winit::Middle => Some(Self::MIDDLE),
            _ => None,
        }
    }
}

/// Everything that happened to the pointer and keyboard since the last frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFrame {
    /// Cursor position in physical pixels, `None` while outside the window.
    pub cursor: Option<Vec2>,
    /// Pointer motion while the left button was held.
    pub rotate: Vec2,
    /// Pointer motion while the right or middle button was held.
    pub pan: Vec2,
    /// Wheel notches, positive when scrolling away from the user (zoom in).
    pub wheel: f32,
    /// Positions of left clicks that did not turn into drags.
    pub clicks: Vec<Vec2>,
    pub keys_pressed: Vec<KeyCode>,
}

#[derive(Debug, Default)]
struct Pending {
    rotate: Vec2,
    pan: Vec2,
    wheel: f32,
    clicks: Vec<Vec2>,
    keys_pressed: Vec<KeyCode>,
    press_origin: Option<Vec2>,
    /// Furthest the cursor got from `press_origin` during the press.
    drag_distance: f32,
}

/// Thread-safe input snapshot fed by window events and drained once per frame.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    mouse_position: RwLock<Option<Vec2>>,
    pending: RwLock<Pending>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a winit window event. Returns `true` when the event was consumed.
    pub fn handle_window_event(&self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return false;
                };
                let Some(key) = KeyCode::from_winit(code) else {
                    return false;
                };
                match event.state {
                    ElementState::Pressed if !event.repeat => self.set_key_down(key),
                    ElementState::Pressed => {}
                    ElementState::Released => self.set_key_up(key),
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.set_mouse_position(Vec2::new(position.x as f32, position.y as f32));
                true
            }
            WindowEvent::CursorLeft { .. } => {
                *self.mouse_position.write() = None;
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let Some(button) = MouseButton::from_winit(*button) else {
                    return false;
                };
                match state {
                    ElementState::Pressed => self.set_mouse_button_down(button),
                    ElementState::Released => self.set_mouse_button_up(button),
                }
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => {
                        position.y as f32 / PIXELS_PER_WHEEL_STEP
                    }
                };
                self.add_wheel(steps);
                true
            }
            _ => false,
        }
    }

    pub fn set_key_down(&self, key: KeyCode) {
        if self.keys.write().insert(key) {
            self.pending.write().keys_pressed.push(key);
        }
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
        if button == MouseButton::LEFT {
            let mut pending = self.pending.write();
            pending.press_origin = *self.mouse_position.read();
            pending.drag_distance = 0.0;
        }
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.mouse_buttons.write().remove(&button);
        if button == MouseButton::LEFT {
            let mut pending = self.pending.write();
            if let Some(origin) = pending.press_origin.take() {
                if pending.drag_distance <= CLICK_DRAG_TOLERANCE {
                    let at = self.mouse_position.read().unwrap_or(origin);
                    pending.clicks.push(at);
                }
            }
        }
    }

    pub fn set_mouse_position(&self, position: Vec2) {
        let previous = self.mouse_position.write().replace(position);
        let Some(previous) = previous else {
            return;
        };
        let delta = position - previous;
        let buttons = self.mouse_buttons.read();
        let mut pending = self.pending.write();
        if let Some(origin) = pending.press_origin {
            pending.drag_distance = pending.drag_distance.max((position - origin).length());
        }
        if buttons.contains(&MouseButton::LEFT) {
            pending.rotate += delta;
        } else if buttons.contains(&MouseButton::RIGHT) || buttons.contains(&MouseButton::MIDDLE)
        {
            pending.pan += delta;
        }
    }

    pub fn add_wheel(&self, steps: f32) {
        self.pending.write().wheel += steps;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    pub fn mouse_position(&self) -> Option<Vec2> {
        *self.mouse_position.read()
    }

    /// Drains the accumulated motion, clicks and key presses.
    pub fn take_frame(&self) -> InputFrame {
        let mut pending = self.pending.write();
        InputFrame {
            cursor: *self.mouse_position.read(),
            rotate: std::mem::take(&mut pending.rotate),
            pan: std::mem::take(&mut pending.pan),
            wheel: std::mem::take(&mut pending.wheel),
            clicks: std::mem::take(&mut pending.clicks),
            keys_pressed: std::mem::take(&mut pending.keys_pressed),
        }
    }
}
