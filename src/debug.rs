use std::ops::RangeInclusive;

use glam::Vec3;

use crate::data_model::{DataModel, Material, MeshId, NodeKind, SceneNode};
use crate::input::KeyCode;

/// Name of the placeable helper cube in the data model.
pub const HELPER_NAME: &str = "Helper";

/// Slider bounds and granularity for a tweakable value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamRange {
    /// Snaps to the nearest step from `min`, then clamps into range.
    pub fn apply(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.min as f32;
        }
        let value = f64::from(value);
        let snapped = if self.step > 0.0 {
            self.min + ((value - self.min) / self.step).round() * self.step
        } else {
            value
        };
        snapped.clamp(self.min, self.max) as f32
    }

    pub fn bounds(&self) -> RangeInclusive<f32> {
        self.min as f32..=self.max as f32
    }
}

pub const HELPER_RANGE: ParamRange = ParamRange {
    min: -100.0,
    max: 100.0,
    step: 0.001,
};

pub const FOV_RANGE: ParamRange = ParamRange {
    min: 0.0,
    max: 120.0,
    step: 0.001,
};

pub const TIME_MODIFIER_RANGE: ParamRange = ParamRange {
    min: 0.0,
    max: 500.0,
    step: 1.0,
};

/// Values exposed in the debug panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugParams {
    helper: Vec3,
    fov: f32,
    time_modifier: f32,
}

impl Default for DebugParams {
    fn default() -> Self {
        Self {
            helper: Vec3::new(0.0, 2.0, 0.0),
            fov: 8.0,
            time_modifier: 320.0,
        }
    }
}

impl DebugParams {
    pub fn new(fov: f32, time_modifier: f32) -> Self {
        let mut params = Self::default();
        params.set_fov(fov);
        params.set_time_modifier(time_modifier);
        params
    }

    pub fn helper(&self) -> Vec3 {
        self.helper
    }

    pub fn set_helper(&mut self, position: Vec3) {
        self.helper = Vec3::new(
            HELPER_RANGE.apply(position.x),
            HELPER_RANGE.apply(position.y),
            HELPER_RANGE.apply(position.z),
        );
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = FOV_RANGE.apply(fov);
    }

    pub fn time_modifier(&self) -> f32 {
        self.time_modifier
    }

    pub fn set_time_modifier(&mut self, value: f32) {
        self.time_modifier = TIME_MODIFIER_RANGE.apply(value);
    }
}

/// Buttons of the debug panel, also reachable from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    PlaceHelper,
    /// Jump to the preset at this index.
    CameraPreset(usize),
    LogCamera,
    ToggleGui,
}

impl DebugAction {
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::Character('H') => Some(Self::PlaceHelper),
            KeyCode::Character('C') => Some(Self::LogCamera),
            KeyCode::Character('G') => Some(Self::ToggleGui),
            KeyCode::Digit(digit @ 1..=9) => Some(Self::CameraPreset(digit as usize - 1)),
            _ => None,
        }
    }
}

/// Adds the helper cube once. Returns `false` when it already exists.
pub fn place_helper(model: &DataModel, params: &DebugParams, mesh: MeshId) -> bool {
    if model.contains_kind(NodeKind::Helper) {
        return false;
    }
    log::info!("placing helper");
    model.add(SceneNode {
        name: HELPER_NAME.to_string(),
        kind: NodeKind::Helper,
        mesh,
        material: Material::Lit {
            metalness: 0.3,
            roughness: 0.4,
        },
        position: params.helper(),
        ..SceneNode::default()
    });
    true
}

/// Moves the helper cube, if placed, to the panel position.
pub fn sync_helper(model: &DataModel, params: &DebugParams) {
    let position = params.helper();
    model.update_kind(NodeKind::Helper, |node| node.position = position);
}
