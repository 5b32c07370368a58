use glam::{Vec3, Vec4};

use crate::camera::PerspectiveCamera;
use crate::scene::OceanSettings;

/// Sun direction used when the scene leaves it unset.
pub const DEFAULT_SUN_DIRECTION: Vec3 = Vec3::new(0.70707, 0.70707, 0.0);

/// Water surface height; the plane sits at the origin facing +Y.
pub const WATER_LEVEL: f32 = 0.0;

/// Animated ocean state.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterState {
    pub time: f32,
    pub settings: OceanSettings,
}

impl WaterState {
    pub fn new(settings: OceanSettings) -> Self {
        Self {
            time: 0.0,
            settings,
        }
    }

    /// Advances the wave clock by one frame.
    pub fn advance(&mut self) {
        self.time += 1.0 / self.time_modifier();
    }

    /// Frames per unit of wave time, never below one.
    pub fn time_modifier(&self) -> f32 {
        if self.settings.time_modifier.is_finite() {
            self.settings.time_modifier.max(1.0)
        } else {
            1.0
        }
    }

    pub fn set_time_modifier(&mut self, value: f32) {
        self.settings.time_modifier = value;
    }

    pub fn sun_direction(&self) -> Vec3 {
        let direction = self.settings.sun_direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            DEFAULT_SUN_DIRECTION
        } else {
            direction
        }
    }

    /// Reflection resolution, at least one texel.
    pub fn texture_size(&self) -> u32 {
        self.settings.texture_size.max(1)
    }
}

/// Camera mirrored through the water plane, used to render the reflection.
pub fn mirror_camera(camera: &PerspectiveCamera) -> PerspectiveCamera {
    let reflect = |point: Vec3| Vec3::new(point.x, 2.0 * WATER_LEVEL - point.y, point.z);
    let mut mirrored = *camera;
    mirrored.position = reflect(camera.position);
    mirrored.look_at(reflect(camera.position + camera.forward()));
    mirrored
}

/// Plane equation `(n, d)` keeping everything above the water surface.
pub fn clip_plane() -> Vec4 {
    Vec4::new(0.0, 1.0, 0.0, -WATER_LEVEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OceanSettings {
        OceanSettings {
            normals: "/textures/Misc/waternormals.jpg".into(),
            color: Vec3::new(0.0, 30.0 / 255.0, 15.0 / 255.0),
            sun_color: Vec3::ONE,
            sun_direction: Vec3::ZERO,
            distortion_scale: 2.5,
            time_modifier: 320.0,
            size: 10_000.0,
            texture_size: 512,
            alpha: 1.0,
        }
    }

    #[test]
    fn time_advances_by_inverse_modifier() {
        let mut water = WaterState::new(settings());
        for _ in 0..320 {
            water.advance();
        }
        assert!((water.time - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_modifier_is_clamped() {
        let mut water = WaterState::new(settings());
        water.set_time_modifier(0.0);
        water.advance();
        assert_eq!(water.time, 1.0);
        water.set_time_modifier(f32::NAN);
        water.advance();
        assert_eq!(water.time, 2.0);
    }

    #[test]
    fn unset_sun_direction_falls_back() {
        let mut water = WaterState::new(settings());
        assert_eq!(water.sun_direction(), DEFAULT_SUN_DIRECTION);
        water.settings.sun_direction = Vec3::new(0.0, 2.0, 0.0);
        assert_eq!(water.sun_direction(), Vec3::Y);
    }

    #[test]
    fn mirror_camera_reflects_through_the_surface() {
        let mut camera = PerspectiveCamera::default();
        camera.position = Vec3::new(10.0, 5.0, 0.0);
        camera.look_at(Vec3::new(0.0, 0.0, 0.0));
        let mirrored = mirror_camera(&camera);
        assert_eq!(mirrored.position, Vec3::new(10.0, -5.0, 0.0));
        let expected = Vec3::new(-10.0, 5.0, 0.0).normalize();
        assert!((mirrored.forward() - expected).length() < 1e-5);
        assert_eq!(mirrored.fov, camera.fov);
    }

    #[test]
    fn clip_plane_keeps_points_above_water() {
        let plane = clip_plane();
        assert!(plane.dot(Vec4::new(3.0, 1.0, -2.0, 1.0)) > 0.0);
        assert!(plane.dot(Vec4::new(3.0, -1.0, -2.0, 1.0)) < 0.0);
    }
}
